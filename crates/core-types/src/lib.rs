pub mod clock;
pub mod context;
pub mod duration_str;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use context::{CallContext, CallInfo};

const ANONYMOUS: &str = "anonymous";

/// Platform-authenticated identity of whoever issued a call.
///
/// The engine never authenticates callers itself; the host hands over an
/// identity it already trusts. `Local` callers are co-located services,
/// `External` callers arrive from outside (end users, ingress).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CallerId {
    Anonymous,
    External(String),
    Local(String),
}

impl CallerId {
    pub fn external(id: impl Into<String>) -> Self {
        Self::External(id.into())
    }

    pub fn local(id: impl Into<String>) -> Self {
        Self::Local(id.into())
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Anonymous => ANONYMOUS,
            Self::External(id) | Self::Local(id) => id,
        }
    }

    /// Parses the textual form used in policy files: `anonymous`,
    /// `local:<id>`, `external:<id>` or a bare `<id>` (external).
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case(ANONYMOUS) {
            return Self::Anonymous;
        }
        if let Some(id) = raw.strip_prefix("local:") {
            return Self::Local(id.to_string());
        }
        if let Some(id) = raw.strip_prefix("external:") {
            return Self::External(id.to_string());
        }
        Self::External(raw.to_string())
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str(ANONYMOUS),
            Self::External(id) if bare_id_is_ambiguous(id) => write!(f, "external:{id}"),
            Self::External(id) => f.write_str(id),
            Self::Local(id) => write!(f, "local:{id}"),
        }
    }
}

/// Whether `parse` would read `id` as something other than that external id.
fn bare_id_is_ambiguous(id: &str) -> bool {
    id.is_empty()
        || id.trim() != id
        || id.eq_ignore_ascii_case(ANONYMOUS)
        || id.starts_with("local:")
        || id.starts_with("external:")
}

impl From<String> for CallerId {
    fn from(raw: String) -> Self {
        CallerId::parse(&raw)
    }
}

impl From<CallerId> for String {
    fn from(caller: CallerId) -> Self {
        caller.to_string()
    }
}
