use std::fmt;
use std::time::Duration;

use callguard_core_types::Timestamp;
use serde::{Deserialize, Serialize};

use crate::config::TimeWindow;

/// Calls recorded at one instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEntry {
    pub timestamp: Timestamp,
    pub count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    Method,
    Global,
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LimitScope::Method => "method",
            LimitScope::Global => "global",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateLimitResult {
    Allowed,
    Denied {
        scope: LimitScope,
        limit: u32,
        window: TimeWindow,
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }
}

impl fmt::Display for RateLimitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitResult::Allowed => f.write_str("allowed"),
            RateLimitResult::Denied {
                scope,
                limit,
                window,
                retry_after,
            } => write!(
                f,
                "{scope} limit of {limit} per {window} exceeded, retry after {}s",
                whole_seconds(*retry_after)
            ),
        }
    }
}

/// Rounds up to whole seconds, ignoring the nanosecond that `retry_after`
/// carries past the window edge.
fn whole_seconds(retry_after: Duration) -> u64 {
    let exact = retry_after.saturating_sub(Duration::from_nanos(1));
    exact.as_secs() + u64::from(exact.subsec_nanos() > 0)
}
