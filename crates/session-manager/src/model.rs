use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use callguard_core_types::{CallerId, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub inherits: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RoleDefinition {
    pub fn new<I, S>(name: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
            inherits: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn inherit(mut self, role: impl Into<String>) -> Self {
        self.inherits.push(role.into());
        self
    }
}

/// Roles and permissions reachable from a set of assigned roles.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAccess {
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub id: SessionId,
    pub caller: CallerId,
    /// Roles handed to `create_session`, before inheritance.
    pub assigned_roles: Vec<String>,
    pub access: ResolvedAccess,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub metadata: BTreeMap<String, String>,
}

impl UserSession {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }
}

/// Cached resolution for one caller; always replaced as a whole.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionCacheEntry {
    pub assigned_roles: BTreeSet<String>,
    pub access: ResolvedAccess,
    pub cached_at: Timestamp,
    pub ttl: Duration,
}

impl PermissionCacheEntry {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.cached_at.saturating_add(self.ttl)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionResult {
    Granted,
    Denied(String),
    UnknownPermission(String),
}

impl PermissionResult {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionResult::Granted)
    }
}

impl fmt::Display for PermissionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionResult::Granted => f.write_str("granted"),
            PermissionResult::Denied(reason) => write!(f, "denied: {reason}"),
            PermissionResult::UnknownPermission(name) => write!(f, "unknown permission '{name}'"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthResult {
    Authenticated(UserSession),
    Denied(String),
    Expired(Timestamp),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub expired_sessions: usize,
    pub stale_cache_entries: usize,
}
