use std::time::Duration;

use callguard_core_types::duration_str;
use serde::{Deserialize, Serialize};

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// What `has_permission` answers when a permission is missing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPermissionMode {
    /// Every miss is a plain denial.
    #[default]
    Deny,
    /// Permissions no role defines are reported as unknown instead.
    Report,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Session lifetime when `create_session` gets no override; `None`
    /// keeps sessions until revoked.
    #[serde(default, with = "duration_str::option")]
    pub default_ttl: Option<Duration>,
    #[serde(default = "default_cache_ttl", with = "duration_str")]
    pub cache_ttl: Duration,
    #[serde(default)]
    pub allow_anonymous_read: bool,
    /// Granted to the anonymous caller when `allow_anonymous_read` is set.
    #[serde(default)]
    pub anonymous_permissions: Vec<String>,
    #[serde(default)]
    pub unknown_permission_mode: UnknownPermissionMode,
    #[serde(default = "default_cleanup_interval", with = "duration_str")]
    pub cleanup_interval: Duration,
}

fn default_cache_ttl() -> Duration {
    DEFAULT_CACHE_TTL
}

fn default_cleanup_interval() -> Duration {
    DEFAULT_CLEANUP_INTERVAL
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_ttl: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            allow_anonymous_read: false,
            anonymous_permissions: Vec::new(),
            unknown_permission_mode: UnknownPermissionMode::Deny,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}
