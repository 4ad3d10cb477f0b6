use callguard_rate_limiter::RateLimiterSettings;
use callguard_session::{RoleDefinition, SessionSettings};
use serde::{Deserialize, Serialize};

/// What `evaluate` does with a method nobody registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownMethodPolicy {
    #[default]
    Accept,
    Reject,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub unknown_method: UnknownMethodPolicy,
    /// `requireAuth` additionally demands a live session.
    #[serde(default)]
    pub require_session_for_auth: bool,
    #[serde(default)]
    pub sessions: SessionSettings,
    #[serde(default)]
    pub rate_limits: RateLimiterSettings,
    /// Defined on the session manager when the engine is built.
    #[serde(default)]
    pub roles: Vec<RoleDefinition>,
}
