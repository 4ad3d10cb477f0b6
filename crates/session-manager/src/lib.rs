//! Roles with inheritance, per-caller sessions and a TTL cache of flattened
//! permissions.

pub mod config;
pub mod errors;
pub mod manager;
pub mod model;
pub mod provider;

pub use config::{SessionSettings, UnknownPermissionMode};
pub use errors::SessionError;
pub use manager::SessionManager;
pub use model::{
    AuthResult, CleanupReport, PermissionCacheEntry, PermissionResult, ResolvedAccess,
    RoleDefinition, SessionId, UserSession,
};
pub use provider::{AuthProvider, SessionAuthProvider};
