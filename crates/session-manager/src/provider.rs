use std::sync::Arc;

use async_trait::async_trait;
use callguard_core_types::CallerId;
use parking_lot::RwLock;

use crate::errors::SessionError;
use crate::manager::SessionManager;
use crate::model::{AuthResult, PermissionResult};

/// Pluggable source of identity and authorization facts.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, caller: &CallerId) -> Result<AuthResult, SessionError>;
    async fn has_permission(
        &self,
        caller: &CallerId,
        permission: &str,
    ) -> Result<PermissionResult, SessionError>;
    async fn get_roles(&self, caller: &CallerId) -> Result<Vec<String>, SessionError>;
    async fn get_permissions(&self, caller: &CallerId) -> Result<Vec<String>, SessionError>;
    async fn validate_session(&self, caller: &CallerId) -> Result<AuthResult, SessionError>;
    async fn refresh_session(&self, caller: &CallerId) -> Result<AuthResult, SessionError>;
}

/// `AuthProvider` backed by an in-process `SessionManager`.
#[derive(Clone)]
pub struct SessionAuthProvider {
    manager: Arc<RwLock<SessionManager>>,
}

impl SessionAuthProvider {
    pub fn new(manager: Arc<RwLock<SessionManager>>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<RwLock<SessionManager>> {
        &self.manager
    }
}

#[async_trait]
impl AuthProvider for SessionAuthProvider {
    async fn authenticate(&self, caller: &CallerId) -> Result<AuthResult, SessionError> {
        Ok(self.manager.write().authenticate(caller))
    }

    async fn has_permission(
        &self,
        caller: &CallerId,
        permission: &str,
    ) -> Result<PermissionResult, SessionError> {
        Ok(self.manager.read().has_permission(caller, permission))
    }

    async fn get_roles(&self, caller: &CallerId) -> Result<Vec<String>, SessionError> {
        let manager = self.manager.read();
        match manager.peek_session(caller) {
            Some(_) => Ok(manager.effective_roles(caller)),
            None => Err(SessionError::NoSession(caller.to_string())),
        }
    }

    async fn get_permissions(&self, caller: &CallerId) -> Result<Vec<String>, SessionError> {
        let manager = self.manager.read();
        let permissions = manager
            .effective_access(caller)
            .map(|access| access.permissions.iter().cloned().collect())
            .ok_or_else(|| SessionError::NoSession(caller.to_string()));
        permissions
    }

    async fn validate_session(&self, caller: &CallerId) -> Result<AuthResult, SessionError> {
        Ok(self.manager.read().validate_session(caller))
    }

    async fn refresh_session(&self, caller: &CallerId) -> Result<AuthResult, SessionError> {
        let mut manager = self.manager.write();
        match manager.refresh_session(caller) {
            Some(session) => Ok(AuthResult::Authenticated(session)),
            None => Ok(manager.authenticate(caller)),
        }
    }
}
