use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use callguard_core_types::{CallerId, Clock, Timestamp};
use tracing::{debug, info, warn};

use crate::config::{SessionSettings, UnknownPermissionMode};
use crate::errors::SessionError;
use crate::model::{
    AuthResult, CleanupReport, PermissionCacheEntry, PermissionResult, ResolvedAccess,
    RoleDefinition, SessionId, UserSession,
};

/// Holds role definitions, one session per caller and a per-caller cache of
/// flattened permissions.
///
/// Readers (`has_permission`, `has_role`, `peek_session`) never mutate; a
/// stale cache entry is bypassed and recomputed on the fly. Expired sessions
/// are evicted by `get_session`, `authenticate` and `cleanup`.
pub struct SessionManager {
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    roles: HashMap<String, RoleDefinition>,
    sessions: HashMap<CallerId, UserSession>,
    cache: HashMap<CallerId, PermissionCacheEntry>,
    last_cleanup: Timestamp,
}

impl SessionManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_settings(SessionSettings::default(), clock)
    }

    pub fn with_settings(settings: SessionSettings, clock: Arc<dyn Clock>) -> Self {
        let last_cleanup = clock.now();
        Self {
            clock,
            settings,
            roles: HashMap::new(),
            sessions: HashMap::new(),
            cache: HashMap::new(),
            last_cleanup,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Adds or replaces a role. Cached resolutions are left alone until their
    /// TTL runs out.
    pub fn define_role(&mut self, role: RoleDefinition) {
        debug!(role = %role.name, inherits = ?role.inherits, "role defined");
        self.roles.insert(role.name.clone(), role);
    }

    pub fn remove_role(&mut self, name: &str) -> Option<RoleDefinition> {
        self.roles.remove(name)
    }

    pub fn role(&self, name: &str) -> Option<&RoleDefinition> {
        self.roles.get(name)
    }

    /// Role definitions sorted by name.
    pub fn roles(&self) -> Vec<&RoleDefinition> {
        let mut roles: Vec<_> = self.roles.values().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        roles
    }

    /// Permissions of `role` and everything it inherits. `visited` breaks
    /// cycles: a role already on it contributes nothing.
    pub fn flatten_permissions(&self, role: &str, visited: &mut HashSet<String>) -> BTreeSet<String> {
        let mut permissions = BTreeSet::new();
        if !visited.insert(role.to_string()) {
            return permissions;
        }
        let Some(definition) = self.roles.get(role) else {
            return permissions;
        };
        permissions.extend(definition.permissions.iter().cloned());
        for parent in &definition.inherits {
            permissions.extend(self.flatten_permissions(parent, visited));
        }
        permissions
    }

    /// `role` plus every defined role reachable through inheritance.
    pub fn flatten_roles(&self, role: &str, visited: &mut HashSet<String>) -> BTreeSet<String> {
        let mut roles = BTreeSet::new();
        if !visited.insert(role.to_string()) {
            return roles;
        }
        roles.insert(role.to_string());
        if let Some(definition) = self.roles.get(role) {
            for parent in &definition.inherits {
                roles.extend(self.flatten_roles(parent, visited));
            }
        }
        roles
    }

    pub fn resolve(&self, assigned: &[String]) -> ResolvedAccess {
        let mut access = ResolvedAccess::default();
        let mut role_visits = HashSet::new();
        let mut permission_visits = HashSet::new();
        for role in assigned {
            if !self.roles.contains_key(role) {
                warn!(%role, "assigned role is not defined");
            }
            access.roles.extend(self.flatten_roles(role, &mut role_visits));
            access
                .permissions
                .extend(self.flatten_permissions(role, &mut permission_visits));
        }
        access
    }

    /// Opens (or replaces) the caller's session. A live cache entry for the
    /// same assigned roles is reused instead of re-resolving.
    pub fn create_session(
        &mut self,
        caller: CallerId,
        roles: Vec<String>,
        metadata: BTreeMap<String, String>,
        ttl: Option<Duration>,
    ) -> Result<UserSession, SessionError> {
        if caller.is_anonymous() {
            return Err(SessionError::AnonymousCaller);
        }
        let now = self.clock.now();
        self.maybe_cleanup(now);

        let assigned: BTreeSet<String> = roles.iter().cloned().collect();
        let cached = self
            .cache
            .get(&caller)
            .filter(|entry| !entry.is_expired(now) && entry.assigned_roles == assigned)
            .map(|entry| entry.access.clone());
        let access = match cached {
            Some(access) => {
                debug!(%caller, "reusing cached permissions");
                access
            }
            None => {
                let access = self.resolve(&roles);
                self.cache.insert(
                    caller.clone(),
                    PermissionCacheEntry {
                        assigned_roles: assigned,
                        access: access.clone(),
                        cached_at: now,
                        ttl: self.settings.cache_ttl,
                    },
                );
                access
            }
        };

        let expires_at = ttl
            .or(self.settings.default_ttl)
            .map(|ttl| now.saturating_add(ttl));
        let session = UserSession {
            id: SessionId::new(),
            caller: caller.clone(),
            assigned_roles: roles,
            access,
            created_at: now,
            expires_at,
            metadata,
        };
        info!(
            %caller,
            session = %session.id,
            roles = session.access.roles.len(),
            permissions = session.access.permissions.len(),
            "session created"
        );
        self.sessions.insert(caller, session.clone());
        Ok(session)
    }

    /// The caller's live session. An expired one is evicted along with its
    /// cache entry.
    pub fn get_session(&mut self, caller: &CallerId) -> Option<&UserSession> {
        let now = self.clock.now();
        if self
            .sessions
            .get(caller)
            .is_some_and(|session| session.is_expired(now))
        {
            self.evict(caller);
            return None;
        }
        self.sessions.get(caller)
    }

    /// Read-only lookup; expired sessions are hidden but kept.
    pub fn peek_session(&self, caller: &CallerId) -> Option<&UserSession> {
        let now = self.clock.now();
        self.sessions
            .get(caller)
            .filter(|session| !session.is_expired(now))
    }

    pub fn authenticate(&mut self, caller: &CallerId) -> AuthResult {
        let result = self.validate_session(caller);
        if matches!(result, AuthResult::Expired(_)) {
            self.evict(caller);
        }
        result
    }

    /// Like `authenticate`, without evicting.
    pub fn validate_session(&self, caller: &CallerId) -> AuthResult {
        if caller.is_anonymous() {
            return AuthResult::Denied("anonymous caller".to_string());
        }
        let now = self.clock.now();
        match self.sessions.get(caller) {
            None => AuthResult::Denied(format!("no session for {caller}")),
            Some(session) if session.is_expired(now) => {
                AuthResult::Expired(session.expires_at.unwrap_or(now))
            }
            Some(session) => AuthResult::Authenticated(self.current_view(session, now)),
        }
    }

    /// Effective roles and permissions: the cache while it is valid,
    /// otherwise a fresh resolution of the assigned roles.
    pub fn effective_access(&self, caller: &CallerId) -> Option<Cow<'_, ResolvedAccess>> {
        let now = self.clock.now();
        let session = self.live_session(caller, now)?;
        Some(self.access_for(session, now))
    }

    pub fn has_permission(&self, caller: &CallerId, permission: &str) -> PermissionResult {
        if caller.is_anonymous() {
            let granted = self.settings.allow_anonymous_read
                && self
                    .settings
                    .anonymous_permissions
                    .iter()
                    .any(|p| p == permission);
            return if granted {
                PermissionResult::Granted
            } else {
                PermissionResult::Denied(format!("anonymous caller lacks '{permission}'"))
            };
        }

        match self.effective_access(caller) {
            None => self.missing(permission, format!("no active session for {caller}")),
            Some(access) if access.permissions.contains(permission) => PermissionResult::Granted,
            Some(_) => self.missing(permission, format!("{caller} lacks '{permission}'")),
        }
    }

    pub fn has_role(&self, caller: &CallerId, role: &str) -> bool {
        self.effective_access(caller)
            .is_some_and(|access| access.roles.contains(role))
    }

    /// Effective role names, empty when the caller has no live session.
    pub fn effective_roles(&self, caller: &CallerId) -> Vec<String> {
        self.effective_access(caller)
            .map(|access| access.roles.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Re-resolves the caller's roles and restarts the session lifetime.
    pub fn refresh_session(&mut self, caller: &CallerId) -> Option<UserSession> {
        let now = self.clock.now();
        let assigned = self.live_session(caller, now)?.assigned_roles.clone();
        let access = self.resolve(&assigned);
        self.cache.insert(
            caller.clone(),
            PermissionCacheEntry {
                assigned_roles: assigned.iter().cloned().collect(),
                access: access.clone(),
                cached_at: now,
                ttl: self.settings.cache_ttl,
            },
        );

        let ttl = self.settings.default_ttl;
        let session = self.sessions.get_mut(caller)?;
        if let Some(previous) = session.expires_at {
            let lifetime = ttl.unwrap_or_else(|| previous.duration_since(session.created_at));
            session.expires_at = Some(now.saturating_add(lifetime));
        }
        session.access = access;
        debug!(%caller, session = %session.id, "session refreshed");
        Some(session.clone())
    }

    pub fn revoke_session(&mut self, caller: &CallerId) -> bool {
        let existed = self.evict(caller);
        if existed {
            info!(%caller, "session revoked");
        }
        existed
    }

    /// Forces the next lookup to re-resolve from role definitions.
    pub fn invalidate_cache(&mut self, caller: &CallerId) {
        self.cache.remove(caller);
    }

    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    /// Drops expired sessions, expired cache entries and cache entries whose
    /// caller no longer has a session.
    pub fn cleanup(&mut self) -> CleanupReport {
        let now = self.clock.now();
        let sessions_before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));

        let cache_before = self.cache.len();
        let sessions = &self.sessions;
        self.cache
            .retain(|caller, entry| !entry.is_expired(now) && sessions.contains_key(caller));
        self.last_cleanup = now;

        let report = CleanupReport {
            expired_sessions: sessions_before - self.sessions.len(),
            stale_cache_entries: cache_before - self.cache.len(),
        };
        if report != CleanupReport::default() {
            info!(
                expired_sessions = report.expired_sessions,
                stale_cache_entries = report.stale_cache_entries,
                "session state pruned"
            );
        }
        report
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    fn maybe_cleanup(&mut self, now: Timestamp) {
        if now.duration_since(self.last_cleanup) >= self.settings.cleanup_interval {
            self.cleanup();
        }
    }

    fn evict(&mut self, caller: &CallerId) -> bool {
        self.cache.remove(caller);
        self.sessions.remove(caller).is_some()
    }

    fn live_session(&self, caller: &CallerId, now: Timestamp) -> Option<&UserSession> {
        self.sessions
            .get(caller)
            .filter(|session| !session.is_expired(now))
    }

    fn access_for(&self, session: &UserSession, now: Timestamp) -> Cow<'_, ResolvedAccess> {
        match self.cache.get(&session.caller) {
            Some(entry) if !entry.is_expired(now) => Cow::Borrowed(&entry.access),
            _ => Cow::Owned(self.resolve(&session.assigned_roles)),
        }
    }

    fn current_view(&self, session: &UserSession, now: Timestamp) -> UserSession {
        let mut view = session.clone();
        view.access = self.access_for(session, now).into_owned();
        view
    }

    fn missing(&self, permission: &str, reason: String) -> PermissionResult {
        match self.settings.unknown_permission_mode {
            UnknownPermissionMode::Report if !self.is_defined_permission(permission) => {
                PermissionResult::UnknownPermission(permission.to_string())
            }
            _ => PermissionResult::Denied(reason),
        }
    }

    /// Whether any role definition names `permission`.
    pub fn is_defined_permission(&self, permission: &str) -> bool {
        self.roles
            .values()
            .any(|role| role.permissions.iter().any(|p| p == permission))
    }
}
