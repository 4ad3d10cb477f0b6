use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use callguard_core_types::{CallContext, CallerId, Clock};
use callguard_rate_limiter::{RateLimitConfig, RateLimiter};
use callguard_session::{
    AuthProvider, AuthResult, CleanupReport, RoleDefinition, SessionError, SessionManager,
    UserSession,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, UnknownMethodPolicy};
use crate::errors::{Rejection, RuleKind};
use crate::evaluator::compile;
use crate::registry::{MethodHandle, MethodValidator, Phase, Registry, Scope};
use crate::rules::ValidationRule;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub rate_entries_pruned: usize,
    pub expired_sessions: usize,
    pub stale_cache_entries: usize,
}

/// Method registry plus the policy state its rules consult.
///
/// Registration needs `&mut self` and happens once at startup; evaluation and
/// state management work through `&self`. The session manager sits behind a
/// read/write lock and the limiter behind a mutex that is held from a call's
/// rate check until its admission is recorded. Predicates must not call back
/// into the engine.
pub struct Engine<V> {
    registry: Registry<V>,
    sessions: Arc<RwLock<SessionManager>>,
    limiter: Mutex<RateLimiter>,
    unknown_method: UnknownMethodPolicy,
    require_session_for_auth: bool,
}

impl<V: 'static> Engine<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(EngineConfig::default(), clock)
    }

    pub fn with_config(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let EngineConfig {
            unknown_method,
            require_session_for_auth,
            sessions,
            rate_limits,
            roles,
        } = config;

        let mut manager = SessionManager::with_settings(sessions, clock.clone());
        for role in roles {
            manager.define_role(role);
        }
        Self {
            registry: Registry::new(),
            sessions: Arc::new(RwLock::new(manager)),
            limiter: Mutex::new(RateLimiter::with_settings(rate_limits, clock)),
            unknown_method,
            require_session_for_auth,
        }
    }

    /// Binds `rules` and `accessor` into one validator for `method`.
    /// Nothing is evaluated until a call arrives; a previous validator for
    /// the same phase and method is replaced.
    ///
    /// A method's inspect and guard validators share one limit and one call
    /// history. When both declare a limit, the guard's declaration applies.
    pub fn register<A, F>(
        &mut self,
        phase: Phase,
        method: impl Into<String>,
        is_read_only: bool,
        rules: Vec<ValidationRule<A>>,
        accessor: F,
    ) -> MethodHandle
    where
        A: 'static,
        F: Fn(&V) -> Option<A> + Send + Sync + 'static,
    {
        let method = method.into();
        let mut rate_limited = false;
        let mut limit = None;
        for rule in &rules {
            if let ValidationRule::RateLimit(config) = rule {
                rate_limited = true;
                if config.is_some() {
                    limit = config.clone();
                }
            }
        }

        let handle = MethodHandle {
            phase,
            method,
            is_read_only,
            rules: rules.iter().map(ValidationRule::kind).collect(),
        };
        info!(
            %phase,
            method = %handle.method,
            rules = handle.rules.len(),
            rate_limited,
            "method validator registered"
        );

        let validator = MethodValidator {
            handle: handle.clone(),
            rate_limited,
            limit,
            check: compile(accessor, rules),
        };
        let previous = self.registry.insert(validator);
        if previous.is_some() {
            debug!(%phase, method = %handle.method, "replaced existing validator");
        }
        self.sync_method_limit(&handle.method, previous.and_then(|old| old.limit));
        handle
    }

    pub fn register_inspect<A, F>(
        &mut self,
        method: impl Into<String>,
        is_read_only: bool,
        rules: Vec<ValidationRule<A>>,
        accessor: F,
    ) -> MethodHandle
    where
        A: 'static,
        F: Fn(&V) -> Option<A> + Send + Sync + 'static,
    {
        self.register(Phase::Inspect, method, is_read_only, rules, accessor)
    }

    pub fn register_guard<A, F>(
        &mut self,
        method: impl Into<String>,
        is_read_only: bool,
        rules: Vec<ValidationRule<A>>,
        accessor: F,
    ) -> MethodHandle
    where
        A: 'static,
        F: Fn(&V) -> Option<A> + Send + Sync + 'static,
    {
        self.register(Phase::Guard, method, is_read_only, rules, accessor)
    }

    /// Removes a validator. A limit it declared is dropped from the limiter
    /// unless the method's other validator declares one.
    pub fn unregister(&mut self, phase: Phase, method: &str) -> bool {
        match self.registry.remove(phase, method) {
            Some(removed) => {
                info!(%phase, method, "method validator removed");
                self.sync_method_limit(method, removed.limit);
                true
            }
            None => false,
        }
    }

    /// Points the limiter at the limit the method's validators declare.
    /// `dropped` is the declaration of a validator that just went away; a
    /// limit set by configuration alone is left untouched.
    fn sync_method_limit(&mut self, method: &str, dropped: Option<RateLimitConfig>) {
        let guard = self
            .registry
            .get(Phase::Guard, method)
            .and_then(|validator| validator.limit.as_ref());
        let inspect = self
            .registry
            .get(Phase::Inspect, method)
            .and_then(|validator| validator.limit.as_ref());
        if let (Some(guard), Some(inspect)) = (guard, inspect) {
            if guard != inspect {
                warn!(
                    method,
                    "inspect and guard declare different rate limits; the guard limit applies"
                );
            }
        }

        let limiter = self.limiter.get_mut();
        match guard.or(inspect) {
            Some(config) => limiter.set_method_limit(method, config.clone()),
            None if dropped.is_some() => {
                if limiter.remove_method_limit(method).is_some() {
                    debug!(method, "method rate limit removed");
                }
            }
            None => {}
        }
    }

    /// Whether an admitted call through `phase` is the one that counts
    /// against the limit. A boundary check only counts when the method has
    /// no rate-limited runtime validator, so a call seen by both phases is
    /// recorded once.
    fn records_admission(&self, phase: Phase, method: &str) -> bool {
        match phase {
            Phase::Guard => true,
            Phase::Inspect => !self
                .registry
                .get(Phase::Guard, method)
                .is_some_and(MethodValidator::is_rate_limited),
        }
    }

    pub fn evaluate(&self, call: &CallContext<V>) -> Result<(), String> {
        self.evaluate_detailed(call).map_err(|rejection| rejection.to_string())
    }

    /// Runs the validator registered for the call's phase and method, stopping
    /// at the first failing rule. Admitted calls through a rate-limited
    /// validator are recorded once per logical call; rejected calls never
    /// are.
    pub fn evaluate_detailed(&self, call: &CallContext<V>) -> Result<(), Rejection> {
        let phase = Phase::of(call);
        let Some(validator) = self.registry.phase(phase).get(&call.method) else {
            return self.unknown(phase, call);
        };

        let sessions = self.sessions.read();
        let limiter = validator.rate_limited.then(|| self.limiter.lock());
        let scope = Scope {
            sessions: &sessions,
            limiter: limiter.as_deref(),
            require_session_for_auth: self.require_session_for_auth,
        };

        match (validator.check)(call, &scope) {
            Ok(()) => {
                if let Some(mut limiter) = limiter {
                    if self.records_admission(phase, &call.method) {
                        limiter.record(&call.caller, &call.method);
                    }
                }
                debug!(%phase, method = %call.method, caller = %call.caller, "call admitted");
                Ok(())
            }
            Err(rejection) => {
                debug!(
                    %phase,
                    method = %call.method,
                    caller = %call.caller,
                    rule = %rejection.kind,
                    detail = %rejection.detail,
                    "call rejected"
                );
                Err(rejection)
            }
        }
    }

    /// Raw argument length, for pre-filtering before decoding.
    pub fn size_only(&self, call: &CallContext<V>) -> usize {
        call.arg_bytes.len()
    }

    fn unknown(&self, phase: Phase, call: &CallContext<V>) -> Result<(), Rejection> {
        match self.unknown_method {
            UnknownMethodPolicy::Accept => Ok(()),
            UnknownMethodPolicy::Reject => {
                debug!(%phase, method = %call.method, "no validator registered");
                Err(Rejection::new(
                    RuleKind::UnknownMethod,
                    format!("no validator registered for {}", call.method),
                ))
            }
        }
    }

    pub fn handle(&self, phase: Phase, method: &str) -> Option<&MethodHandle> {
        self.registry.phase(phase).get(method).map(MethodValidator::handle)
    }

    pub fn is_registered(&self, phase: Phase, method: &str) -> bool {
        self.registry.phase(phase).contains_key(method)
    }

    /// Method names registered for `phase`, sorted.
    pub fn registered_methods(&self, phase: Phase) -> Vec<&str> {
        let mut methods: Vec<&str> = self
            .registry
            .phase(phase)
            .keys()
            .map(String::as_str)
            .collect();
        methods.sort_unstable();
        methods
    }
}

impl<V> Engine<V> {
    /// Shared handle, e.g. for a `SessionAuthProvider`.
    pub fn sessions(&self) -> Arc<RwLock<SessionManager>> {
        Arc::clone(&self.sessions)
    }

    pub fn define_role(&self, role: RoleDefinition) {
        self.sessions.write().define_role(role);
    }

    pub fn create_session(
        &self,
        caller: CallerId,
        roles: Vec<String>,
        metadata: BTreeMap<String, String>,
        ttl: Option<Duration>,
    ) -> Result<UserSession, SessionError> {
        self.sessions
            .write()
            .create_session(caller, roles, metadata, ttl)
    }

    pub fn revoke_session(&self, caller: &CallerId) -> bool {
        self.sessions.write().revoke_session(caller)
    }

    /// Drops a role definition. Cached permissions are invalidated so
    /// sessions stop seeing what the role granted.
    pub fn remove_role(&self, name: &str) -> Option<RoleDefinition> {
        let mut sessions = self.sessions.write();
        let removed = sessions.remove_role(name)?;
        sessions.invalidate_all();
        Some(removed)
    }

    /// Forces every session's permissions to be recomputed on next use.
    pub fn invalidate_permissions(&self) {
        self.sessions.write().invalidate_all();
    }

    pub fn set_rate_limit(&self, method: impl Into<String>, config: RateLimitConfig) {
        self.limiter.lock().set_method_limit(method, config);
    }

    pub fn set_global_rate_limit(&self, config: Option<RateLimitConfig>) {
        self.limiter.lock().set_global_limit(config);
    }

    /// The per-method limit the limiter currently enforces.
    pub fn method_rate_limit(&self, method: &str) -> Option<RateLimitConfig> {
        self.limiter.lock().method_limit(method).cloned()
    }

    /// In-window call count, for diagnostics.
    pub fn rate_usage(&self, caller: &CallerId, method: &str) -> u64 {
        self.limiter.lock().usage(caller, method)
    }

    /// Runs limiter and session cleanup. The engine never schedules this
    /// itself.
    pub fn maintenance(&self) -> MaintenanceReport {
        let rate_entries_pruned = self.limiter.lock().cleanup();
        let CleanupReport {
            expired_sessions,
            stale_cache_entries,
        } = self.sessions.write().cleanup();
        let report = MaintenanceReport {
            rate_entries_pruned,
            expired_sessions,
            stale_cache_entries,
        };
        info!(?report, "maintenance finished");
        report
    }

    /// Authenticates `caller` against an external provider and opens a
    /// local session carrying the roles it reports.
    pub async fn admit_from_provider<P>(
        &self,
        provider: &P,
        caller: &CallerId,
        ttl: Option<Duration>,
    ) -> Result<UserSession, SessionError>
    where
        P: AuthProvider + ?Sized,
    {
        match provider.authenticate(caller).await? {
            AuthResult::Authenticated(_) => {}
            AuthResult::Denied(reason) => {
                return Err(SessionError::Provider(format!(
                    "authentication denied: {reason}"
                )))
            }
            AuthResult::Expired(at) => {
                return Err(SessionError::Provider(format!("session expired at {at}")))
            }
        }
        let roles = provider.get_roles(caller).await?;
        let metadata = BTreeMap::from([("source".to_string(), "provider".to_string())]);
        self.create_session(caller.clone(), roles, metadata, ttl)
    }
}
