use std::collections::HashMap;
use std::fmt;

use callguard_core_types::CallContext;
use callguard_rate_limiter::{RateLimitConfig, RateLimiter};
use callguard_session::SessionManager;
use serde::{Deserialize, Serialize};

use crate::errors::{Rejection, RuleKind};

/// Boundary-time ("inspect") or runtime ("guard") validation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Inspect,
    #[default]
    Guard,
}

impl Phase {
    pub fn of<V>(call: &CallContext<V>) -> Self {
        if call.is_boundary_check {
            Phase::Inspect
        } else {
            Phase::Guard
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Inspect => f.write_str("inspect"),
            Phase::Guard => f.write_str("guard"),
        }
    }
}

/// Shared engine state lent to a validator for one evaluation.
pub(crate) struct Scope<'a> {
    pub sessions: &'a SessionManager,
    /// Present only for validators carrying a rate-limit rule.
    pub limiter: Option<&'a RateLimiter>,
    pub require_session_for_auth: bool,
}

pub(crate) type CheckFn<V> =
    Box<dyn Fn(&CallContext<V>, &Scope<'_>) -> Result<(), Rejection> + Send + Sync>;

/// Description of a registered validator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodHandle {
    pub phase: Phase,
    pub method: String,
    pub is_read_only: bool,
    pub rules: Vec<RuleKind>,
}

/// Type-erased validator: the accessor and rule list of one method,
/// captured in a closure over the engine's variant type `V`.
pub struct MethodValidator<V> {
    pub(crate) handle: MethodHandle,
    pub(crate) rate_limited: bool,
    /// Limit declared by the validator's own rate-limit rule, if any.
    pub(crate) limit: Option<RateLimitConfig>,
    pub(crate) check: CheckFn<V>,
}

impl<V> MethodValidator<V> {
    pub fn handle(&self) -> &MethodHandle {
        &self.handle
    }

    pub fn is_rate_limited(&self) -> bool {
        self.rate_limited
    }

    pub fn declared_limit(&self) -> Option<&RateLimitConfig> {
        self.limit.as_ref()
    }
}

impl<V> fmt::Debug for MethodValidator<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodValidator")
            .field("handle", &self.handle)
            .field("rate_limited", &self.rate_limited)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

pub(crate) struct Registry<V> {
    inspect: HashMap<String, MethodValidator<V>>,
    guard: HashMap<String, MethodValidator<V>>,
}

impl<V> Registry<V> {
    pub fn new() -> Self {
        Self {
            inspect: HashMap::new(),
            guard: HashMap::new(),
        }
    }

    pub fn phase(&self, phase: Phase) -> &HashMap<String, MethodValidator<V>> {
        match phase {
            Phase::Inspect => &self.inspect,
            Phase::Guard => &self.guard,
        }
    }

    pub fn get(&self, phase: Phase, method: &str) -> Option<&MethodValidator<V>> {
        self.phase(phase).get(method)
    }

    pub fn insert(&mut self, validator: MethodValidator<V>) -> Option<MethodValidator<V>> {
        let table = match validator.handle.phase {
            Phase::Inspect => &mut self.inspect,
            Phase::Guard => &mut self.guard,
        };
        table.insert(validator.handle.method.clone(), validator)
    }

    pub fn remove(&mut self, phase: Phase, method: &str) -> Option<MethodValidator<V>> {
        match phase {
            Phase::Inspect => self.inspect.remove(method),
            Phase::Guard => self.guard.remove(method),
        }
    }
}
