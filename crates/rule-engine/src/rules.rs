use std::fmt;
use std::sync::Arc;

use callguard_core_types::{CallInfo, CallerId};
use callguard_rate_limiter::RateLimitConfig;
use callguard_session::{PermissionResult, SessionManager, UserSession};
use callguard_structural::{StructuralRule, TaggedValue};

use crate::errors::RuleKind;

pub type TextField<A> = Arc<dyn Fn(&A) -> &str + Send + Sync>;
pub type BlobField<A> = Arc<dyn Fn(&A) -> &[u8] + Send + Sync>;
pub type NatField<A> = Arc<dyn Fn(&A) -> u128 + Send + Sync>;
pub type IntField<A> = Arc<dyn Fn(&A) -> i128 + Send + Sync>;
pub type ValueField<A> = Arc<dyn Fn(&A) -> TaggedValue + Send + Sync>;
pub type CustomPredicate<A> = Arc<dyn Fn(&RuleCall<'_, A>) -> Result<(), String> + Send + Sync>;
pub type DynamicAuthorizer<A> =
    Arc<dyn Fn(&RuleCall<'_, A>, &AuthView<'_>) -> Result<(), String> + Send + Sync>;

/// What a custom predicate sees: the untyped call metadata plus the
/// arguments extracted by the method's accessor.
pub struct RuleCall<'a, A> {
    pub call: CallInfo<'a>,
    pub args: &'a A,
}

impl<A> RuleCall<'_, A> {
    pub fn caller(&self) -> &CallerId {
        self.call.caller
    }

    pub fn method(&self) -> &str {
        self.call.method
    }
}

/// Read-only window onto session state for dynamic authorization callbacks.
pub struct AuthView<'a> {
    sessions: &'a SessionManager,
}

impl<'a> AuthView<'a> {
    pub(crate) fn new(sessions: &'a SessionManager) -> Self {
        Self { sessions }
    }

    pub fn session(&self, caller: &CallerId) -> Option<&'a UserSession> {
        self.sessions.peek_session(caller)
    }

    pub fn has_permission(&self, caller: &CallerId, permission: &str) -> PermissionResult {
        self.sessions.has_permission(caller, permission)
    }

    pub fn has_role(&self, caller: &CallerId, role: &str) -> bool {
        self.sessions.has_role(caller, role)
    }

    pub fn roles(&self, caller: &CallerId) -> Vec<String> {
        self.sessions.effective_roles(caller)
    }
}

/// One entry of a method's rule list. `A` is the argument type produced by
/// the method's accessor; field rules pull their value out of it.
///
/// Size and range bounds are inclusive at both ends.
pub enum ValidationRule<A> {
    TextSize {
        field: TextField<A>,
        min: usize,
        max: usize,
    },
    BlobSize {
        field: BlobField<A>,
        min: usize,
        max: usize,
    },
    NatRange {
        field: NatField<A>,
        min: u128,
        max: u128,
    },
    IntRange {
        field: IntField<A>,
        min: i128,
        max: i128,
    },
    RequireAuth,
    RequireRole(String),
    RequirePermission(String),
    AllowedCallers(Vec<CallerId>),
    BlockedCallers(Vec<CallerId>),
    BlockAll,
    /// Only local callers pass.
    BlockIngress,
    /// Consults the limiter for this method. A config given here is
    /// installed as the method's limit at registration.
    RateLimit(Option<RateLimitConfig>),
    CustomCheck(CustomPredicate<A>),
    DynamicAuth(DynamicAuthorizer<A>),
    Structural {
        field: ValueField<A>,
        rules: Vec<StructuralRule>,
    },
}

impl<A> ValidationRule<A> {
    pub fn text_size<F>(field: F, min: usize, max: usize) -> Self
    where
        F: Fn(&A) -> &str + Send + Sync + 'static,
    {
        Self::TextSize {
            field: Arc::new(field),
            min,
            max,
        }
    }

    pub fn blob_size<F>(field: F, min: usize, max: usize) -> Self
    where
        F: Fn(&A) -> &[u8] + Send + Sync + 'static,
    {
        Self::BlobSize {
            field: Arc::new(field),
            min,
            max,
        }
    }

    pub fn nat_range<F>(field: F, min: u128, max: u128) -> Self
    where
        F: Fn(&A) -> u128 + Send + Sync + 'static,
    {
        Self::NatRange {
            field: Arc::new(field),
            min,
            max,
        }
    }

    pub fn int_range<F>(field: F, min: i128, max: i128) -> Self
    where
        F: Fn(&A) -> i128 + Send + Sync + 'static,
    {
        Self::IntRange {
            field: Arc::new(field),
            min,
            max,
        }
    }

    pub fn require_role(role: impl Into<String>) -> Self {
        Self::RequireRole(role.into())
    }

    pub fn require_permission(permission: impl Into<String>) -> Self {
        Self::RequirePermission(permission.into())
    }

    pub fn rate_limit(config: RateLimitConfig) -> Self {
        Self::RateLimit(Some(config))
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&RuleCall<'_, A>) -> Result<(), String> + Send + Sync + 'static,
    {
        Self::CustomCheck(Arc::new(predicate))
    }

    pub fn dynamic_auth<F>(authorizer: F) -> Self
    where
        F: Fn(&RuleCall<'_, A>, &AuthView<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        Self::DynamicAuth(Arc::new(authorizer))
    }

    pub fn structural<F>(field: F, rules: Vec<StructuralRule>) -> Self
    where
        F: Fn(&A) -> TaggedValue + Send + Sync + 'static,
    {
        Self::Structural {
            field: Arc::new(field),
            rules,
        }
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            Self::TextSize { .. } => RuleKind::TextSize,
            Self::BlobSize { .. } => RuleKind::BlobSize,
            Self::NatRange { .. } => RuleKind::NatRange,
            Self::IntRange { .. } => RuleKind::IntRange,
            Self::RequireAuth => RuleKind::RequireAuth,
            Self::RequireRole(_) => RuleKind::RequireRole,
            Self::RequirePermission(_) => RuleKind::RequirePermission,
            Self::AllowedCallers(_) => RuleKind::AllowedCallers,
            Self::BlockedCallers(_) => RuleKind::BlockedCallers,
            Self::BlockAll => RuleKind::BlockAll,
            Self::BlockIngress => RuleKind::BlockIngress,
            Self::RateLimit(_) => RuleKind::RateLimit,
            Self::CustomCheck(_) => RuleKind::CustomCheck,
            Self::DynamicAuth(_) => RuleKind::DynamicAuth,
            Self::Structural { .. } => RuleKind::Structural("structural"),
        }
    }

    /// Whether evaluating this rule needs the accessor's output.
    pub fn needs_args(&self) -> bool {
        matches!(
            self,
            Self::TextSize { .. }
                | Self::BlobSize { .. }
                | Self::NatRange { .. }
                | Self::IntRange { .. }
                | Self::CustomCheck(_)
                | Self::DynamicAuth(_)
                | Self::Structural { .. }
        )
    }
}

impl<A> fmt::Debug for ValidationRule<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TextSize { min, max, .. }
            | Self::BlobSize { min, max, .. } => {
                write!(f, "{}({min}..={max})", self.kind())
            }
            Self::NatRange { min, max, .. } => write!(f, "natRange({min}..={max})"),
            Self::IntRange { min, max, .. } => write!(f, "intRange({min}..={max})"),
            Self::RequireRole(role) => write!(f, "requireRole({role})"),
            Self::RequirePermission(permission) => write!(f, "requirePermission({permission})"),
            Self::AllowedCallers(callers) | Self::BlockedCallers(callers) => {
                write!(f, "{}({} callers)", self.kind(), callers.len())
            }
            Self::RateLimit(Some(config)) => write!(
                f,
                "rateLimit({} per {})",
                config.max_requests, config.window
            ),
            Self::Structural { rules, .. } => write!(f, "structural({rules:?})"),
            other => f.write_str(other.kind().as_str()),
        }
    }
}
