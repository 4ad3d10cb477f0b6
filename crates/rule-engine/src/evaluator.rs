use std::fmt::Display;

use callguard_core_types::CallContext;
use callguard_rate_limiter::RateLimitResult;
use callguard_session::PermissionResult;
use callguard_structural::ValidationContext;
use once_cell::unsync::OnceCell;
use tracing::trace;

use crate::errors::{Rejection, RuleKind};
use crate::registry::{CheckFn, Scope};
use crate::rules::{AuthView, RuleCall, ValidationRule};

/// Root label of structural diagnostics, e.g. `args.profile.name`.
const ARGS_ROOT: &str = "args";

/// Captures a method's accessor and rules in one closure over `V`.
pub(crate) fn compile<V, A, F>(accessor: F, rules: Vec<ValidationRule<A>>) -> CheckFn<V>
where
    V: 'static,
    A: 'static,
    F: Fn(&V) -> Option<A> + Send + Sync + 'static,
{
    Box::new(move |call: &CallContext<V>, scope: &Scope<'_>| {
        let evaluation = Evaluation {
            call,
            accessor: &accessor,
            args: OnceCell::new(),
        };
        rules
            .iter()
            .try_for_each(|rule| evaluation.apply(rule, scope))
    })
}

struct Evaluation<'c, V, A, F> {
    call: &'c CallContext<V>,
    accessor: &'c F,
    /// Accessor output, computed by the first rule that needs it.
    args: OnceCell<Option<A>>,
}

impl<V, A, F> Evaluation<'_, V, A, F>
where
    F: Fn(&V) -> Option<A>,
{
    fn args(&self) -> Result<&A, Rejection> {
        self.args
            .get_or_init(|| (self.accessor)(&self.call.args))
            .as_ref()
            .ok_or_else(|| {
                Rejection::new(
                    RuleKind::Accessor,
                    format!("arguments do not match method {}", self.call.method),
                )
            })
    }

    fn rule_call(&self) -> Result<RuleCall<'_, A>, Rejection> {
        Ok(RuleCall {
            call: self.call.info(),
            args: self.args()?,
        })
    }

    fn apply(&self, rule: &ValidationRule<A>, scope: &Scope<'_>) -> Result<(), Rejection> {
        trace!(method = %self.call.method, rule = %rule.kind(), "evaluating rule");
        let caller = &self.call.caller;
        match rule {
            ValidationRule::TextSize { field, min, max } => {
                let length = field(self.args()?).chars().count();
                within(RuleKind::TextSize, length, *min, *max)
            }
            ValidationRule::BlobSize { field, min, max } => {
                within(RuleKind::BlobSize, field(self.args()?).len(), *min, *max)
            }
            ValidationRule::NatRange { field, min, max } => {
                within(RuleKind::NatRange, field(self.args()?), *min, *max)
            }
            ValidationRule::IntRange { field, min, max } => {
                within(RuleKind::IntRange, field(self.args()?), *min, *max)
            }
            ValidationRule::RequireAuth => {
                if caller.is_anonymous() {
                    return Err(Rejection::new(
                        RuleKind::RequireAuth,
                        "caller is not authenticated",
                    ));
                }
                if scope.require_session_for_auth && scope.sessions.peek_session(caller).is_none() {
                    return Err(Rejection::new(
                        RuleKind::RequireAuth,
                        format!("no active session for {caller}"),
                    ));
                }
                Ok(())
            }
            ValidationRule::RequireRole(role) => {
                if scope.sessions.has_role(caller, role) {
                    Ok(())
                } else {
                    Err(Rejection::new(
                        RuleKind::RequireRole,
                        format!("{caller} lacks role '{role}'"),
                    ))
                }
            }
            ValidationRule::RequirePermission(permission) => {
                match scope.sessions.has_permission(caller, permission) {
                    PermissionResult::Granted => Ok(()),
                    PermissionResult::Denied(reason) => {
                        Err(Rejection::new(RuleKind::RequirePermission, reason))
                    }
                    unknown @ PermissionResult::UnknownPermission(_) => {
                        Err(Rejection::new(RuleKind::RequirePermission, unknown.to_string()))
                    }
                }
            }
            ValidationRule::AllowedCallers(allowed) => {
                if allowed.contains(caller) {
                    Ok(())
                } else {
                    Err(Rejection::new(
                        RuleKind::AllowedCallers,
                        format!("{caller} is not on the allow list"),
                    ))
                }
            }
            ValidationRule::BlockedCallers(blocked) => {
                if blocked.contains(caller) {
                    Err(Rejection::new(
                        RuleKind::BlockedCallers,
                        format!("{caller} is blocked"),
                    ))
                } else {
                    Ok(())
                }
            }
            ValidationRule::BlockAll => Err(Rejection::new(
                RuleKind::BlockAll,
                format!("method {} is blocked", self.call.method),
            )),
            ValidationRule::BlockIngress => {
                if caller.is_local() {
                    Ok(())
                } else {
                    Err(Rejection::new(
                        RuleKind::BlockIngress,
                        format!("{caller} is not a local caller"),
                    ))
                }
            }
            ValidationRule::RateLimit(_) => {
                let Some(limiter) = scope.limiter else {
                    return Ok(());
                };
                let roles = scope.sessions.effective_roles(caller);
                match limiter.check(caller, &roles, &self.call.method) {
                    RateLimitResult::Allowed => Ok(()),
                    denied => Err(Rejection::new(RuleKind::RateLimit, denied.to_string())),
                }
            }
            ValidationRule::CustomCheck(predicate) => predicate(&self.rule_call()?)
                .map_err(|message| Rejection::new(RuleKind::CustomCheck, message)),
            ValidationRule::DynamicAuth(authorizer) => {
                let view = AuthView::new(scope.sessions);
                authorizer(&self.rule_call()?, &view)
                    .map_err(|message| Rejection::new(RuleKind::DynamicAuth, message))
            }
            ValidationRule::Structural { field, rules } => {
                let value = field(self.args()?);
                let ctx = ValidationContext::root(ARGS_ROOT);
                rules.iter().try_for_each(|structural| {
                    structural.check(&value, &ctx).map_err(|err| {
                        Rejection::new(RuleKind::Structural(structural.kind()), err.to_string())
                    })
                })
            }
        }
    }
}

fn within<T: PartialOrd + Display>(kind: RuleKind, value: T, min: T, max: T) -> Result<(), Rejection> {
    if value < min {
        return Err(Rejection::new(kind, format!("min {min} violated, got {value}")));
    }
    if value > max {
        return Err(Rejection::new(kind, format!("max {max} violated, got {value}")));
    }
    Ok(())
}
