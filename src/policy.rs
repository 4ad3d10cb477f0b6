//! Declarative method policies.
//!
//! A policy document lists methods and their rules; arguments are JSON
//! objects and rule fields are JSON pointers into them (`/text`,
//! `/profile/name`). The empty pointer addresses the whole argument.

use std::sync::Arc;

use callguard_core_types::{CallerId, Clock};
use callguard_engine::{ConfigError, Engine, EngineConfig, Phase, RuleKind, ValidationRule};
use callguard_rate_limiter::{RateLimitConfig, TimeWindow};
use callguard_structural::{StructuralRule, StructureSpec, TaggedValue, TextConstraints};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("method {method}: field '{field}' is not a JSON pointer")]
    InvalidField { method: String, field: String },
    #[error("method {method} is declared twice for the {phase} phase")]
    DuplicateMethod { method: String, phase: Phase },
    #[error("method {method}: rate_limit needs both max_requests and window, or neither")]
    IncompleteRateLimit { method: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PolicyFile {
    #[serde(flatten)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub methods: Vec<MethodSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodSpec {
    pub name: String,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleSpec {
    TextSize {
        field: String,
        min: usize,
        max: usize,
    },
    /// Byte length of a string field.
    BlobSize {
        field: String,
        min: usize,
        max: usize,
    },
    NatRange {
        field: String,
        min: u64,
        max: u64,
    },
    IntRange {
        field: String,
        min: i64,
        max: i64,
    },
    RequireAuth,
    RequireRole {
        role: String,
    },
    RequirePermission {
        permission: String,
    },
    AllowedCallers {
        callers: Vec<CallerId>,
    },
    BlockedCallers {
        callers: Vec<CallerId>,
    },
    BlockAll,
    BlockIngress,
    /// Without `max_requests` and `window` the limits configured under
    /// `rate_limits` apply.
    RateLimit {
        #[serde(default)]
        max_requests: Option<u32>,
        #[serde(default)]
        window: Option<TimeWindow>,
        #[serde(default)]
        exempt_roles: Vec<String>,
        #[serde(default)]
        exempt_callers: Vec<CallerId>,
    },
    Structural {
        #[serde(default)]
        field: String,
        checks: Vec<StructuralSpec>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum StructuralSpec {
    Type {
        types: Vec<String>,
    },
    Size {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    Depth {
        max: usize,
    },
    Pattern(TextConstraints),
    Range {
        #[serde(default)]
        min: Option<Value>,
        #[serde(default)]
        max: Option<Value>,
    },
    Shape(StructureSpec),
    PropertyExists {
        property: String,
    },
    PropertyType {
        property: String,
        types: Vec<String>,
    },
    PropertySize {
        property: String,
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    ArrayLength {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    ArrayItemType {
        types: Vec<String>,
    },
    MapKeyExists {
        key: String,
    },
    MapSize {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    Nested {
        property: String,
        checks: Vec<StructuralSpec>,
    },
}

impl StructuralSpec {
    fn compile(&self) -> StructuralRule {
        match self {
            Self::Type { types } => StructuralRule::Type(types.clone()),
            Self::Size { min, max } => StructuralRule::Size {
                min: *min,
                max: *max,
            },
            Self::Depth { max } => StructuralRule::Depth { max: *max },
            Self::Pattern(constraints) => StructuralRule::Pattern(constraints.clone()),
            Self::Range { min, max } => StructuralRule::Range {
                min: min.as_ref().map(TaggedValue::from),
                max: max.as_ref().map(TaggedValue::from),
            },
            Self::Shape(spec) => StructuralRule::Shape(spec.clone()),
            Self::PropertyExists { property } => StructuralRule::PropertyExists(property.clone()),
            Self::PropertyType { property, types } => StructuralRule::PropertyType {
                property: property.clone(),
                expected: types.clone(),
            },
            Self::PropertySize { property, min, max } => StructuralRule::PropertySize {
                property: property.clone(),
                min: *min,
                max: *max,
            },
            Self::ArrayLength { min, max } => StructuralRule::ArrayLength {
                min: *min,
                max: *max,
            },
            Self::ArrayItemType { types } => StructuralRule::ArrayItemType(types.clone()),
            Self::MapKeyExists { key } => StructuralRule::MapKeyExists(key.clone()),
            Self::MapSize { min, max } => StructuralRule::MapSize {
                min: *min,
                max: *max,
            },
            Self::Nested { property, checks } => StructuralRule::nested(
                property.clone(),
                checks.iter().map(StructuralSpec::compile).collect(),
            ),
        }
    }
}

/// JSON type a primitive rule needs at its pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FieldKind {
    Text,
    Nat,
    Int,
}

impl FieldKind {
    fn matches(self, value: Option<&Value>) -> bool {
        match (self, value) {
            (FieldKind::Text, Some(Value::String(_))) => true,
            (FieldKind::Nat, Some(value)) => value.as_u64().is_some(),
            (FieldKind::Int, Some(value)) => value.as_i64().is_some(),
            _ => false,
        }
    }
}

/// Builds an engine from `policy`, registering every declared method.
pub fn build_engine(policy: &PolicyFile, clock: Arc<dyn Clock>) -> Result<Engine<Value>, PolicyError> {
    let mut engine = Engine::with_config(policy.engine.clone(), clock);
    for method in &policy.methods {
        if engine.is_registered(method.phase, &method.name) {
            return Err(PolicyError::DuplicateMethod {
                method: method.name.clone(),
                phase: method.phase,
            });
        }
        let (rules, requirements) = compile_rules(method)?;
        let handle = engine.register(
            method.phase,
            method.name.clone(),
            method.read_only,
            rules,
            move |args: &Value| {
                requirements
                    .iter()
                    .all(|(pointer, kind)| kind.matches(args.pointer(pointer)))
                    .then(|| args.clone())
            },
        );
        if handle.rules.contains(&RuleKind::RateLimit)
            && engine.method_rate_limit(&method.name).is_none()
            && policy.engine.rate_limits.global.is_none()
        {
            warn!(
                method = %method.name,
                phase = %method.phase,
                "rate_limit rule has no method or global limit to enforce"
            );
        }
    }
    info!(
        methods = policy.methods.len(),
        roles = policy.engine.roles.len(),
        "policy compiled"
    );
    Ok(engine)
}

type Compiled = (Vec<ValidationRule<Value>>, Vec<(String, FieldKind)>);

fn compile_rules(method: &MethodSpec) -> Result<Compiled, PolicyError> {
    let mut rules = Vec::with_capacity(method.rules.len());
    let mut requirements = Vec::new();

    for spec in &method.rules {
        let rule = match spec {
            RuleSpec::TextSize { field, min, max } => {
                let pointer = pointer(method, field)?;
                requirements.push((pointer.clone(), FieldKind::Text));
                ValidationRule::text_size(
                    move |args: &Value| args.pointer(&pointer).and_then(Value::as_str).unwrap_or_default(),
                    *min,
                    *max,
                )
            }
            RuleSpec::BlobSize { field, min, max } => {
                let pointer = pointer(method, field)?;
                requirements.push((pointer.clone(), FieldKind::Text));
                ValidationRule::blob_size(
                    move |args: &Value| {
                        args.pointer(&pointer)
                            .and_then(Value::as_str)
                            .map(str::as_bytes)
                            .unwrap_or_default()
                    },
                    *min,
                    *max,
                )
            }
            RuleSpec::NatRange { field, min, max } => {
                let pointer = pointer(method, field)?;
                requirements.push((pointer.clone(), FieldKind::Nat));
                ValidationRule::nat_range(
                    move |args: &Value| {
                        u128::from(args.pointer(&pointer).and_then(Value::as_u64).unwrap_or_default())
                    },
                    u128::from(*min),
                    u128::from(*max),
                )
            }
            RuleSpec::IntRange { field, min, max } => {
                let pointer = pointer(method, field)?;
                requirements.push((pointer.clone(), FieldKind::Int));
                ValidationRule::int_range(
                    move |args: &Value| {
                        i128::from(args.pointer(&pointer).and_then(Value::as_i64).unwrap_or_default())
                    },
                    i128::from(*min),
                    i128::from(*max),
                )
            }
            RuleSpec::RequireAuth => ValidationRule::RequireAuth,
            RuleSpec::RequireRole { role } => ValidationRule::require_role(role.clone()),
            RuleSpec::RequirePermission { permission } => {
                ValidationRule::require_permission(permission.clone())
            }
            RuleSpec::AllowedCallers { callers } => ValidationRule::AllowedCallers(callers.clone()),
            RuleSpec::BlockedCallers { callers } => ValidationRule::BlockedCallers(callers.clone()),
            RuleSpec::BlockAll => ValidationRule::BlockAll,
            RuleSpec::BlockIngress => ValidationRule::BlockIngress,
            RuleSpec::RateLimit {
                max_requests,
                window,
                exempt_roles,
                exempt_callers,
            } => {
                let config = match (max_requests, window) {
                    (Some(max_requests), Some(window)) => Some(RateLimitConfig {
                        max_requests: *max_requests,
                        window: *window,
                        exempt_roles: exempt_roles.clone(),
                        exempt_callers: exempt_callers.clone(),
                    }),
                    (None, None) => None,
                    _ => {
                        return Err(PolicyError::IncompleteRateLimit {
                            method: method.name.clone(),
                        })
                    }
                };
                ValidationRule::RateLimit(config)
            }
            RuleSpec::Structural { field, checks } => {
                let pointer = pointer(method, field)?;
                ValidationRule::structural(
                    move |args: &Value| match args.pointer(&pointer) {
                        Some(value) => TaggedValue::from(value),
                        None => TaggedValue::Option(None),
                    },
                    checks.iter().map(StructuralSpec::compile).collect(),
                )
            }
        };
        rules.push(rule);
    }
    Ok((rules, requirements))
}

fn pointer(method: &MethodSpec, field: &str) -> Result<String, PolicyError> {
    if field.is_empty() || field.starts_with('/') {
        Ok(field.to_string())
    } else {
        Err(PolicyError::InvalidField {
            method: method.name.clone(),
            field: field.to_string(),
        })
    }
}
