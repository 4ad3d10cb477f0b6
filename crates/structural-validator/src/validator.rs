//! Primitive checks over tagged values. Every function is fail-fast and
//! reports the first violation it finds.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::context::ValidationContext;
use crate::errors::{SizeMeasure, ValidationError};
use crate::pattern::TextConstraints;
use crate::value::{Property, TaggedValue};

/// Declared shape of a `Class` value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSpec {
    #[serde(default)]
    pub required_properties: Vec<String>,
    #[serde(default)]
    pub optional_properties: Vec<String>,
    #[serde(default = "default_allow_additional")]
    pub allow_additional_properties: bool,
    #[serde(default)]
    pub max_depth: Option<usize>,
}

fn default_allow_additional() -> bool {
    true
}

impl StructureSpec {
    pub fn required<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_properties: names.into_iter().map(Into::into).collect(),
            allow_additional_properties: true,
            ..Self::default()
        }
    }

    pub fn with_optional<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_properties = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn closed(mut self) -> Self {
        self.allow_additional_properties = false;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }
}

pub fn validate_type(
    value: &TaggedValue,
    expected: &[String],
    ctx: &ValidationContext,
) -> Result<(), ValidationError> {
    let found = value.type_name();
    if expected.iter().any(|name| name == found) {
        return Ok(());
    }
    Err(ValidationError::InvalidType {
        path: ctx.path.clone(),
        expected: expected.to_vec(),
        found: found.to_string(),
    })
}

pub fn validate_size(
    value: &TaggedValue,
    min: Option<usize>,
    max: Option<usize>,
    ctx: &ValidationContext,
) -> Result<(), ValidationError> {
    let measure = match value {
        TaggedValue::Text(_) => SizeMeasure::Characters,
        TaggedValue::Blob(_) => SizeMeasure::Bytes,
        _ => SizeMeasure::Elements,
    };
    check_bounds(value.size(), min, max, measure, ctx)
}

pub(crate) fn check_bounds(
    actual: usize,
    min: Option<usize>,
    max: Option<usize>,
    measure: SizeMeasure,
    ctx: &ValidationContext,
) -> Result<(), ValidationError> {
    let below = min.is_some_and(|min| actual < min);
    let above = max.is_some_and(|max| actual > max);
    if below || above {
        return Err(ValidationError::InvalidSize {
            path: ctx.path.clone(),
            measure,
            actual,
            min,
            max,
        });
    }
    Ok(())
}

/// Length, then allow-list membership, then the named pattern.
pub fn validate_text_pattern(
    text: &str,
    constraints: &TextConstraints,
    ctx: &ValidationContext,
) -> Result<(), ValidationError> {
    check_bounds(
        text.chars().count(),
        constraints.min_length,
        constraints.max_length,
        SizeMeasure::Characters,
        ctx,
    )?;

    if let Some(allowed) = &constraints.allowed_values {
        if !allowed.iter().any(|candidate| candidate == text) {
            return Err(ValidationError::InvalidPattern {
                path: ctx.path.clone(),
                reason: format!("{text:?} is not one of the allowed values"),
            });
        }
    }

    if let Some(pattern) = constraints.pattern {
        if !pattern.matches(text) {
            return Err(ValidationError::InvalidPattern {
                path: ctx.path.clone(),
                reason: format!("{text:?} does not match the {pattern} pattern"),
            });
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Numeric {
    Signed(i128),
    Unsigned(u128),
    Float(f64),
}

fn numeric(value: &TaggedValue) -> Option<Numeric> {
    Some(match value {
        TaggedValue::Int(v) => Numeric::Signed(*v),
        TaggedValue::Int8(v) => Numeric::Signed(i128::from(*v)),
        TaggedValue::Int16(v) => Numeric::Signed(i128::from(*v)),
        TaggedValue::Int32(v) => Numeric::Signed(i128::from(*v)),
        TaggedValue::Int64(v) => Numeric::Signed(i128::from(*v)),
        TaggedValue::Nat(v) => Numeric::Unsigned(*v),
        TaggedValue::Nat8(v) => Numeric::Unsigned(u128::from(*v)),
        TaggedValue::Nat16(v) => Numeric::Unsigned(u128::from(*v)),
        TaggedValue::Nat32(v) => Numeric::Unsigned(u128::from(*v)),
        TaggedValue::Nat64(v) => Numeric::Unsigned(u128::from(*v)),
        TaggedValue::Float(v) => Numeric::Float(*v),
        _ => return None,
    })
}

/// Integers compare by exact value across widths and signedness. Floats
/// only compare with floats. `None` means the pair is not comparable.
fn compare(a: Numeric, b: Numeric) -> Option<Ordering> {
    match (a, b) {
        (Numeric::Signed(a), Numeric::Signed(b)) => Some(a.cmp(&b)),
        (Numeric::Unsigned(a), Numeric::Unsigned(b)) => Some(a.cmp(&b)),
        (Numeric::Signed(a), Numeric::Unsigned(b)) => Some(match u128::try_from(a) {
            Ok(a) => a.cmp(&b),
            Err(_) => Ordering::Less,
        }),
        (Numeric::Unsigned(_), Numeric::Signed(_)) => compare(b, a).map(Ordering::reverse),
        (Numeric::Float(a), Numeric::Float(b)) => a.partial_cmp(&b),
        _ => None,
    }
}

const INTEGER_TYPES: &[&str] = &[
    "Int", "Int8", "Int16", "Int32", "Int64", "Nat", "Nat8", "Nat16", "Nat32", "Nat64",
];

fn comparable_types(bound: Numeric) -> Vec<String> {
    match bound {
        Numeric::Float(_) => vec!["Float".to_string()],
        _ => INTEGER_TYPES.iter().map(|name| name.to_string()).collect(),
    }
}

pub fn validate_range(
    value: &TaggedValue,
    min: Option<&TaggedValue>,
    max: Option<&TaggedValue>,
    ctx: &ValidationContext,
) -> Result<(), ValidationError> {
    let actual = numeric(value).ok_or_else(|| ValidationError::InvalidType {
        path: ctx.path.clone(),
        expected: vec!["numeric".to_string()],
        found: value.type_name().to_string(),
    })?;

    let out_of_range = || ValidationError::OutOfRange {
        path: ctx.path.clone(),
        value: value.summary(),
        min: min.map(TaggedValue::summary),
        max: max.map(TaggedValue::summary),
    };

    for (bound, violated_when) in [(min, Ordering::Less), (max, Ordering::Greater)] {
        let Some(bound) = bound else {
            continue;
        };
        let bound_num = numeric(bound).ok_or_else(|| ValidationError::InvalidType {
            path: ctx.path.clone(),
            expected: vec!["numeric bound".to_string()],
            found: bound.type_name().to_string(),
        })?;
        match compare(actual, bound_num) {
            Some(ordering) if ordering == violated_when => return Err(out_of_range()),
            Some(_) => {}
            None if matches!(actual, Numeric::Float(v) if v.is_nan()) => {
                return Err(out_of_range())
            }
            None => {
                return Err(ValidationError::InvalidType {
                    path: ctx.path.clone(),
                    expected: comparable_types(bound_num),
                    found: value.type_name().to_string(),
                })
            }
        }
    }
    Ok(())
}

/// Checks depth, required properties, then undeclared properties.
pub fn validate_structure(
    properties: &[Property],
    spec: &StructureSpec,
    ctx: &ValidationContext,
) -> Result<(), ValidationError> {
    if let Some(max_depth) = spec.max_depth {
        check_bounds(ctx.depth, None, Some(max_depth), SizeMeasure::Depth, ctx)?;
    }

    let present: HashSet<&str> = properties.iter().map(|p| p.name.as_str()).collect();
    if let Some(missing) = spec
        .required_properties
        .iter()
        .find(|name| !present.contains(name.as_str()))
    {
        return Err(ValidationError::MissingProperty {
            path: ctx.path.clone(),
            property: missing.clone(),
        });
    }

    if !spec.allow_additional_properties {
        let declared: HashSet<&str> = spec
            .required_properties
            .iter()
            .chain(&spec.optional_properties)
            .map(String::as_str)
            .collect();
        if let Some(extra) = properties
            .iter()
            .find(|property| !declared.contains(property.name.as_str()))
        {
            return Err(ValidationError::CustomError {
                path: ctx.child(&extra.name).path,
                message: format!("undeclared property '{}'", extra.name),
            });
        }
    }
    Ok(())
}
