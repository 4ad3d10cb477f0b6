//! Rule lists evaluated against a tagged value.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::context::ValidationContext;
use crate::errors::{SizeMeasure, ValidationError};
use crate::pattern::TextConstraints;
use crate::validator::{
    check_bounds, validate_range, validate_size, validate_structure, validate_text_pattern,
    validate_type, StructureSpec,
};
use crate::value::{get_property, Property, TaggedValue};

pub type ValuePredicate =
    Arc<dyn Fn(&TaggedValue, &ValidationContext) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
pub enum StructuralRule {
    Type(Vec<String>),
    Size {
        min: Option<usize>,
        max: Option<usize>,
    },
    /// Absolute depth from the validation root: `ctx.depth + value.depth()`.
    Depth { max: usize },
    Pattern(TextConstraints),
    Range {
        min: Option<TaggedValue>,
        max: Option<TaggedValue>,
    },
    Shape(StructureSpec),
    PropertyExists(String),
    PropertyType {
        property: String,
        expected: Vec<String>,
    },
    PropertySize {
        property: String,
        min: Option<usize>,
        max: Option<usize>,
    },
    ArrayLength {
        min: Option<usize>,
        max: Option<usize>,
    },
    ArrayItemType(Vec<String>),
    MapKeyExists(String),
    MapSize {
        min: Option<usize>,
        max: Option<usize>,
    },
    Custom(ValuePredicate),
    Nested {
        property: String,
        rules: Vec<StructuralRule>,
    },
}

impl StructuralRule {
    pub fn of_type<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Type(names.into_iter().map(Into::into).collect())
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&TaggedValue, &ValidationContext) -> Result<(), String> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    pub fn nested(property: impl Into<String>, rules: Vec<StructuralRule>) -> Self {
        Self::Nested {
            property: property.into(),
            rules,
        }
    }

    /// Rule kind used as the prefix of engine diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Type(_) => "valueType",
            Self::Size { .. } => "valueSize",
            Self::Depth { .. } => "valueDepth",
            Self::Pattern(_) => "valuePattern",
            Self::Range { .. } => "valueRange",
            Self::Shape(_) => "valueShape",
            Self::PropertyExists(_) => "propertyExists",
            Self::PropertyType { .. } => "propertyType",
            Self::PropertySize { .. } => "propertySize",
            Self::ArrayLength { .. } => "arrayLength",
            Self::ArrayItemType(_) => "arrayItemType",
            Self::MapKeyExists(_) => "mapKeyExists",
            Self::MapSize { .. } => "mapSize",
            Self::Custom(_) => "valueCustom",
            Self::Nested { .. } => "valueNested",
        }
    }

    pub fn check(&self, value: &TaggedValue, ctx: &ValidationContext) -> Result<(), ValidationError> {
        trace!(rule = self.kind(), path = %ctx.path, "structural check");
        match self {
            Self::Type(expected) => validate_type(value, expected, ctx),
            Self::Size { min, max } => validate_size(value, *min, *max, ctx),
            Self::Depth { max } => check_bounds(
                ctx.depth + value.depth(),
                None,
                Some(*max),
                SizeMeasure::Depth,
                ctx,
            ),
            Self::Pattern(constraints) => {
                let text = value
                    .as_text()
                    .ok_or_else(|| invalid_type(value, &["Text"], ctx))?;
                validate_text_pattern(text, constraints, ctx)
            }
            Self::Range { min, max } => validate_range(value, min.as_ref(), max.as_ref(), ctx),
            Self::Shape(spec) => validate_structure(class_properties(value, ctx)?, spec, ctx),
            Self::PropertyExists(name) => {
                property_value(class_properties(value, ctx)?, name, ctx).map(|_| ())
            }
            Self::PropertyType { property, expected } => {
                let child = property_value(class_properties(value, ctx)?, property, ctx)?;
                validate_type(child, expected, &ctx.child(property))
            }
            Self::PropertySize { property, min, max } => {
                let child = property_value(class_properties(value, ctx)?, property, ctx)?;
                validate_size(child, *min, *max, &ctx.child(property))
            }
            Self::ArrayLength { min, max } => {
                let items = array_items(value, ctx)?;
                check_bounds(items.len(), *min, *max, SizeMeasure::Elements, ctx)
            }
            Self::ArrayItemType(expected) => {
                for (index, item) in array_items(value, ctx)?.iter().enumerate() {
                    validate_type(item, expected, &ctx.index(index))?;
                }
                Ok(())
            }
            Self::MapKeyExists(key) => {
                let found = match value {
                    TaggedValue::Map(entries) => entries.iter().any(|(k, _)| k == key),
                    TaggedValue::ValueMap(entries) => {
                        entries.iter().any(|(k, _)| k.as_text() == Some(key.as_str()))
                    }
                    other => return Err(invalid_type(other, &["Map", "ValueMap"], ctx)),
                };
                if found {
                    Ok(())
                } else {
                    Err(ValidationError::MissingProperty {
                        path: ctx.path.clone(),
                        property: key.clone(),
                    })
                }
            }
            Self::MapSize { min, max } => match value {
                TaggedValue::Map(_) | TaggedValue::ValueMap(_) => {
                    validate_size(value, *min, *max, ctx)
                }
                other => Err(invalid_type(other, &["Map", "ValueMap"], ctx)),
            },
            Self::Custom(predicate) => {
                predicate(value, ctx).map_err(|message| ValidationError::CustomError {
                    path: ctx.path.clone(),
                    message,
                })
            }
            Self::Nested { property, rules } => {
                let child = property_value(class_properties(value, ctx)?, property, ctx)?;
                validate(child, rules, &ctx.child(property))
            }
        }
    }
}

impl fmt::Debug for StructuralRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(_) => f.write_str("Custom(<predicate>)"),
            Self::Nested { property, rules } => f
                .debug_struct("Nested")
                .field("property", property)
                .field("rules", rules)
                .finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// Evaluates `rules` in order and stops at the first failure.
pub fn validate(
    value: &TaggedValue,
    rules: &[StructuralRule],
    ctx: &ValidationContext,
) -> Result<(), ValidationError> {
    rules.iter().try_for_each(|rule| rule.check(value, ctx))
}

fn invalid_type(value: &TaggedValue, expected: &[&str], ctx: &ValidationContext) -> ValidationError {
    ValidationError::InvalidType {
        path: ctx.path.clone(),
        expected: expected.iter().map(|name| name.to_string()).collect(),
        found: value.type_name().to_string(),
    }
}

fn class_properties<'a>(
    value: &'a TaggedValue,
    ctx: &ValidationContext,
) -> Result<&'a [Property], ValidationError> {
    value
        .as_properties()
        .ok_or_else(|| invalid_type(value, &["Class"], ctx))
}

fn property_value<'a>(
    properties: &'a [Property],
    name: &str,
    ctx: &ValidationContext,
) -> Result<&'a TaggedValue, ValidationError> {
    get_property(properties, name).ok_or_else(|| ValidationError::MissingProperty {
        path: ctx.path.clone(),
        property: name.to_string(),
    })
}

fn array_items<'a>(
    value: &'a TaggedValue,
    ctx: &ValidationContext,
) -> Result<&'a [TaggedValue], ValidationError> {
    match value {
        TaggedValue::Array(items) | TaggedValue::Set(items) => Ok(items),
        other => Err(invalid_type(other, &["Array", "Set"], ctx)),
    }
}
