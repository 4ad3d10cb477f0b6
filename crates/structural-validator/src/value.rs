//! Generic tagged value tree.

use serde::{Deserialize, Serialize};

/// A recursively nested, self-describing value.
///
/// Scalars carry their width in the tag; composites hold further values.
/// `Class` is an ordered record of named properties.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaggedValue {
    Int(i128),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Nat(u128),
    Nat8(u8),
    Nat16(u16),
    Nat32(u32),
    Nat64(u64),
    Float(f64),
    Text(String),
    Bool(bool),
    Blob(Vec<u8>),
    Principal(String),
    Array(Vec<TaggedValue>),
    Set(Vec<TaggedValue>),
    Map(Vec<(String, TaggedValue)>),
    ValueMap(Vec<(TaggedValue, TaggedValue)>),
    Option(Option<Box<TaggedValue>>),
    Class(Vec<Property>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: TaggedValue,
    #[serde(default)]
    pub immutable: bool,
}

impl Property {
    pub fn new(name: impl Into<String>, value: TaggedValue) -> Self {
        Self {
            name: name.into(),
            value,
            immutable: false,
        }
    }

    pub fn immutable(name: impl Into<String>, value: TaggedValue) -> Self {
        Self {
            name: name.into(),
            value,
            immutable: true,
        }
    }
}

impl TaggedValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn class(properties: Vec<Property>) -> Self {
        Self::Class(properties)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "Int",
            Self::Int8(_) => "Int8",
            Self::Int16(_) => "Int16",
            Self::Int32(_) => "Int32",
            Self::Int64(_) => "Int64",
            Self::Nat(_) => "Nat",
            Self::Nat8(_) => "Nat8",
            Self::Nat16(_) => "Nat16",
            Self::Nat32(_) => "Nat32",
            Self::Nat64(_) => "Nat64",
            Self::Float(_) => "Float",
            Self::Text(_) => "Text",
            Self::Bool(_) => "Bool",
            Self::Blob(_) => "Blob",
            Self::Principal(_) => "Principal",
            Self::Array(_) => "Array",
            Self::Set(_) => "Set",
            Self::Map(_) => "Map",
            Self::ValueMap(_) => "ValueMap",
            Self::Option(_) => "Option",
            Self::Class(_) => "Class",
        }
    }

    /// Element count for composites, characters for text, bytes for blobs,
    /// 0 or 1 for options and 0 for every other scalar.
    pub fn size(&self) -> usize {
        match self {
            Self::Text(text) => text.chars().count(),
            Self::Blob(bytes) => bytes.len(),
            Self::Array(items) | Self::Set(items) => items.len(),
            Self::Map(entries) => entries.len(),
            Self::ValueMap(entries) => entries.len(),
            Self::Class(properties) => properties.len(),
            Self::Option(inner) => usize::from(inner.is_some()),
            _ => 0,
        }
    }

    /// Nesting depth: 0 for scalars, one more than the deepest child for
    /// containers. Options do not add a level.
    pub fn depth(&self) -> usize {
        match self {
            Self::Array(items) | Self::Set(items) => {
                1 + items.iter().map(TaggedValue::depth).max().unwrap_or(0)
            }
            Self::Map(entries) => 1 + entries.iter().map(|(_, v)| v.depth()).max().unwrap_or(0),
            Self::ValueMap(entries) => {
                1 + entries
                    .iter()
                    .map(|(k, v)| k.depth().max(v.depth()))
                    .max()
                    .unwrap_or(0)
            }
            Self::Class(properties) => {
                1 + properties
                    .iter()
                    .map(|p| p.value.depth())
                    .max()
                    .unwrap_or(0)
            }
            Self::Option(Some(inner)) => inner.depth(),
            _ => 0,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int(_)
                | Self::Int8(_)
                | Self::Int16(_)
                | Self::Int32(_)
                | Self::Int64(_)
                | Self::Nat(_)
                | Self::Nat8(_)
                | Self::Nat16(_)
                | Self::Nat32(_)
                | Self::Nat64(_)
                | Self::Float(_)
        )
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_properties(&self) -> Option<&[Property]> {
        match self {
            Self::Class(properties) => Some(properties),
            _ => None,
        }
    }

    /// Short rendering used in diagnostics; composites print their tag and size.
    pub fn summary(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Int8(v) => v.to_string(),
            Self::Int16(v) => v.to_string(),
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Nat(v) => v.to_string(),
            Self::Nat8(v) => v.to_string(),
            Self::Nat16(v) => v.to_string(),
            Self::Nat32(v) => v.to_string(),
            Self::Nat64(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Bool(v) => v.to_string(),
            Self::Text(v) => format!("{v:?}"),
            Self::Principal(v) => v.clone(),
            other => format!("{}({})", other.type_name(), other.size()),
        }
    }
}

/// First property named `name`, if any.
pub fn get_property<'a>(properties: &'a [Property], name: &str) -> Option<&'a TaggedValue> {
    properties
        .iter()
        .find(|property| property.name == name)
        .map(|property| &property.value)
}

impl From<&serde_json::Value> for TaggedValue {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => TaggedValue::Option(None),
            Value::Bool(flag) => TaggedValue::Bool(*flag),
            Value::Number(number) => {
                if let Some(unsigned) = number.as_u64() {
                    TaggedValue::Nat(u128::from(unsigned))
                } else if let Some(signed) = number.as_i64() {
                    TaggedValue::Int(i128::from(signed))
                } else {
                    TaggedValue::Float(number.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(text) => TaggedValue::Text(text.clone()),
            Value::Array(items) => TaggedValue::Array(items.iter().map(TaggedValue::from).collect()),
            Value::Object(map) => TaggedValue::Class(
                map.iter()
                    .map(|(name, value)| Property::new(name.clone(), TaggedValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for TaggedValue {
    fn from(value: serde_json::Value) -> Self {
        TaggedValue::from(&value)
    }
}
