//! Structural validation for generic tagged values.
//!
//! Payloads whose schema is not known ahead of time are modelled as a
//! [`TaggedValue`] tree (scalars, arrays, maps, named-property classes) and
//! checked against type, size, range, pattern and shape constraints. All
//! checks are fail-fast and report the dotted path of the first violation.

pub mod context;
pub mod errors;
pub mod pattern;
pub mod rules;
pub mod validator;
pub mod value;

pub use context::ValidationContext;
pub use errors::{SizeMeasure, ValidationError};
pub use pattern::{TextConstraints, TextPattern};
pub use rules::{validate, StructuralRule, ValuePredicate};
pub use validator::{
    validate_range, validate_size, validate_structure, validate_text_pattern, validate_type,
    StructureSpec,
};
pub use value::{get_property, Property, TaggedValue};
