use std::fmt;

use thiserror::Error;

/// What a size bound was measured in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeMeasure {
    Elements,
    Characters,
    Bytes,
    Depth,
}

impl fmt::Display for SizeMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SizeMeasure::Elements => "size",
            SizeMeasure::Characters => "length",
            SizeMeasure::Bytes => "byte length",
            SizeMeasure::Depth => "depth",
        })
    }
}

/// Failure reported by the structural validator. `path` is the dotted
/// location of the offending value, e.g. `value.items[2].name`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{path}: expected {}, found {found}", .expected.join(" | "))]
    InvalidType {
        path: String,
        expected: Vec<String>,
        found: String,
    },
    #[error("{path}: {value} outside {}", fmt_bounds(.min, .max))]
    OutOfRange {
        path: String,
        value: String,
        min: Option<String>,
        max: Option<String>,
    },
    #[error("{path}: {measure} {actual} outside {}", fmt_bounds(.min, .max))]
    InvalidSize {
        path: String,
        measure: SizeMeasure,
        actual: usize,
        min: Option<usize>,
        max: Option<usize>,
    },
    #[error("{path}: missing property '{property}'")]
    MissingProperty { path: String, property: String },
    #[error("{path}: {reason}")]
    InvalidPattern { path: String, reason: String },
    #[error("{path}: {message}")]
    CustomError { path: String, message: String },
}

impl ValidationError {
    pub fn path(&self) -> &str {
        match self {
            ValidationError::InvalidType { path, .. }
            | ValidationError::OutOfRange { path, .. }
            | ValidationError::InvalidSize { path, .. }
            | ValidationError::MissingProperty { path, .. }
            | ValidationError::InvalidPattern { path, .. }
            | ValidationError::CustomError { path, .. } => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::InvalidType { .. } => "InvalidType",
            ValidationError::OutOfRange { .. } => "OutOfRange",
            ValidationError::InvalidSize { .. } => "InvalidSize",
            ValidationError::MissingProperty { .. } => "MissingProperty",
            ValidationError::InvalidPattern { .. } => "InvalidPattern",
            ValidationError::CustomError { .. } => "CustomError",
        }
    }
}

fn fmt_bounds<T: fmt::Display>(min: &Option<T>, max: &Option<T>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("[{min}, {max}]"),
        (Some(min), None) => format!("[{min}, ∞)"),
        (None, Some(max)) => format!("(-∞, {max}]"),
        (None, None) => "(-∞, ∞)".to_string(),
    }
}
