//! Named text patterns.
//!
//! Only the presets below are supported. Arbitrary regular expressions are
//! not accepted from policy input.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]*$").unwrap());
static ALPHABETIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]*$").unwrap());
static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]*$").unwrap());
static HEXADECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]*$").unwrap());
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap());
static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@.]+(?:\.[^\s@.]+)+$").unwrap());

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextPattern {
    Alphanumeric,
    Alphabetic,
    Numeric,
    Hexadecimal,
    Identifier,
    Slug,
    Email,
}

impl TextPattern {
    pub fn matches(&self, text: &str) -> bool {
        let regex: &Regex = match self {
            TextPattern::Alphanumeric => &ALPHANUMERIC,
            TextPattern::Alphabetic => &ALPHABETIC,
            TextPattern::Numeric => &NUMERIC,
            TextPattern::Hexadecimal => &HEXADECIMAL,
            TextPattern::Identifier => &IDENTIFIER,
            TextPattern::Slug => &SLUG,
            TextPattern::Email => &EMAIL,
        };
        regex.is_match(text)
    }
}

impl fmt::Display for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TextPattern::Alphanumeric => "alphanumeric",
            TextPattern::Alphabetic => "alphabetic",
            TextPattern::Numeric => "numeric",
            TextPattern::Hexadecimal => "hexadecimal",
            TextPattern::Identifier => "identifier",
            TextPattern::Slug => "slug",
            TextPattern::Email => "email",
        })
    }
}

/// Constraints applied to a text value, checked in field order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextConstraints {
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub allowed_values: Option<Vec<String>>,
    #[serde(default)]
    pub pattern: Option<TextPattern>,
}

impl TextConstraints {
    pub fn length(min: Option<usize>, max: Option<usize>) -> Self {
        Self {
            min_length: min,
            max_length: max,
            ..Self::default()
        }
    }

    pub fn with_pattern(mut self, pattern: TextPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}
