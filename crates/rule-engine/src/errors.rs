use std::fmt;

use thiserror::Error;

/// Rule family that produced a rejection; rendered as the diagnostic prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Accessor,
    UnknownMethod,
    TextSize,
    BlobSize,
    NatRange,
    IntRange,
    RequireAuth,
    RequireRole,
    RequirePermission,
    AllowedCallers,
    BlockedCallers,
    BlockAll,
    BlockIngress,
    RateLimit,
    CustomCheck,
    DynamicAuth,
    /// `"structural"` for a whole structural rule list; rejections carry
    /// the failing structural rule's own kind name.
    Structural(&'static str),
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Accessor => "accessor",
            RuleKind::UnknownMethod => "unknownMethod",
            RuleKind::TextSize => "textSize",
            RuleKind::BlobSize => "blobSize",
            RuleKind::NatRange => "natRange",
            RuleKind::IntRange => "intRange",
            RuleKind::RequireAuth => "requireAuth",
            RuleKind::RequireRole => "requireRole",
            RuleKind::RequirePermission => "requirePermission",
            RuleKind::AllowedCallers => "allowedCallers",
            RuleKind::BlockedCallers => "blockedCallers",
            RuleKind::BlockAll => "blockAll",
            RuleKind::BlockIngress => "blockIngress",
            RuleKind::RateLimit => "rateLimit",
            RuleKind::CustomCheck => "customCheck",
            RuleKind::DynamicAuth => "dynamicAuth",
            RuleKind::Structural(kind) => kind,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First failing rule of an evaluation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct Rejection {
    pub kind: RuleKind,
    pub detail: String,
}

impl Rejection {
    pub fn new(kind: RuleKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("invalid override {path}: {reason}")]
    InvalidOverride { path: String, reason: String },
}
