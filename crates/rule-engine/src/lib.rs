//! Rule dispatcher: per-method rule lists bound to typed accessors and
//! stored behind one uniform `evaluate` entry point.

pub mod config;
pub mod engine;
pub mod errors;
mod evaluator;
pub mod loader;
pub mod registry;
pub mod rules;

pub use config::{EngineConfig, UnknownMethodPolicy};
pub use engine::{Engine, MaintenanceReport};
pub use errors::{ConfigError, Rejection, RuleKind};
pub use loader::{load_config, load_document, parse_document, LoadOptions};
pub use registry::{MethodHandle, MethodValidator, Phase};
pub use rules::{AuthView, RuleCall, ValidationRule};

#[cfg(test)]
mod tests;
