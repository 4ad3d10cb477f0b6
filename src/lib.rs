//! Declarative front end for the callguard engine: policy documents compiled
//! into method validators, a scenario replayer, and the `callguard` CLI.

pub mod cli;
pub mod policy;
pub mod scenario;

pub use policy::{build_engine, MethodSpec, PolicyError, PolicyFile, RuleSpec, StructuralSpec};
pub use scenario::{Expectation, Scenario, ScenarioReport, Step, StepOutcome};
