//! Replays a scripted sequence of sessions, clock advances and calls against
//! a compiled policy, under simulated time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use callguard_core_types::{duration_str, CallContext, CallerId, ManualClock, Timestamp};
use callguard_session::RoleDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::policy::{build_engine, PolicyError, PolicyFile};

/// 2023-11-14T22:13:20Z; scenarios start from a fixed instant.
const SCENARIO_EPOCH: Timestamp = Timestamp(1_700_000_000_000_000_000);

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    Accept,
    Reject,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    DefineRole {
        role: RoleDefinition,
    },
    Login {
        caller: CallerId,
        #[serde(default)]
        roles: Vec<String>,
        #[serde(default, with = "duration_str::option")]
        ttl: Option<Duration>,
    },
    Logout {
        caller: CallerId,
    },
    Advance {
        #[serde(with = "duration_str")]
        by: Duration,
    },
    Call {
        method: String,
        caller: CallerId,
        #[serde(default)]
        args: Value,
        #[serde(default)]
        boundary: bool,
        #[serde(default)]
        read_only: bool,
        #[serde(default)]
        expect: Option<Expectation>,
    },
    Maintenance,
}

impl Step {
    fn action(&self) -> &'static str {
        match self {
            Step::DefineRole { .. } => "define_role",
            Step::Login { .. } => "login",
            Step::Logout { .. } => "logout",
            Step::Advance { .. } => "advance",
            Step::Call { .. } => "call",
            Step::Maintenance => "maintenance",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub action: &'static str,
    pub summary: String,
    /// Set for calls only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub expectation_met: bool,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: {}", self.step, self.action, self.summary)?;
        match (self.accepted, &self.reason) {
            (Some(true), _) => f.write_str(" -> accepted")?,
            (Some(false), Some(reason)) => write!(f, " -> rejected ({reason})")?,
            (None, Some(reason)) => write!(f, " -> failed ({reason})")?,
            _ => {}
        }
        if !self.expectation_met {
            f.write_str(" [UNEXPECTED]")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ScenarioReport {
    pub outcomes: Vec<StepOutcome>,
    pub accepted: usize,
    pub rejected: usize,
    pub mismatches: usize,
}

/// Runs every step in order. Step failures (e.g. a login for the anonymous
/// caller) are reported in the outcome and do not stop the run.
pub fn run(policy: &PolicyFile, scenario: &Scenario) -> Result<ScenarioReport, PolicyError> {
    let clock = Arc::new(ManualClock::new(SCENARIO_EPOCH));
    let engine = build_engine(policy, clock.clone())?;
    let mut report = ScenarioReport::default();

    for (index, step) in scenario.steps.iter().enumerate() {
        let mut outcome = StepOutcome {
            step: index + 1,
            action: step.action(),
            summary: String::new(),
            accepted: None,
            reason: None,
            expectation_met: true,
        };
        match step {
            Step::DefineRole { role } => {
                outcome.summary = format!("{} inherits {:?}", role.name, role.inherits);
                engine.define_role(role.clone());
            }
            Step::Login { caller, roles, ttl } => {
                outcome.summary = format!("{caller} as [{}]", roles.join(", "));
                if let Err(err) =
                    engine.create_session(caller.clone(), roles.clone(), BTreeMap::new(), *ttl)
                {
                    outcome.reason = Some(err.to_string());
                }
            }
            Step::Logout { caller } => {
                let revoked = engine.revoke_session(caller);
                outcome.summary = format!("{caller} (session existed: {revoked})");
            }
            Step::Advance { by } => {
                clock.advance(*by);
                outcome.summary = humantime_label(*by);
            }
            Step::Maintenance => {
                let pruned = engine.maintenance();
                outcome.summary = format!(
                    "pruned {} rate entries, {} sessions, {} cache entries",
                    pruned.rate_entries_pruned, pruned.expired_sessions, pruned.stale_cache_entries
                );
            }
            Step::Call {
                method,
                caller,
                args,
                boundary,
                read_only,
                expect,
            } => {
                let mut call = CallContext::new(method.clone(), caller.clone(), args.clone())
                    .read_only(*read_only)
                    .with_arg_bytes(args.to_string().into_bytes());
                if *boundary {
                    call = call.boundary();
                }
                let verdict = engine.evaluate(&call);
                outcome.summary = format!("{method} by {caller}");
                outcome.accepted = Some(verdict.is_ok());
                outcome.reason = verdict.err();
                if outcome.accepted == Some(true) {
                    report.accepted += 1;
                } else {
                    report.rejected += 1;
                }
                outcome.expectation_met = match expect {
                    Some(Expectation::Accept) => outcome.accepted == Some(true),
                    Some(Expectation::Reject) => outcome.accepted == Some(false),
                    None => true,
                };
            }
        }
        if !outcome.expectation_met {
            report.mismatches += 1;
        }
        debug!(step = outcome.step, action = outcome.action, "scenario step replayed");
        report.outcomes.push(outcome);
    }
    Ok(report)
}

fn humantime_label(duration: Duration) -> String {
    format!("clock +{}", humantime::format_duration(duration))
}
