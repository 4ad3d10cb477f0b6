use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Args;
use tracing::info;

use super::output::OutputFormat;
use super::runtime::{load_policy, load_scenario};
use crate::scenario;

#[derive(Args, Clone, Debug)]
pub struct SimulateArgs {
    /// Scenario file (YAML or JSON)
    #[arg(short, long, value_name = "FILE")]
    pub scenario: PathBuf,

    /// Output JSON instead of one line per step
    #[arg(long)]
    pub json: bool,
}

pub async fn cmd_simulate(args: SimulateArgs, config: Option<&Path>, output: OutputFormat) -> Result<()> {
    let loaded = load_policy(config)?;
    let scenario = load_scenario(&args.scenario).await?;
    info!(
        policy = %loaded.path.display(),
        steps = scenario.steps.len(),
        "replaying scenario"
    );

    let report = scenario::run(&loaded.policy, &scenario)?;

    let format = if args.json { OutputFormat::Json } else { output };
    if !format.emit(&report)? {
        for outcome in &report.outcomes {
            println!("{outcome}");
        }
        println!(
            "{} accepted, {} rejected, {} unexpected",
            report.accepted, report.rejected, report.mismatches
        );
    }

    if report.mismatches > 0 {
        bail!("{} step(s) did not match their expectation", report.mismatches);
    }
    Ok(())
}
