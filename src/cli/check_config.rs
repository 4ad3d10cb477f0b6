use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use callguard_core_types::SystemClock;
use callguard_engine::Phase;
use clap::Args;
use serde::Serialize;
use serde_json::json;

use super::output::OutputFormat;
use super::runtime::load_policy;
use crate::policy::build_engine;

#[derive(Args, Clone, Debug)]
pub struct CheckConfigArgs {
    /// Print the effective policy (after environment overrides) instead of a summary
    #[arg(long)]
    pub effective: bool,
}

#[derive(Debug, Serialize)]
struct MethodSummary {
    phase: Phase,
    method: String,
    read_only: bool,
    rules: Vec<String>,
}

pub async fn cmd_check_config(
    args: CheckConfigArgs,
    config: Option<&Path>,
    output: OutputFormat,
) -> Result<()> {
    let loaded = load_policy(config)?;
    if args.effective {
        let rendered = match output {
            OutputFormat::Json => serde_json::to_string_pretty(&loaded.policy)?,
            _ => serde_yaml::to_string(&loaded.policy)?,
        };
        println!("{rendered}");
        return Ok(());
    }

    let engine = build_engine(&loaded.policy, Arc::new(SystemClock))
        .with_context(|| format!("Invalid policy in {}", loaded.path.display()))?;

    let mut methods = Vec::new();
    for phase in [Phase::Inspect, Phase::Guard] {
        for name in engine.registered_methods(phase) {
            if let Some(handle) = engine.handle(phase, name) {
                methods.push(MethodSummary {
                    phase,
                    method: handle.method.clone(),
                    read_only: handle.is_read_only,
                    rules: handle.rules.iter().map(ToString::to_string).collect(),
                });
            }
        }
    }
    let limits = &loaded.policy.engine.rate_limits;

    let payload = json!({
        "path": loaded.path.display().to_string(),
        "methods": methods,
        "roles": loaded.policy.engine.roles.iter().map(|role| &role.name).collect::<Vec<_>>(),
        "unknown_method": loaded.policy.engine.unknown_method,
        "global_rate_limit": limits.global,
        "method_rate_limits": limits.methods,
    });
    if output.emit(&payload)? {
        return Ok(());
    }

    println!("Policy: {}", loaded.path.display());
    println!("- Methods: {}", methods.len());
    for method in &methods {
        let access = if method.read_only { "read-only" } else { "update" };
        println!(
            "  [{}] {} ({}): {}",
            method.phase,
            method.method,
            access,
            method.rules.join(", ")
        );
    }
    println!("- Roles: {}", loaded.policy.engine.roles.len());
    match &limits.global {
        Some(global) => println!(
            "- Global rate limit: {} per {}",
            global.max_requests, global.window
        ),
        None => println!("- Global rate limit: none"),
    }
    for (method, limit) in &limits.methods {
        println!("- Rate limit {}: {} per {}", method, limit.max_requests, limit.window);
    }
    Ok(())
}
