use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use callguard_core_types::SystemClock;
use callguard_session::SessionManager;
use clap::Args;
use serde::Serialize;

use super::output::OutputFormat;
use super::runtime::load_policy;

#[derive(Args, Clone, Debug)]
pub struct RolesArgs {
    /// Only show this role
    #[arg(long)]
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
struct RoleReport {
    name: String,
    inherits: Vec<String>,
    roles: Vec<String>,
    permissions: Vec<String>,
}

pub async fn cmd_roles(args: RolesArgs, config: Option<&Path>, output: OutputFormat) -> Result<()> {
    let loaded = load_policy(config)?;
    let mut manager =
        SessionManager::with_settings(loaded.policy.engine.sessions.clone(), Arc::new(SystemClock));
    for role in &loaded.policy.engine.roles {
        manager.define_role(role.clone());
    }

    let reports: Vec<RoleReport> = manager
        .roles()
        .into_iter()
        .filter(|role| args.role.as_deref().map_or(true, |name| name == role.name))
        .map(|role| RoleReport {
            name: role.name.clone(),
            inherits: role.inherits.clone(),
            roles: manager
                .flatten_roles(&role.name, &mut HashSet::new())
                .into_iter()
                .collect(),
            permissions: manager
                .flatten_permissions(&role.name, &mut HashSet::new())
                .into_iter()
                .collect(),
        })
        .collect();

    if output.emit(&reports)? {
        return Ok(());
    }

    if reports.is_empty() {
        println!("No roles defined in {}", loaded.path.display());
        return Ok(());
    }
    for report in &reports {
        println!("{}", report.name);
        if !report.inherits.is_empty() {
            println!("  inherits:    {}", report.inherits.join(", "));
        }
        println!("  roles:       {}", report.roles.join(", "));
        if report.permissions.is_empty() {
            println!("  permissions: (none)");
        } else {
            println!("  permissions: {}", report.permissions.join(", "));
        }
    }
    Ok(())
}
