use super::check_config::cmd_check_config;
use super::env::CliArgs;
use super::roles::cmd_roles;
use super::simulate::cmd_simulate;
use crate::cli::commands::Commands;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs) -> Result<()> {
    let config = cli.config.as_deref();
    match cli.command.clone() {
        Commands::CheckConfig(args) => cmd_check_config(args, config, cli.output).await,
        Commands::Roles(args) => cmd_roles(args, config, cli.output).await,
        Commands::Simulate(args) => cmd_simulate(args, config, cli.output).await,
    }
}
