use clap::Subcommand;

use super::check_config::CheckConfigArgs;
use super::roles::RolesArgs;
use super::simulate::SimulateArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Load a policy file and summarize its methods, roles and limits
    CheckConfig(CheckConfigArgs),

    /// Print every role with its flattened permissions
    Roles(RolesArgs),

    /// Replay a scenario of sessions, clock advances and calls
    Simulate(SimulateArgs),
}
