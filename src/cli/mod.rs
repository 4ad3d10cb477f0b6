mod app;
mod check_config;
mod commands;
mod dispatch;
mod env;
mod output;
mod roles;
mod runtime;
mod simulate;

pub use app::run;
pub use env::CliArgs;
pub use output::OutputFormat;
