use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Prints `payload` for machine formats; returns false for `Human` so the
    /// caller renders its own summary.
    pub fn emit<T: Serialize>(self, payload: &T) -> Result<bool> {
        match self {
            OutputFormat::Human => Ok(false),
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(payload)?);
                Ok(true)
            }
            OutputFormat::Yaml => {
                print!("{}", serde_yaml::to_string(payload)?);
                Ok(true)
            }
        }
    }
}
