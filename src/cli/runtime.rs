use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use callguard_engine::{load_document, LoadOptions};
use tokio::fs;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::policy::PolicyFile;
use crate::scenario::Scenario;

const DEFAULT_POLICY: &str = "callguard.yaml";

pub fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

pub struct LoadedPolicy {
    pub policy: PolicyFile,
    pub path: PathBuf,
}

/// Reads the policy at `config_path` (or `./callguard.yaml`) with
/// `CALLGUARD__*` environment overrides applied.
pub fn load_policy(config_path: Option<&Path>) -> Result<LoadedPolicy> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_POLICY));

    let policy: PolicyFile = load_document(&LoadOptions::with_path(&path))
        .with_context(|| format!("Failed to load policy file {}", path.display()))?;

    info!("Loaded policy from: {}", path.display());
    Ok(LoadedPolicy { policy, path })
}

pub async fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    serde_yaml::from_str(&content).context("Failed to parse scenario file")
}
