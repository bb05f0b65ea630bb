//! Process-wide setup: configuration loading and tracing.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::domain::AgentConfig;

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Loads [`AgentConfig`] from `HOIST_*` environment variables.
///
/// # Errors
///
/// Returns an error if a variable is present but malformed.
pub fn load_config() -> Result<AgentConfig> {
    envy::prefixed("HOIST_")
        .from_env()
        .context("failed to load config from HOIST_* env vars")
}

/// Installs the global subscriber. `RUST_LOG` overrides the `info` default.
/// Logs go to stderr; stdout is left to command output.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
