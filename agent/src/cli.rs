//! CLI argument parsing with clap derive

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{self, LogFormat};
use crate::commands;

/// Keeps this host's containers in sync with an update manifest
#[derive(Parser)]
#[command(
    name = "hoistd",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Log line format
    #[arg(long, global = true, value_enum, env = "HOIST_LOG_FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the agent until a restart is requested or a signal arrives
    Run(commands::run::RunArgs),

    /// Apply one manifest and exit
    Once(commands::once::OnceArgs),

    /// Show version
    Version {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or the command
    /// fails.
    pub async fn run(self) -> Result<ExitCode> {
        let Cli { log_format, command } = self;
        let config = app::load_config()?;
        match command {
            Command::Version { json } => {
                commands::version::run(&config.version_details, json);
                Ok(ExitCode::SUCCESS)
            }
            Command::Run(args) => {
                app::init_tracing(log_format);
                commands::run::run(&config, &args).await
            }
            Command::Once(args) => {
                app::init_tracing(log_format);
                commands::once::run(&config, &args).await
            }
        }
    }
}
