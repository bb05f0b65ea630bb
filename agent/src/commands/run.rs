//! `hoistd run`: the long-running agent.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use crate::application::services::{TriggerCoordinator, UpdateAgent};
use crate::domain::{AgentConfig, WorkMode};
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::docker::DockerCli;
use crate::infra::host::LocalHost;
use crate::infra::manifest_source::HttpManifestSource;

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Trigger mode; overrides HOIST_WORK_MODE
    #[arg(long, value_enum)]
    pub mode: Option<WorkMode>,
}

/// Runs until a pass requests a restart (exit 1, so the supervisor starts
/// the new agent) or a shutdown signal arrives (exit 0).
///
/// # Errors
///
/// Returns an error for invalid configuration, or in `sub` mode when the
/// push transport cannot be connected or its subscription ends.
pub async fn run(config: &AgentConfig, args: &RunArgs) -> Result<ExitCode> {
    let mode = args.mode.unwrap_or(config.work_mode);
    super::ensure_host(config)?;
    config.validate_for(mode)?;
    let asset = config
        .asset_manifest()
        .context("decoding HOIST_ASSET_MANIFEST")?;
    let sub = super::decoded_sub_manifest(config)?;

    tracing::info!(
        version = %config.version_details,
        ?mode,
        interval_secs = config.sched_duration.as_secs(),
        asset = asset.is_some(),
        push = sub.is_some(),
        "hoistd starting"
    );

    let runner = TokioCommandRunner::new(config.command_timeout);
    let runtime = DockerCli::new(runner, config.pull_timeout);
    let host = LocalHost::new(config, runner);
    let source = HttpManifestSource::new(config.connect_timeout, config.command_timeout)?;
    let transport = super::connect_transport(config, sub.as_ref(), Some(mode)).await?;

    let agent = UpdateAgent::new(&runtime, &transport, &host, config);
    let coordinator = TriggerCoordinator::new(agent, &transport, &source, asset, config.sched_duration);

    tokio::select! {
        result = coordinator.run(mode) => {
            result?;
            tracing::info!("exiting so the supervisor starts the updated agent");
            Ok(ExitCode::FAILURE)
        }
        () = shutdown_signal() => {
            tracing::info!("shutdown signal received");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
