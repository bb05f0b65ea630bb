//! `hoistd once`: a single pass, then exit.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use crate::application::services::{PassReport, TriggerCoordinator, UpdateAgent};
use crate::domain::AgentConfig;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::docker::DockerCli;
use crate::infra::host::LocalHost;
use crate::infra::manifest_source::HttpManifestSource;

#[derive(Args, Debug, Default)]
pub struct OnceArgs {
    /// Apply this encoded (or plain JSON) manifest instead of fetching the
    /// asset manifest
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,
}

/// Applies one manifest and prints a per-component summary.
///
/// Exits 1 when any component failed or the agent's own rollout asked for
/// a restart.
///
/// # Errors
///
/// Returns an error when the manifest cannot be read, fetched or decoded.
pub async fn run(config: &AgentConfig, args: &OnceArgs) -> Result<ExitCode> {
    super::ensure_host(config)?;
    let asset = config
        .asset_manifest()
        .context("decoding HOIST_ASSET_MANIFEST")?;
    let sub = super::decoded_sub_manifest(config)?;

    let runner = TokioCommandRunner::new(config.command_timeout);
    let runtime = DockerCli::new(runner, config.pull_timeout);
    let host = LocalHost::new(config, runner);
    let source = HttpManifestSource::new(config.connect_timeout, config.command_timeout)?;
    let transport = super::connect_transport(config, sub.as_ref(), None).await?;

    let agent = UpdateAgent::new(&runtime, &transport, &host, config);
    let coordinator = TriggerCoordinator::new(agent, &transport, &source, asset, config.sched_duration);

    let report = match &args.manifest {
        Some(path) => {
            let payload = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            coordinator.push_pass(&payload).await?
        }
        None => coordinator.scheduled_pass().await?,
    };

    print_summary(&report);
    if report.restart_requested || !report.is_clean() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_summary(report: &PassReport) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(applied) => {
                println!("{} ({}): {}", outcome.component, outcome.container, applied.decision);
                for failure in &applied.hook_failures {
                    println!("  hook: {failure}");
                }
            }
            Err(e) => println!("{} ({}): failed: {e}", outcome.component, outcome.container),
        }
    }
    let failed = report.failures().count();
    println!(
        "{} components, {failed} failed{}",
        report.outcomes.len(),
        if report.restart_requested { ", restart requested" } else { "" }
    );
    if let Some(heartbeat) = report.heartbeat.as_ref().filter(|hb| hb.is_error()) {
        println!("inventory unavailable: {}", heartbeat.error);
    }
}
