//! Trigger coordinator: drives passes from a timer and a push
//! subscription, strictly one at a time.
//!
//! The agent lives behind a FIFO `tokio::sync::Mutex`; each trigger fetches
//! or decodes its manifest first and only then waits for the lock, so a
//! slow fetch never blocks the other trigger. Both triggers run as futures
//! of one task, so a restart request from either ends the other without
//! cancelling a pass in flight (only the lock holder can be mid-pass).

use std::time::Duration;

use anyhow::{Context, Result};
use hoist_common::{AssetManifest, Channel, UpdateManifest};
use tokio::sync::Mutex;

use crate::application::ports::{
    ContainerRuntime, HostPorts, ManifestSource, Subscription, Transport,
};
use crate::application::services::pass::{PassReport, UpdateAgent};
use crate::application::services::reporting::Reporter;
use crate::domain::{UpdateError, WorkMode};

/// Returned when a pass asked the process to end so the supervisor can
/// start the new agent version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartRequested;

pub struct TriggerCoordinator<'a, R, T, H, S> {
    agent: Mutex<UpdateAgent<'a, R, T, H>>,
    /// Publishes outside the agent lock.
    reporter: Reporter<'a, R, T>,
    transport: &'a T,
    source: &'a S,
    asset: Option<AssetManifest>,
    interval: Duration,
}

impl<'a, R, T, H, S> TriggerCoordinator<'a, R, T, H, S>
where
    R: ContainerRuntime,
    T: Transport,
    H: HostPorts,
    S: ManifestSource,
{
    pub fn new(
        agent: UpdateAgent<'a, R, T, H>,
        transport: &'a T,
        source: &'a S,
        asset: Option<AssetManifest>,
        interval: Duration,
    ) -> Self {
        Self {
            reporter: agent.reporter().clone(),
            agent: Mutex::new(agent),
            transport,
            source,
            asset,
            interval,
        }
    }

    /// Fetches the asset manifest and applies it.
    ///
    /// # Errors
    ///
    /// Fails before any component is touched when no asset manifest is
    /// configured or the fetch/decode fails.
    pub async fn scheduled_pass(&self) -> Result<PassReport> {
        let asset = self.asset.as_ref().ok_or_else(|| {
            UpdateError::Configuration("no asset manifest configured (HOIST_ASSET_MANIFEST)".into())
        })?;
        let manifest = self
            .source
            .fetch(&asset.url)
            .await
            .with_context(|| format!("fetching update manifest from {}", asset.url))?;
        Ok(self.apply(&manifest).await)
    }

    /// Decodes a pushed payload and applies it.
    ///
    /// # Errors
    ///
    /// Returns the codec error for an undecodable payload.
    pub async fn push_pass(&self, payload: &[u8]) -> Result<PassReport> {
        let manifest: UpdateManifest =
            hoist_common::decode_payload(payload).context("decoding pushed update manifest")?;
        Ok(self.apply(&manifest).await)
    }

    async fn apply(&self, manifest: &UpdateManifest) -> PassReport {
        let mut agent = self.agent.lock().await;
        let report = agent.setup_components(manifest).await;
        drop(agent);
        tracing::info!(
            components = report.outcomes.len(),
            failed = report.failures().count(),
            restart = report.restart_requested,
            "pass complete"
        );
        report
    }

    /// Runs a pass now, then again `interval` after each pass completes.
    pub async fn run_scheduled(&self) -> RestartRequested {
        loop {
            match self.scheduled_pass().await {
                Ok(report) if report.restart_requested => return RestartRequested,
                Ok(_) => {}
                Err(e) => tracing::error!(error = %format!("{e:#}"), "scheduled pass failed"),
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Subscribes to the update channel and applies each inbound manifest.
    ///
    /// # Errors
    ///
    /// Fails when the subscription cannot be armed or ends.
    pub async fn run_push(&self) -> Result<RestartRequested> {
        let mut subscription = self
            .transport
            .subscribe(Channel::UpdateManifest)
            .await
            .context("subscribing to the update channel")?;
        tracing::info!("push subscription armed");
        self.reporter.started().await;

        while let Some(payload) = subscription.next_message().await {
            match self.push_pass(&payload).await {
                Ok(report) if report.restart_requested => return Ok(RestartRequested),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %format!("{e:#}"), "pushed manifest rejected"),
            }
        }
        anyhow::bail!("update channel subscription ended")
    }

    /// Runs the triggers selected by `mode` until a restart is requested.
    ///
    /// In `dual` mode a failed subscription is logged and polling carries
    /// on alone.
    ///
    /// # Errors
    ///
    /// In `sub` mode, returns the subscription failure.
    pub async fn run(&self, mode: WorkMode) -> Result<RestartRequested> {
        match mode {
            WorkMode::Sched => Ok(self.run_scheduled().await),
            WorkMode::Sub => self.run_push().await,
            WorkMode::Dual => {
                let push = async {
                    match self.run_push().await {
                        Ok(restart) => restart,
                        Err(e) => {
                            tracing::warn!(error = %format!("{e:#}"), "push trigger stopped; continuing with scheduled passes");
                            std::future::pending().await
                        }
                    }
                };
                tokio::select! {
                    biased;
                    restart = push => Ok(restart),
                    restart = self.run_scheduled() => Ok(restart),
                }
            }
        }
    }
}
