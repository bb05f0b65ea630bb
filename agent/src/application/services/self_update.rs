//! Self-update bootstrap for the agent's own component.
//!
//! The agent cannot restart itself mid-update, so its update spans two
//! process lifetimes joined by a durable marker:
//!
//! 1. Update needed: write the marker, swap the container, install the
//!    content package, enable the unit and request a restart.
//! 2. Marker present at startup: remove the marker, then run the secondary
//!    post-setup tasks without repeating the container swap.
//!
//! Each branch touches the marker before anything else, so a crash at any
//! point resumes the right branch on the next boot.

use anyhow::{Context, Result};
use hoist_common::Component;

use crate::application::ports::{ContainerRuntime, HostPorts};
use crate::application::services::decision::decide;
use crate::application::services::orchestrator::{
    ApplyReport, HookOutcome, HookRunner, HookTarget, PostSetupStep, apply, execute,
};
use crate::domain::{AgentConfig, UpdateError};

/// Hooks run when a new agent version is rolled out.
pub const DEPLOY_HOOKS: [PostSetupStep; 2] =
    [PostSetupStep::ExtractAndDeploy, PostSetupStep::EnableAndExit];

/// Hooks run by the new instance after the restart.
pub const POST_RESTART_HOOKS: [PostSetupStep; 1] = [PostSetupStep::SecondaryTasks];

pub struct SelfUpdater<'a, R, H> {
    runtime: &'a R,
    host: &'a H,
    config: &'a AgentConfig,
    /// Set when the marker existed at startup; consumed by the first pass
    /// that sees the agent component.
    post_op_pending: bool,
}

impl<'a, R: ContainerRuntime, H: HostPorts> SelfUpdater<'a, R, H> {
    pub fn new(runtime: &'a R, host: &'a H, config: &'a AgentConfig) -> Self {
        let post_op_pending = host.marker_exists();
        if post_op_pending {
            tracing::info!("self-update marker present; post-update tasks pending");
        }
        Self {
            runtime,
            host,
            config,
            post_op_pending,
        }
    }

    #[must_use]
    pub fn post_op_pending(&self) -> bool {
        self.post_op_pending
    }

    /// Runs the bootstrap for the agent component.
    ///
    /// A successful rollout returns a report with `restart_requested` set;
    /// the caller must stop processing and let the run loop exit.
    ///
    /// # Errors
    ///
    /// Orchestrator errors pass through. [`UpdateError::SelfUpdate`] is
    /// returned when the marker cannot be managed or the unit could not be
    /// enabled.
    pub async fn update(&mut self, component: &Component) -> Result<ApplyReport, UpdateError> {
        if std::mem::take(&mut self.post_op_pending) && self.host.marker_exists() {
            self.host
                .remove_marker()
                .map_err(|e| UpdateError::SelfUpdate(format!("clearing marker: {e:#}")))?;
            tracing::info!(component = %component.name, "completing self-update after restart");
            return apply(self.runtime, &*self, component, true, &POST_RESTART_HOOKS).await;
        }

        let decision = decide(self.runtime, component).await;
        if !decision.mutates() {
            tracing::debug!(component = %component.name, %decision, "agent is current");
            return Ok(ApplyReport::new(decision));
        }

        self.host
            .write_marker()
            .map_err(|e| UpdateError::SelfUpdate(format!("writing marker: {e:#}")))?;
        tracing::info!(component = %component.name, version = %component.version, "rolling out new agent version");

        let report = execute(self.runtime, &*self, component, decision, false, &DEPLOY_HOOKS).await?;
        if !report.restart_requested {
            return Err(UpdateError::SelfUpdate(format!(
                "agent unit was not enabled; restart skipped ({})",
                report.hook_failures.join("; ")
            )));
        }
        Ok(report)
    }
}

impl<R: ContainerRuntime, H: HostPorts> HookRunner for SelfUpdater<'_, R, H> {
    async fn run_hook(&self, step: PostSetupStep, target: HookTarget<'_>) -> Result<HookOutcome> {
        match step {
            PostSetupStep::ExtractAndDeploy => {
                let id = target
                    .container_id
                    .context("new agent container id is unknown")?;
                let archive = self
                    .runtime
                    .copy_from_container(id, &self.config.updater_in_container)
                    .await
                    .context("copying content package out of the agent container")?;
                self.host
                    .install_package(archive)
                    .await
                    .context("installing content package")?;
                tracing::info!(root = %self.config.updater_root.display(), "content package installed");
                Ok(HookOutcome::Continue)
            }
            PostSetupStep::EnableAndExit => {
                self.host.reload_units().await?;
                self.host.enable_unit(&self.config.updater_service).await?;
                tracing::info!(unit = %self.config.updater_service, "agent unit enabled");
                Ok(HookOutcome::RestartRequested)
            }
            PostSetupStep::SecondaryTasks => {
                self.host
                    .migrate()
                    .await
                    .context("running post-update database migration")?;
                Ok(HookOutcome::Continue)
            }
        }
    }
}
