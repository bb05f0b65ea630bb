//! Orchestrator: executes a decision against the container runtime.
//!
//! Order for `Create`/`Replace`: pull, find previous, remove previous
//! (best-effort), create and start (fatal), remove the stale image
//! (best-effort), then run post-setup hooks.

use std::fmt;

use anyhow::Result;
use hoist_common::Component;

use crate::application::ports::{ContainerRuntime, RegistryAuth};
use crate::application::services::decision::{decide, find_container};
use crate::domain::{Decision, UpdateError};

/// Post-setup steps that may follow a container change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostSetupStep {
    /// Copy the content package out of the new container and install it.
    ExtractAndDeploy,
    /// Reload and enable the supervisor unit, then ask for a restart.
    EnableAndExit,
    /// Secondary work after a restart, such as a database migration.
    SecondaryTasks,
}

impl fmt::Display for PostSetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ExtractAndDeploy => "extract-and-deploy",
            Self::EnableAndExit => "enable-and-exit",
            Self::SecondaryTasks => "secondary-tasks",
        };
        f.write_str(s)
    }
}

/// What a hook asks of the caller once it has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Continue,
    /// Stop processing and let the run loop end the process.
    RestartRequested,
}

/// The container a hook operates on.
#[derive(Debug, Clone, Copy)]
pub struct HookTarget<'a> {
    pub component: &'a Component,
    /// Id of the component's current container, when known.
    pub container_id: Option<&'a str>,
}

/// Executes post-setup steps.
#[allow(async_fn_in_trait)]
pub trait HookRunner {
    async fn run_hook(&self, step: PostSetupStep, target: HookTarget<'_>) -> Result<HookOutcome>;
}

/// Hook runner for components that have no post-setup steps.
pub struct NoHooks;

impl HookRunner for NoHooks {
    async fn run_hook(&self, step: PostSetupStep, _target: HookTarget<'_>) -> Result<HookOutcome> {
        anyhow::bail!("no handler for post-setup step {step}")
    }
}

/// Result of applying one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub decision: Decision,
    /// `step: error` for each hook that failed; hooks never abort.
    pub hook_failures: Vec<String>,
    pub restart_requested: bool,
}

impl ApplyReport {
    #[must_use]
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            hook_failures: Vec::new(),
            restart_requested: false,
        }
    }
}

/// Decides and applies `component`.
///
/// # Errors
///
/// Returns the component-fatal errors: deprecation removal, image fetch,
/// container start.
pub async fn apply(
    runtime: &impl ContainerRuntime,
    hook_runner: &impl HookRunner,
    component: &Component,
    post_only: bool,
    hooks: &[PostSetupStep],
) -> Result<ApplyReport, UpdateError> {
    let decision = decide(runtime, component).await;
    execute(runtime, hook_runner, component, decision, post_only, hooks).await
}

/// Applies an already-made decision.
///
/// `Skip` runs `hooks` only when `post_only` is set; `Deprecate` never runs
/// hooks.
///
/// # Errors
///
/// Same as [`apply`], minus deprecation.
pub async fn execute(
    runtime: &impl ContainerRuntime,
    hook_runner: &impl HookRunner,
    component: &Component,
    decision: Decision,
    post_only: bool,
    hooks: &[PostSetupStep],
) -> Result<ApplyReport, UpdateError> {
    let name = component.container_name.as_str();
    match decision {
        Decision::Deprecate => return Ok(ApplyReport::new(decision)),
        Decision::Skip => {
            tracing::debug!(component = %component.name, container = %name, "container up to date");
            let mut report = ApplyReport::new(decision);
            if post_only {
                let current = match find_container(runtime, name).await {
                    Ok(found) => found.map(|c| c.id),
                    Err(e) => {
                        tracing::warn!(container = %name, error = %format!("{e:#}"), "container lookup for post-setup failed");
                        None
                    }
                };
                let target = HookTarget {
                    component,
                    container_id: current.as_deref(),
                };
                run_hooks(hook_runner, hooks, target, &mut report).await;
            }
            return Ok(report);
        }
        Decision::Create | Decision::Replace => {}
    }

    let image = component.image_ref();
    let auth = if component.credential.is_empty() {
        None
    } else {
        let credential = hoist_common::decode_credential(&component.credential).map_err(|e| {
            UpdateError::image_fetch(&image, &anyhow::Error::new(e).context("decoding registry credential"))
        })?;
        Some(RegistryAuth {
            server: component.registry.trim_end_matches('/').to_string(),
            credential,
        })
    };

    tracing::info!(component = %component.name, image = %image, %decision, "pulling image");
    runtime
        .pull_image(&image, auth.as_ref())
        .await
        .map_err(|e| UpdateError::image_fetch(&image, &e))?;

    let previous = match find_container(runtime, name).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(container = %name, error = %format!("{e:#}"), "previous container lookup failed");
            None
        }
    };
    if let Some(prev) = &previous {
        if let Err(e) = runtime.remove_container(&prev.id, true).await {
            tracing::warn!(container = %name, id = %prev.id, error = %format!("{e:#}"), "failed to remove previous container");
        }
    }

    let id = runtime
        .create_and_start(&component.container_spec, &image, name)
        .await
        .map_err(|e| UpdateError::container_start(name, &e))?;
    tracing::info!(component = %component.name, container = %name, id = %id, image = %image, "container started");

    if let Some(prev) = &previous {
        if !prev.image.is_empty() && prev.image != image {
            if let Err(e) = runtime.remove_image(&prev.image, true).await {
                tracing::warn!(image = %prev.image, error = %format!("{e:#}"), "failed to remove stale image");
            }
        }
    }

    let mut report = ApplyReport::new(decision);
    let target = HookTarget {
        component,
        container_id: Some(&id),
    };
    run_hooks(hook_runner, hooks, target, &mut report).await;
    Ok(report)
}

async fn run_hooks(
    hook_runner: &impl HookRunner,
    hooks: &[PostSetupStep],
    target: HookTarget<'_>,
    report: &mut ApplyReport,
) {
    for &step in hooks {
        match hook_runner.run_hook(step, target).await {
            Ok(HookOutcome::Continue) => {}
            Ok(HookOutcome::RestartRequested) => {
                report.restart_requested = true;
                break;
            }
            Err(e) => {
                tracing::error!(component = %target.component.name, %step, error = %format!("{e:#}"), "post-setup step failed");
                report.hook_failures.push(format!("{step}: {e:#}"));
            }
        }
    }
}
