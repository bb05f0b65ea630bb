//! One pass: apply every component of a manifest, in order, then report.

use hoist_common::{Heartbeat, UpdateManifest};

use crate::application::ports::{ContainerRuntime, HostPorts, Transport};
use crate::application::services::orchestrator::{ApplyReport, NoHooks, apply};
use crate::application::services::reporting::Reporter;
use crate::application::services::self_update::SelfUpdater;
use crate::domain::{AgentConfig, UpdateError};

/// Result for a single component.
#[derive(Debug, Clone)]
pub struct ComponentOutcome {
    pub component: String,
    pub container: String,
    pub result: Result<ApplyReport, UpdateError>,
}

impl ComponentOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// One entry per processed component, in manifest order.
    pub outcomes: Vec<ComponentOutcome>,
    /// Set when the agent's own rollout asked for a restart; components
    /// after it were not processed.
    pub restart_requested: bool,
    pub heartbeat: Option<Heartbeat>,
}

impl PassReport {
    pub fn failures(&self) -> impl Iterator<Item = &ComponentOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Owns everything a pass needs. Callers serialise passes by holding the
/// agent behind a single lock.
pub struct UpdateAgent<'a, R, T, H> {
    runtime: &'a R,
    reporter: Reporter<'a, R, T>,
    self_updater: SelfUpdater<'a, R, H>,
}

impl<'a, R, T, H> UpdateAgent<'a, R, T, H>
where
    R: ContainerRuntime,
    T: Transport,
    H: HostPorts,
{
    pub fn new(runtime: &'a R, transport: &'a T, host: &'a H, config: &'a AgentConfig) -> Self {
        Self {
            runtime,
            reporter: Reporter::new(runtime, transport, config.version_details.clone()),
            self_updater: SelfUpdater::new(runtime, host, config),
        }
    }

    pub fn reporter(&self) -> &Reporter<'a, R, T> {
        &self.reporter
    }

    /// Applies `manifest` component by component.
    ///
    /// A failed component is reported with an `Error` event and does not
    /// stop the pass. Exactly one heartbeat is published at the end, also
    /// when the agent's own rollout cuts the pass short.
    pub async fn setup_components(&mut self, manifest: &UpdateManifest) -> PassReport {
        for name in manifest.duplicate_container_names() {
            tracing::warn!(container = %name, "container name used by more than one component; components are applied in order");
        }

        let mut report = PassReport::default();
        for component in &manifest.components {
            let result = if component.is_agent() {
                self.self_updater.update(component).await
            } else {
                apply(self.runtime, &NoHooks, component, false, &[]).await
            };

            match &result {
                Ok(applied) if applied.decision.mutates() => {
                    self.reporter
                        .component_updated(&component.name, &component.image_ref())
                        .await;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(component = %component.name, error = %e, "component update failed");
                    self.reporter
                        .component_error(&component.name, &e.to_string())
                        .await;
                }
            }

            let restart = matches!(&result, Ok(applied) if applied.restart_requested);
            report.outcomes.push(ComponentOutcome {
                component: component.name.clone(),
                container: component.container_name.clone(),
                result,
            });
            if restart {
                report.restart_requested = true;
                tracing::info!("restart requested; remaining components are left to the next instance");
                break;
            }
        }

        report.heartbeat = Some(self.reporter.heartbeat().await);
        report
    }
}
