//! Update decision engine: observes the runtime and applies the domain
//! rules.
//!
//! Deprecation is handled here: the container is removed as part of the
//! decision, so applying a `Deprecate` decision has nothing left to do.

use anyhow::Result;
use hoist_common::{Component, ContainerSummary, UpdateOp};

use crate::application::ports::ContainerRuntime;
use crate::domain::{Decision, evaluate};

/// Finds the container holding exactly `name`.
///
/// # Errors
///
/// Propagates the runtime's listing error.
pub async fn find_container(
    runtime: &impl ContainerRuntime,
    name: &str,
) -> Result<Option<ContainerSummary>> {
    let containers = runtime.list_containers(Some(name)).await?;
    Ok(containers.into_iter().find(|c| c.has_name(name)))
}

/// Decides what to do with `component`.
///
/// A failed container lookup is treated as "absent" so the component is
/// (re)created rather than silently skipped. Removing a deprecated
/// container is cleanup: a failure is logged and the decision stands.
pub async fn decide(runtime: &impl ContainerRuntime, component: &Component) -> Decision {
    let name = component.container_name.as_str();
    let lookup = find_container(runtime, name).await;

    if component.operation == UpdateOp::Deprecate && !component.force {
        match lookup {
            Ok(Some(container)) => match runtime.remove_container(&container.id, true).await {
                Ok(()) => {
                    tracing::info!(container = %name, id = %container.id, "deprecated container removed");
                }
                Err(e) => {
                    tracing::warn!(container = %name, id = %container.id, error = %format!("{e:#}"), "failed to remove deprecated container");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(container = %name, error = %format!("{e:#}"), "deprecated container lookup failed");
            }
        }
        return Decision::Deprecate;
    }

    match lookup {
        Ok(existing) => evaluate(component, existing.as_ref()),
        Err(e) => {
            tracing::warn!(container = %name, error = %format!("{e:#}"), "container lookup failed; treating as absent");
            Decision::Create
        }
    }
}
