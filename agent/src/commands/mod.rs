//! Command handlers. Each wires infra adapters into application services.

pub mod once;
pub mod run;
pub mod version;

use anyhow::{Context, Result};
use hoist_common::SubManifest;

use crate::domain::{AgentConfig, UpdateError, WorkMode};
use crate::infra::host::running_in_container;
use crate::infra::transport::BusTransport;

/// Refuses to manage the host from inside a container unless allowed.
fn ensure_host(config: &AgentConfig) -> Result<()> {
    if running_in_container() && !config.allow_containerized {
        return Err(UpdateError::Configuration(
            "hoistd appears to run inside a container; set HOIST_ALLOW_CONTAINERIZED=true to override"
                .into(),
        )
        .into());
    }
    Ok(())
}

/// Connects the push transport. Only `sub` mode treats a failure as fatal;
/// every other caller degrades to the offline transport.
async fn connect_transport(
    config: &AgentConfig,
    sub: Option<&SubManifest>,
    mode: Option<WorkMode>,
) -> Result<BusTransport> {
    match BusTransport::connect(sub, config.connect_timeout).await {
        Ok(transport) => {
            if transport.is_offline() {
                tracing::info!("no sub manifest; running without a push transport");
            }
            Ok(transport)
        }
        Err(e) if mode == Some(WorkMode::Sub) => Err(e.context("connecting push transport")),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "push transport unavailable; heartbeats and events are dropped");
            Ok(BusTransport::Offline)
        }
    }
}

fn decoded_sub_manifest(config: &AgentConfig) -> Result<Option<SubManifest>> {
    config.sub_manifest().context("decoding HOIST_SUB_MANIFEST")
}
