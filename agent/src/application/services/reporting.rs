//! Reporting: heartbeats and lifecycle events.
//!
//! Publishing is best-effort: a failed publish is logged and never fails
//! the pass that triggered it.

use hoist_common::{Channel, Event, EventType, Heartbeat};
use serde::Serialize;

use crate::application::ports::{ContainerRuntime, Transport};

/// Builds a heartbeat from the runtime inventory.
///
/// Stops at the first failed inventory call, recording it in `error`.
pub async fn build_heartbeat(runtime: &impl ContainerRuntime, version: &str) -> Heartbeat {
    let mut heartbeat = Heartbeat::new(version);
    match runtime.list_containers(None).await {
        Ok(containers) => heartbeat.containers = containers,
        Err(e) => {
            heartbeat.error = format!("listing containers: {e:#}");
            return heartbeat;
        }
    }
    match runtime.list_images().await {
        Ok(images) => heartbeat.images = images,
        Err(e) => heartbeat.error = format!("listing images: {e:#}"),
    }
    heartbeat
}

pub struct Reporter<'a, R, T> {
    runtime: &'a R,
    transport: &'a T,
    version: String,
}

impl<R, T> Clone for Reporter<'_, R, T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime,
            transport: self.transport,
            version: self.version.clone(),
        }
    }
}

impl<'a, R: ContainerRuntime, T: Transport> Reporter<'a, R, T> {
    pub fn new(runtime: &'a R, transport: &'a T, version: impl Into<String>) -> Self {
        Self {
            runtime,
            transport,
            version: version.into(),
        }
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Builds and publishes one heartbeat.
    pub async fn heartbeat(&self) -> Heartbeat {
        let heartbeat = build_heartbeat(self.runtime, &self.version).await;
        if heartbeat.is_error() {
            tracing::warn!(error = %heartbeat.error, "heartbeat inventory incomplete");
        }
        self.publish(Channel::Heartbeat, &heartbeat).await;
        heartbeat
    }

    /// Reports a failed component.
    pub async fn component_error(&self, component: &str, message: &str) {
        let mut event = Event::new(EventType::Error, &self.version, message);
        event.component = component.to_string();
        self.publish(Channel::Event, &event).await;
    }

    /// Reports a component whose container was (re)started.
    pub async fn component_updated(&self, component: &str, image: &str) {
        let mut event = Event::new(EventType::Updated, &self.version, image);
        event.component = component.to_string();
        self.publish(Channel::Event, &event).await;
    }

    /// Reports that the push subscription is armed.
    pub async fn started(&self) {
        let event = Event::new(EventType::Started, &self.version, "");
        self.publish(Channel::Event, &event).await;
    }

    async fn publish(&self, channel: Channel, payload: &impl Serialize) {
        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(%channel, error = %e, "failed to serialise report");
                return;
            }
        };
        if let Err(e) = self.transport.publish(channel, &bytes).await {
            tracing::warn!(%channel, error = %format!("{e:#}"), "failed to publish report");
        }
    }
}
