//! Push transport bindings.
//!
//! `BusTransport` picks a binding from the `SubManifest` URI scheme:
//! Valkey/Redis pub/sub or MQTT. Without a `SubManifest` it is `Offline`:
//! publishes are dropped and subscribing fails.

mod mqtt;
mod valkey;

use std::time::Duration;

use anyhow::Result;
use hoist_common::{Channel, SubManifest};

use crate::application::ports::{Subscription, Transport};
use crate::domain::UpdateError;

pub use self::mqtt::{MqttSubscription, MqttTransport};
pub use self::valkey::{ValkeySubscription, ValkeyTransport};

pub enum BusTransport {
    Valkey(ValkeyTransport),
    Mqtt(MqttTransport),
    Offline,
}

impl BusTransport {
    /// Connects the binding named by `sub.uri`, or returns `Offline` when
    /// no sub manifest is configured.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Configuration`] for an unknown scheme, or the
    /// connect failure (including the connect timeout elapsing).
    pub async fn connect(sub: Option<&SubManifest>, timeout: Duration) -> Result<Self> {
        let Some(sub) = sub else {
            return Ok(Self::Offline);
        };
        let scheme = sub.uri.split_once("://").map_or("", |(scheme, _)| scheme);
        match scheme {
            "redis" | "rediss" => Ok(Self::Valkey(ValkeyTransport::connect(sub, timeout).await?)),
            "mqtt" | "mqtts" | "tcp" => Ok(Self::Mqtt(MqttTransport::connect(sub, timeout).await?)),
            other => Err(UpdateError::Configuration(format!(
                "unsupported transport scheme '{other}' in sub manifest"
            ))
            .into()),
        }
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline)
    }
}

/// Broker address for `channel`; the channel's own name when unmapped.
fn address(sub: &SubManifest, channel: Channel) -> String {
    sub.channel(channel).unwrap_or(channel.key()).to_string()
}

pub enum BusSubscription {
    Valkey(ValkeySubscription),
    Mqtt(MqttSubscription),
}

impl Subscription for BusSubscription {
    async fn next_message(&mut self) -> Option<Vec<u8>> {
        match self {
            Self::Valkey(sub) => sub.next_message().await,
            Self::Mqtt(sub) => sub.next_message().await,
        }
    }
}

impl Transport for BusTransport {
    type Subscription = BusSubscription;

    async fn publish(&self, channel: Channel, payload: &[u8]) -> Result<()> {
        match self {
            Self::Valkey(bus) => bus.publish(channel, payload).await,
            Self::Mqtt(bus) => bus.publish(channel, payload).await,
            Self::Offline => {
                tracing::debug!(%channel, bytes = payload.len(), "offline transport; publish dropped");
                Ok(())
            }
        }
    }

    async fn subscribe(&self, channel: Channel) -> Result<BusSubscription> {
        match self {
            Self::Valkey(bus) => Ok(BusSubscription::Valkey(bus.subscribe(channel).await?)),
            Self::Mqtt(bus) => Ok(BusSubscription::Mqtt(bus.subscribe(channel).await?)),
            Self::Offline => anyhow::bail!("no push transport configured (HOIST_SUB_MANIFEST)"),
        }
    }
}
