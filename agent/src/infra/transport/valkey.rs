//! Valkey/Redis pub/sub binding.

use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{Stream, StreamExt};
use hoist_common::{Channel, SubManifest};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use url::Url;

use super::address;

pub struct ValkeyTransport {
    client: redis::Client,
    conn: MultiplexedConnection,
    sub: SubManifest,
    timeout: Duration,
}

impl ValkeyTransport {
    /// Opens a multiplexed connection for publishing. Subscriptions get
    /// their own connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is invalid or the server is not reachable
    /// within `timeout`.
    pub async fn connect(sub: &SubManifest, timeout: Duration) -> Result<Self> {
        let url = connection_url(sub)?;
        let client = redis::Client::open(url.as_str()).context("failed to create Valkey client")?;
        let conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .with_context(|| format!("Valkey connect timed out after {}s", timeout.as_secs()))?
            .context("failed to connect to Valkey")?;
        tracing::info!(host = url.host_str().unwrap_or_default(), "connected to Valkey");
        Ok(Self {
            client,
            conn,
            sub: sub.clone(),
            timeout,
        })
    }

    pub(super) async fn publish(&self, channel: Channel, payload: &[u8]) -> Result<()> {
        let target = address(&self.sub, channel);
        let mut conn = self.conn.clone();
        let _: () = conn
            .publish(&target, payload)
            .await
            .with_context(|| format!("failed to PUBLISH to {target}"))?;
        Ok(())
    }

    pub(super) async fn subscribe(&self, channel: Channel) -> Result<ValkeySubscription> {
        let target = address(&self.sub, channel);
        let mut pubsub = tokio::time::timeout(self.timeout, self.client.get_async_pubsub())
            .await
            .context("Valkey pub/sub connect timed out")?
            .context("failed to open Valkey pub/sub connection")?;
        pubsub
            .subscribe(&target)
            .await
            .with_context(|| format!("failed to SUBSCRIBE to {target}"))?;
        tracing::debug!(channel = %target, "subscribed");
        Ok(ValkeySubscription {
            messages: Box::pin(pubsub.into_on_message()),
        })
    }
}

pub struct ValkeySubscription {
    messages: Pin<Box<dyn Stream<Item = redis::Msg> + Send>>,
}

impl ValkeySubscription {
    pub(super) async fn next_message(&mut self) -> Option<Vec<u8>> {
        let msg = self.messages.next().await?;
        Some(msg.get_payload_bytes().to_vec())
    }
}

/// The sub manifest URI with its credential folded in as URL userinfo.
fn connection_url(sub: &SubManifest) -> Result<Url> {
    let mut url = Url::parse(&sub.uri).context("invalid Valkey URL in sub manifest")?;
    let cred = &sub.credential;
    if !cred.user.is_empty() {
        url.set_username(&cred.user)
            .map_err(|()| anyhow::anyhow!("cannot set username on {}", sub.uri))?;
    }
    if !cred.pass.is_empty() {
        url.set_password(Some(&cred.pass))
            .map_err(|()| anyhow::anyhow!("cannot set password on {}", sub.uri))?;
    }
    Ok(url)
}
