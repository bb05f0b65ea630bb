//! MQTT binding.
//!
//! One background task drives the rumqttc event loop and routes inbound
//! publishes to subscriptions by topic. After a reconnect every routed
//! topic is subscribed again.
//!
//! Publishes are QoS 1 and `publish` returns once the broker's PUBACK has
//! been seen. rumqttc reports each outgoing PUBLISH with its packet id in
//! request order, which is how a waiting caller is matched to its ack.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use hoist_common::{Channel, SubManifest};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

use super::address;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 64;

type Routes = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Vec<u8>>>>>;

/// Callers waiting for a PUBACK.
#[derive(Default)]
struct Acks {
    /// Requested but not yet written, in request order.
    queued: VecDeque<oneshot::Sender<()>>,
    /// Written, keyed by packet id.
    inflight: HashMap<u16, oneshot::Sender<()>>,
}

type PendingAcks = Arc<Mutex<Acks>>;

pub struct MqttTransport {
    client: AsyncClient,
    routes: Routes,
    acks: PendingAcks,
    /// Keeps request order equal to `acks.queued` order.
    publish_order: tokio::sync::Mutex<()>,
    sub: SubManifest,
    ack_timeout: Duration,
    driver: JoinHandle<()>,
}

impl MqttTransport {
    /// Connects and waits for the broker's CONNACK.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is invalid, the broker refuses the
    /// session, or no CONNACK arrives within `timeout`.
    pub async fn connect(sub: &SubManifest, timeout: Duration) -> Result<Self> {
        let options = options(sub)?;
        let broker = format!("{}:{}", options.broker_address().0, options.broker_address().1);
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        tokio::time::timeout(timeout, wait_for_connack(&mut eventloop))
            .await
            .with_context(|| format!("MQTT connect to {broker} timed out after {}s", timeout.as_secs()))?
            .with_context(|| format!("failed to connect to MQTT broker {broker}"))?;
        tracing::info!(%broker, "connected to MQTT broker");

        let routes = Routes::default();
        let acks = PendingAcks::default();
        let driver = tokio::spawn(drive(
            eventloop,
            client.clone(),
            Arc::clone(&routes),
            Arc::clone(&acks),
        ));
        Ok(Self {
            client,
            routes,
            acks,
            publish_order: tokio::sync::Mutex::new(()),
            sub: sub.clone(),
            ack_timeout: timeout,
            driver,
        })
    }

    /// Publishes at QoS 1 and waits for the broker to acknowledge.
    pub(super) async fn publish(&self, channel: Channel, payload: &[u8]) -> Result<()> {
        let topic = address(&self.sub, channel);
        let (ack_tx, ack_rx) = oneshot::channel();
        {
            let _order = self.publish_order.lock().await;
            lock(&self.acks).queued.push_back(ack_tx);
            if let Err(e) = self
                .client
                .publish(&topic, QoS::AtLeastOnce, false, payload.to_vec())
                .await
            {
                lock(&self.acks).queued.pop_back();
                return Err(e).with_context(|| format!("failed to publish to {topic}"));
            }
        }
        match tokio::time::timeout(self.ack_timeout, ack_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => anyhow::bail!("MQTT connection closed before {topic} was acknowledged"),
            Err(_) => anyhow::bail!(
                "no PUBACK for {topic} within {}s",
                self.ack_timeout.as_secs()
            ),
        }
    }

    pub(super) async fn subscribe(&self, channel: Channel) -> Result<MqttSubscription> {
        let topic = address(&self.sub, channel);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.routes).insert(topic.clone(), tx);
        self.client
            .subscribe(&topic, QoS::AtLeastOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
        tracing::debug!(%topic, "subscribed");
        Ok(MqttSubscription { rx })
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

pub struct MqttSubscription {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MqttSubscription {
    pub(super) async fn next_message(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn drive(mut eventloop: EventLoop, client: AsyncClient, routes: Routes, acks: PendingAcks) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let mut routes = lock(&routes);
                match routes.get(&publish.topic) {
                    Some(tx) => {
                        if tx.send(publish.payload.to_vec()).is_err() {
                            routes.remove(&publish.topic);
                        }
                    }
                    None => tracing::debug!(topic = %publish.topic, "message on unrouted topic"),
                }
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                let mut acks = lock(&acks);
                // A retransmission reuses the id of a packet already in flight.
                if !acks.inflight.contains_key(&pkid) {
                    if let Some(waiter) = acks.queued.pop_front() {
                        acks.inflight.insert(pkid, waiter);
                    }
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                if let Some(waiter) = lock(&acks).inflight.remove(&ack.pkid) {
                    let _ = waiter.send(());
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                let topics: Vec<String> = lock(&routes).keys().cloned().collect();
                tracing::info!(topics = topics.len(), "MQTT session re-established; resubscribing");
                for topic in topics {
                    if let Err(e) = client.try_subscribe(&topic, QoS::AtLeastOnce) {
                        tracing::warn!(%topic, error = %e, "resubscribe failed");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "MQTT connection lost; retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

fn options(sub: &SubManifest) -> Result<MqttOptions> {
    let url = Url::parse(&sub.uri).context("invalid MQTT URL in sub manifest")?;
    let tls = url.scheme() == "mqtts";
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .with_context(|| format!("MQTT URL '{}' has no host", sub.uri))?;
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    let mut options = MqttOptions::new(format!("hoist-{}", std::process::id()), host, port);
    options.set_keep_alive(KEEP_ALIVE);
    if !sub.credential.is_empty() {
        options.set_credentials(&sub.credential.user, &sub.credential.pass);
    }
    if tls {
        options.set_transport(rumqttc::Transport::tls_with_default_config());
    }
    Ok(options)
}
