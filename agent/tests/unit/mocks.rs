//! Shared in-memory port doubles for the service tests.
//!
//! The runtime and the host can share one journal so tests can assert the
//! relative order of container and host operations.

#![allow(clippy::expect_used, dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use hoist_agent::application::ports::{
    ContainerRuntime, DatabaseMigrator, ManifestSource, MarkerStore, PackageInstaller,
    ProcessSupervisor, RegistryAuth, Subscription, Transport,
};
use hoist_agent::domain::AgentConfig;
use hoist_common::{
    Channel, Component, ContainerSpec, ContainerState, ContainerSummary, Event,
    Heartbeat, ImageSummary, UpdateManifest, UpdateOp,
};
use tokio::sync::mpsc;

pub type Journal = Arc<Mutex<Vec<String>>>;

fn note(journal: &Journal, entry: impl Into<String>) {
    journal.lock().expect("journal").push(entry.into());
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

pub fn component(name: &str, image: &str) -> Component {
    let mut c = Component {
        version: "1.0.0".into(),
        name: name.into(),
        container_name: name.into(),
        ..Component::default()
    };
    c.container_spec.config.image = image.into();
    c
}

pub fn deprecated(name: &str) -> Component {
    Component {
        operation: UpdateOp::Deprecate,
        ..component(name, "")
    }
}

pub fn agent_component(image: &str) -> Component {
    component(hoist_common::AGENT_COMPONENT, image)
}

pub fn manifest(components: Vec<Component>) -> UpdateManifest {
    UpdateManifest {
        components,
        ..UpdateManifest::default()
    }
}

pub fn config() -> AgentConfig {
    AgentConfig {
        version_details: "9.9.9".into(),
        ..AgentConfig::default()
    }
}

// ── Container runtime ─────────────────────────────────────────────────────────

#[derive(Default)]
struct RuntimeState {
    containers: Vec<ContainerSummary>,
    images: Vec<ImageSummary>,
    next_id: usize,
}

/// A container engine held in memory.
///
/// Mutating operations yield mid-flight; two of them interleaving sets
/// [`InMemoryRuntime::overlapped`].
#[derive(Default)]
pub struct InMemoryRuntime {
    state: Mutex<RuntimeState>,
    journal: Journal,
    in_flight: AtomicUsize,
    overlap: AtomicBool,
    pub fail_pull: Mutex<HashSet<String>>,
    pub fail_start: Mutex<HashSet<String>>,
    pub fail_list: AtomicBool,
    pub fail_images: AtomicBool,
    pub fail_remove: AtomicBool,
    pub package: Mutex<Vec<u8>>,
    /// Simulated registry latency for every pull.
    pub pull_delay: Mutex<Duration>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, name: &str, image: &str, state: ContainerState) -> Self {
        {
            let mut inner = self.state.lock().expect("state");
            inner.next_id += 1;
            let id = format!("{name}-{}", inner.next_id);
            inner.containers.push(ContainerSummary {
                id,
                names: vec![format!("/{name}")],
                image: image.into(),
                state,
                ..ContainerSummary::default()
            });
            inner.images.push(ImageSummary {
                id: format!("sha256:{image}"),
                repository: image.into(),
                ..ImageSummary::default()
            });
        }
        self
    }

    pub fn journal(&self) -> Journal {
        Arc::clone(&self.journal)
    }

    /// Journal entries recorded by the runtime and anything sharing it.
    pub fn calls(&self) -> Vec<String> {
        self.journal.lock().expect("journal").clone()
    }

    /// Mutating calls only.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("ps") && !c.starts_with("images"))
            .collect()
    }

    pub fn containers(&self) -> Vec<ContainerSummary> {
        self.state.lock().expect("state").containers.clone()
    }

    pub fn container(&self, name: &str) -> Option<ContainerSummary> {
        self.containers().into_iter().find(|c| c.has_name(name))
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.state
            .lock()
            .expect("state")
            .images
            .iter()
            .any(|i| i.repository == image)
    }

    pub fn overlapped(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }

    async fn mutate(&self) {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlap.store(true, Ordering::SeqCst);
        }
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ContainerRuntime for InMemoryRuntime {
    async fn pull_image(&self, image: &str, auth: Option<&RegistryAuth>) -> Result<()> {
        let delay = *self.pull_delay.lock().expect("delay");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.mutate().await;
        match auth {
            Some(auth) if auth.server.is_empty() => {
                note(&self.journal, format!("pull {image} as {}", auth.credential.user));
            }
            Some(auth) => note(
                &self.journal,
                format!("pull {image} as {}@{}", auth.credential.user, auth.server),
            ),
            None => note(&self.journal, format!("pull {image}")),
        }
        if self.fail_pull.lock().expect("flags").contains(image) {
            anyhow::bail!("manifest for {image} not found");
        }
        let mut inner = self.state.lock().expect("state");
        if !inner.images.iter().any(|i| i.repository == image) {
            inner.images.push(ImageSummary {
                id: format!("sha256:{image}"),
                repository: image.into(),
                ..ImageSummary::default()
            });
        }
        Ok(())
    }

    async fn list_containers(&self, name: Option<&str>) -> Result<Vec<ContainerSummary>> {
        note(&self.journal, format!("ps {}", name.unwrap_or("*")));
        if self.fail_list.load(Ordering::SeqCst) {
            anyhow::bail!("cannot connect to the container engine");
        }
        let inner = self.state.lock().expect("state");
        // Name filters match substrings, as the engine's do.
        Ok(inner
            .containers
            .iter()
            .filter(|c| name.is_none_or(|n| c.names.iter().any(|cn| cn.contains(n))))
            .cloned()
            .collect())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        note(&self.journal, "images");
        if self.fail_images.load(Ordering::SeqCst) {
            anyhow::bail!("image store unavailable");
        }
        Ok(self.state.lock().expect("state").images.clone())
    }

    async fn create_and_start(&self, _spec: &ContainerSpec, image: &str, name: &str) -> Result<String> {
        self.mutate().await;
        note(&self.journal, format!("create {name} {image}"));
        if self.fail_start.lock().expect("flags").contains(name) {
            anyhow::bail!("port is already allocated");
        }
        let mut inner = self.state.lock().expect("state");
        inner.next_id += 1;
        let id = format!("{name}-{}", inner.next_id);
        inner.containers.push(ContainerSummary {
            id: id.clone(),
            names: vec![format!("/{name}")],
            image: image.into(),
            state: ContainerState::Running,
            ..ContainerSummary::default()
        });
        Ok(id)
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<()> {
        self.mutate().await;
        note(&self.journal, format!("rm {id}"));
        if self.fail_remove.load(Ordering::SeqCst) {
            anyhow::bail!("removal of container {id} is already in progress");
        }
        let mut inner = self.state.lock().expect("state");
        let before = inner.containers.len();
        inner.containers.retain(|c| c.id != id);
        if inner.containers.len() == before {
            anyhow::bail!("no such container: {id}");
        }
        Ok(())
    }

    async fn remove_image(&self, image: &str, _force: bool) -> Result<()> {
        self.mutate().await;
        note(&self.journal, format!("rmi {image}"));
        self.state
            .lock()
            .expect("state")
            .images
            .retain(|i| i.repository != image);
        Ok(())
    }

    async fn copy_to_container(&self, id: &str, path: &str, _archive: &[u8]) -> Result<()> {
        self.mutate().await;
        note(&self.journal, format!("cp-to {id}:{path}"));
        Ok(())
    }

    async fn copy_from_container(&self, id: &str, path: &str) -> Result<Vec<u8>> {
        self.mutate().await;
        note(&self.journal, format!("cp-from {id}:{path}"));
        Ok(self.package.lock().expect("package").clone())
    }

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<()> {
        self.mutate().await;
        note(&self.journal, format!("rename {id} {new_name}"));
        Ok(())
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// Records publishes; inbound messages are fed through [`push`](Self::push).
pub struct RecordingTransport {
    published: Mutex<Vec<(Channel, Vec<u8>)>>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
    pub fail_publish: AtomicBool,
    pub fail_subscribe: AtomicBool,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            published: Mutex::new(Vec::new()),
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: Mutex::new(Some(rx)),
            fail_publish: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
        }
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, payload: impl Into<Vec<u8>>) {
        if let Some(tx) = self.inbound_tx.lock().expect("tx").as_ref() {
            tx.send(payload.into()).expect("subscription alive");
        }
    }

    /// Ends the inbound stream once queued messages are drained.
    pub fn close(&self) {
        self.inbound_tx.lock().expect("tx").take();
    }

    pub fn published_on(&self, channel: Channel) -> Vec<Vec<u8>> {
        self.published
            .lock()
            .expect("published")
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.published_on(Channel::Event)
            .iter()
            .map(|p| serde_json::from_slice(p).expect("event json"))
            .collect()
    }

    pub fn heartbeats(&self) -> Vec<Heartbeat> {
        self.published_on(Channel::Heartbeat)
            .iter()
            .map(|p| serde_json::from_slice(p).expect("heartbeat json"))
            .collect()
    }
}

pub struct QueueSubscription {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Subscription for QueueSubscription {
    async fn next_message(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

impl Transport for RecordingTransport {
    type Subscription = QueueSubscription;

    async fn publish(&self, channel: Channel, payload: &[u8]) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            anyhow::bail!("broker unavailable");
        }
        self.published
            .lock()
            .expect("published")
            .push((channel, payload.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, channel: Channel) -> Result<QueueSubscription> {
        assert_eq!(channel, Channel::UpdateManifest);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            anyhow::bail!("subscription refused");
        }
        let rx = self
            .inbound_rx
            .lock()
            .expect("rx")
            .take()
            .ok_or_else(|| anyhow::anyhow!("already subscribed"))?;
        Ok(QueueSubscription { rx })
    }
}

// ── Host ──────────────────────────────────────────────────────────────────────

/// Marker, installer, supervisor and migrator in memory.
#[derive(Default)]
pub struct FakeHost {
    journal: Journal,
    marker: AtomicBool,
    pub installed: Mutex<Vec<Vec<u8>>>,
    pub fail_marker_write: AtomicBool,
    pub fail_install: AtomicBool,
    pub fail_enable: AtomicBool,
    pub fail_migrate: AtomicBool,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host whose journal is interleaved with `runtime`'s.
    pub fn sharing(runtime: &InMemoryRuntime) -> Self {
        Self {
            journal: runtime.journal(),
            ..Self::default()
        }
    }

    pub fn with_marker(self) -> Self {
        self.marker.store(true, Ordering::SeqCst);
        self
    }

    pub fn marker(&self) -> bool {
        self.marker.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.journal
            .lock()
            .expect("journal")
            .iter()
            .filter(|e| e.starts_with("host:"))
            .cloned()
            .collect()
    }
}

impl MarkerStore for FakeHost {
    fn marker_exists(&self) -> bool {
        self.marker()
    }

    fn write_marker(&self) -> Result<()> {
        note(&self.journal, "host: write marker");
        if self.fail_marker_write.load(Ordering::SeqCst) {
            anyhow::bail!("read-only file system");
        }
        self.marker.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn remove_marker(&self) -> Result<()> {
        note(&self.journal, "host: remove marker");
        self.marker.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl PackageInstaller for FakeHost {
    async fn install_package(&self, archive: Vec<u8>) -> Result<()> {
        note(&self.journal, "host: install package");
        if self.fail_install.load(Ordering::SeqCst) {
            anyhow::bail!("copy stream contains no package file");
        }
        self.installed.lock().expect("installed").push(archive);
        Ok(())
    }
}

impl ProcessSupervisor for FakeHost {
    async fn reload_units(&self) -> Result<()> {
        note(&self.journal, "host: reload units");
        Ok(())
    }

    async fn enable_unit(&self, name: &str) -> Result<()> {
        note(&self.journal, format!("host: enable {name}"));
        if self.fail_enable.load(Ordering::SeqCst) {
            anyhow::bail!("Unit {name}.service not found");
        }
        Ok(())
    }
}

impl DatabaseMigrator for FakeHost {
    async fn migrate(&self) -> Result<()> {
        note(&self.journal, "host: migrate");
        if self.fail_migrate.load(Ordering::SeqCst) {
            anyhow::bail!("Access denied for user 'root'");
        }
        Ok(())
    }
}

// ── Manifest source ───────────────────────────────────────────────────────────

/// Serves one manifest and counts fetches.
pub struct StaticSource {
    manifest: Mutex<UpdateManifest>,
    fetches: AtomicUsize,
    pub fail: AtomicBool,
}

impl StaticSource {
    pub fn new(manifest: UpdateManifest) -> Self {
        Self {
            manifest: Mutex::new(manifest),
            fetches: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set(&self, manifest: UpdateManifest) {
        *self.manifest.lock().expect("manifest") = manifest;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ManifestSource for StaticSource {
    async fn fetch(&self, _url: &str) -> Result<UpdateManifest> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("asset server returned 503");
        }
        Ok(self.manifest.lock().expect("manifest").clone())
    }
}
