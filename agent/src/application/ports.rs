//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and `hoist_common`, never
//! from `crate::infra` or `crate::commands`.

use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use hoist_common::{Channel, ContainerSpec, ContainerSummary, Credential, ImageSummary, UpdateManifest};

// ── Container runtime ─────────────────────────────────────────────────────────

/// Login for a single pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    /// Registry to authenticate against; empty means the image reference's
    /// own registry.
    pub server: String,
    pub credential: Credential,
}

/// Container engine operations used by the orchestrator and reporting.
///
/// Implementations wrap every failure with the operation name; callers
/// decide whether it is fatal to the component or best-effort.
#[allow(async_fn_in_trait)]
pub trait ContainerRuntime {
    /// Pull an image, authenticating first when a login is given. The login
    /// must not outlive the pull.
    async fn pull_image(&self, image: &str, auth: Option<&RegistryAuth>) -> Result<()>;
    /// List containers, optionally narrowed by a name filter. The filter
    /// may match loosely; callers match names exactly.
    async fn list_containers(&self, name: Option<&str>) -> Result<Vec<ContainerSummary>>;
    /// List local images.
    async fn list_images(&self) -> Result<Vec<ImageSummary>>;
    /// Create a container named `name` from `image` and start it.
    /// Returns the new container's id.
    async fn create_and_start(&self, spec: &ContainerSpec, image: &str, name: &str) -> Result<String>;
    /// Remove a container.
    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;
    /// Remove an image.
    async fn remove_image(&self, image: &str, force: bool) -> Result<()>;
    /// Write a tar stream into a container at `path`.
    async fn copy_to_container(&self, id: &str, path: &str, archive: &[u8]) -> Result<()>;
    /// Read `path` out of a container as a tar stream.
    async fn copy_from_container(&self, id: &str, path: &str) -> Result<Vec<u8>>;
    /// Rename a container.
    async fn rename_container(&self, id: &str, new_name: &str) -> Result<()>;
}

// ── Push transport ────────────────────────────────────────────────────────────

/// An armed subscription on one channel.
#[allow(async_fn_in_trait)]
pub trait Subscription {
    /// Next inbound payload, or `None` once the subscription has ended.
    async fn next_message(&mut self) -> Option<Vec<u8>>;
}

/// Publish/subscribe over a message bus, addressed by logical channel.
#[allow(async_fn_in_trait)]
pub trait Transport {
    type Subscription: Subscription;

    async fn publish(&self, channel: Channel, payload: &[u8]) -> Result<()>;
    async fn subscribe(&self, channel: Channel) -> Result<Self::Subscription>;
}

// ── Pull source ───────────────────────────────────────────────────────────────

/// Fetches the current update manifest from an asset location.
#[allow(async_fn_in_trait)]
pub trait ManifestSource {
    async fn fetch(&self, url: &str) -> Result<UpdateManifest>;
}

// ── Host ──────────────────────────────────────────────────────────────────────

/// The host init system.
#[allow(async_fn_in_trait)]
pub trait ProcessSupervisor {
    /// Reload unit definitions.
    async fn reload_units(&self) -> Result<()>;
    /// Enable (but do not start or restart) a unit.
    async fn enable_unit(&self, name: &str) -> Result<()>;
}

/// The durable self-update marker.
pub trait MarkerStore {
    fn marker_exists(&self) -> bool;
    /// Record that a self-update was initiated.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    fn write_marker(&self) -> Result<()>;
    /// Remove the marker. Removing an absent marker is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing marker cannot be removed.
    fn remove_marker(&self) -> Result<()>;
}

/// Installs the agent's content package onto the host.
#[allow(async_fn_in_trait)]
pub trait PackageInstaller {
    /// Replace the install root with the package carried in `archive` (the
    /// runtime's tar copy stream) and install its service unit.
    async fn install_package(&self, archive: Vec<u8>) -> Result<()>;
}

/// Post-update database work.
#[allow(async_fn_in_trait)]
pub trait DatabaseMigrator {
    async fn migrate(&self) -> Result<()>;
}

/// Everything the self-update flow needs from the host.
///
/// Blanket-implemented for any type implementing all four host ports.
pub trait HostPorts: MarkerStore + PackageInstaller + ProcessSupervisor + DatabaseMigrator {}

impl<T> HostPorts for T where T: MarkerStore + PackageInstaller + ProcessSupervisor + DatabaseMigrator {}

// ── Process execution ─────────────────────────────────────────────────────────

/// Runs external programs with a bounded wait.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run with the runner's default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run with an explicit timeout.
    async fn run_with_timeout(&self, program: &str, args: &[&str], timeout: Duration) -> Result<Output>;
    /// Run, writing `input` to the child's stdin.
    async fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<Output>;
}
