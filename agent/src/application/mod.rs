//! Application layer: port trait definitions and use-case orchestration.
//!
//! This module depends only on `crate::domain` and `hoist_common`, never
//! on `crate::infra` or `crate::commands`.

pub mod ports;
pub mod services;

pub use ports::{
    CommandRunner, ContainerRuntime, DatabaseMigrator, HostPorts, ManifestSource, MarkerStore,
    PackageInstaller, ProcessSupervisor, RegistryAuth, Subscription, Transport,
};
