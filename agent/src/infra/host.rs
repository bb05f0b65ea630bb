//! The local host: marker file, package installer, systemd and the
//! database migrator, bundled behind the host ports.

use std::path::Path;

use anyhow::Result;

use crate::application::ports::{
    CommandRunner, DatabaseMigrator, MarkerStore, PackageInstaller, ProcessSupervisor,
};
use crate::domain::AgentConfig;
use crate::infra::database::MysqlMigrator;
use crate::infra::marker::MarkerFile;
use crate::infra::package::PackageInstall;
use crate::infra::systemd::Systemd;

pub struct LocalHost<C> {
    marker: MarkerFile,
    installer: PackageInstall,
    supervisor: Systemd<C>,
    migrator: MysqlMigrator<C>,
}

impl<C: CommandRunner + Clone> LocalHost<C> {
    pub fn new(config: &AgentConfig, runner: C) -> Self {
        Self {
            marker: MarkerFile::new(config.marker_path()),
            installer: PackageInstall::from_config(config),
            supervisor: Systemd::new(runner.clone()),
            migrator: MysqlMigrator::new(runner, config.database()),
        }
    }
}

impl<C> MarkerStore for LocalHost<C> {
    fn marker_exists(&self) -> bool {
        self.marker.marker_exists()
    }

    fn write_marker(&self) -> Result<()> {
        self.marker.write_marker()
    }

    fn remove_marker(&self) -> Result<()> {
        self.marker.remove_marker()
    }
}

impl<C> PackageInstaller for LocalHost<C> {
    async fn install_package(&self, archive: Vec<u8>) -> Result<()> {
        self.installer.install_package(archive).await
    }
}

impl<C: CommandRunner> ProcessSupervisor for LocalHost<C> {
    async fn reload_units(&self) -> Result<()> {
        self.supervisor.reload_units().await
    }

    async fn enable_unit(&self, name: &str) -> Result<()> {
        self.supervisor.enable_unit(name).await
    }
}

impl<C: CommandRunner> DatabaseMigrator for LocalHost<C> {
    async fn migrate(&self) -> Result<()> {
        self.migrator.migrate().await
    }
}

/// Whether this process appears to run inside a container.
#[must_use]
pub fn running_in_container() -> bool {
    if Path::new("/.dockerenv").exists() {
        return true;
    }
    std::fs::read_to_string("/proc/1/cgroup")
        .map(|cgroup| cgroup_indicates_container(&cgroup))
        .unwrap_or(false)
}

fn cgroup_indicates_container(cgroup: &str) -> bool {
    cgroup.lines().any(|line| {
        line.contains("docker") || line.contains("kubepods") || line.contains("containerd")
    })
}
