//! Installs the agent's content package onto the host.
//!
//! The runtime's copy stream is a tar archive wrapping a single file: the
//! gzip tarball of the package. It is staged in a temp file, unpacked into a
//! fresh install root, and its unit file is installed for the supervisor.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;

use crate::application::ports::PackageInstaller;
use crate::domain::AgentConfig;

#[derive(Debug, Clone)]
pub struct PackageInstall {
    root: PathBuf,
    launch_script: PathBuf,
    binary: PathBuf,
    packaged_unit: PathBuf,
    installed_unit: PathBuf,
}

impl PackageInstall {
    #[must_use]
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            root: config.updater_root.clone(),
            launch_script: config.launch_script_path(),
            binary: config.agent_binary_path(),
            packaged_unit: config.packaged_unit_path(),
            installed_unit: config.installed_unit_path(),
        }
    }

    /// Synchronous install, used by `install_package` via `spawn_blocking`.
    fn install_sync(&self, archive: &[u8]) -> Result<()> {
        let staged = stage_package(archive)?;

        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)
                .with_context(|| format!("removing previous install root {}", self.root.display()))?;
        }
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("creating install root {}", self.root.display()))?;

        let package = File::open(staged.path()).context("reopening staged package")?;
        tar::Archive::new(GzDecoder::new(package))
            .unpack(&self.root)
            .with_context(|| format!("unpacking package into {}", self.root.display()))?;

        set_executable(&self.launch_script)?;

        if let Some(parent) = self.installed_unit.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        std::fs::copy(&self.packaged_unit, &self.installed_unit).with_context(|| {
            format!(
                "installing unit {} to {}",
                self.packaged_unit.display(),
                self.installed_unit.display()
            )
        })?;

        set_executable(&self.binary)
    }
}

impl PackageInstaller for PackageInstall {
    async fn install_package(&self, archive: Vec<u8>) -> Result<()> {
        let installer = self.clone();
        tokio::task::spawn_blocking(move || installer.install_sync(&archive))
            .await
            .context("package install task panicked")?
    }
}

/// Copies the first regular file of the copy stream into a temp file.
fn stage_package(archive: &[u8]) -> Result<tempfile::NamedTempFile> {
    let mut outer = tar::Archive::new(archive);
    for entry in outer.entries().context("reading copy stream")? {
        let mut entry = entry.context("reading copy stream entry")?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let mut staged = tempfile::NamedTempFile::new().context("creating staging file")?;
        io::copy(&mut entry, staged.as_file_mut()).context("staging package")?;
        return Ok(staged);
    }
    anyhow::bail!("copy stream contains no package file")
}

fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("marking {} executable", path.display()))?;
    }
    #[cfg(not(unix))]
    {
        std::fs::metadata(path).with_context(|| format!("checking {}", path.display()))?;
    }
    Ok(())
}
