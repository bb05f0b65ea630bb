//! File-backed self-update marker.
//!
//! The marker holds the RFC 3339 time the rollout began. It is written via
//! temp file + rename so a crash never leaves a half-written marker.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::MarkerStore;

#[derive(Debug, Clone)]
pub struct MarkerFile {
    path: PathBuf,
}

impl MarkerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MarkerStore for MarkerFile {
    fn marker_exists(&self) -> bool {
        self.path.exists()
    }

    fn write_marker(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, chrono::Utc::now().to_rfc3339())
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("setting permissions on {}", temp_path.display()))?;
        }

        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("finalizing marker {}", self.path.display()))
    }

    fn remove_marker(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing marker {}", self.path.display())),
        }
    }
}
