//! Agent configuration, deserialised once at startup from `HOIST_*`
//! environment variables and passed by reference from then on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hoist_common::{AssetManifest, CodecError, SubManifest};
use serde::Deserialize;

use crate::domain::error::UpdateError;

/// Which triggers drive manifest application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WorkMode {
    /// Push only: apply manifests delivered on the update channel.
    Sub,
    /// Poll only: fetch the asset manifest on a fixed interval.
    Sched,
    /// Both triggers, sharing one orchestration lock.
    #[default]
    Dual,
}

/// Connection parameters for the post-update database migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub sql_path: PathBuf,
    pub login: String,
    pub key_file: PathBuf,
    pub host: String,
    pub port: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Encoded [`AssetManifest`] locating the update manifest.
    #[serde(default)]
    pub asset_manifest: Option<String>,

    /// Encoded [`SubManifest`] for the push transport.
    #[serde(default)]
    pub sub_manifest: Option<String>,

    #[serde(default)]
    pub work_mode: WorkMode,

    #[serde(default = "default_sched_duration", with = "humantime_serde")]
    pub sched_duration: Duration,

    #[serde(default = "default_post_op_marker")]
    pub post_op_marker: PathBuf,

    /// Install root for the agent's own content package.
    #[serde(default = "default_updater_root")]
    pub updater_root: PathBuf,

    /// Name of the supervisor unit that runs the agent.
    #[serde(default = "default_updater_service")]
    pub updater_service: String,

    /// Path of the content package inside the agent's image.
    #[serde(default = "default_updater_in_container")]
    pub updater_in_container: String,

    #[serde(default = "default_unit_dir")]
    pub unit_dir: PathBuf,

    /// Launch script, relative to the install root.
    #[serde(default = "default_launch_script")]
    pub launch_script: PathBuf,

    /// Agent binary, relative to the install root.
    #[serde(default = "default_agent_binary")]
    pub agent_binary: PathBuf,

    /// Version string reported in heartbeats and events.
    #[serde(default = "default_version_details")]
    pub version_details: String,

    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,

    #[serde(default = "default_pull_timeout", with = "humantime_serde")]
    pub pull_timeout: Duration,

    #[serde(default)]
    pub allow_containerized: bool,

    #[serde(default)]
    pub update_sql_path: Option<PathBuf>,
    #[serde(default)]
    pub db_login: Option<String>,
    #[serde(default)]
    pub db_key: Option<PathBuf>,
    #[serde(default)]
    pub db_host: Option<String>,
    #[serde(default)]
    pub db_port: Option<String>,
}

fn default_sched_duration() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_post_op_marker() -> PathBuf {
    PathBuf::from("/opt/.updater_post_op")
}

fn default_updater_root() -> PathBuf {
    PathBuf::from("/opt/hoist")
}

fn default_updater_service() -> String {
    "hoist".to_string()
}

fn default_updater_in_container() -> String {
    "/opt/hoist/hoist.tar.gz".to_string()
}

fn default_unit_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

fn default_launch_script() -> PathBuf {
    PathBuf::from("scripts/updater.sh")
}

fn default_agent_binary() -> PathBuf {
    PathBuf::from("hoistd")
}

fn default_version_details() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_pull_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            asset_manifest: None,
            sub_manifest: None,
            work_mode: WorkMode::default(),
            sched_duration: default_sched_duration(),
            post_op_marker: default_post_op_marker(),
            updater_root: default_updater_root(),
            updater_service: default_updater_service(),
            updater_in_container: default_updater_in_container(),
            unit_dir: default_unit_dir(),
            launch_script: default_launch_script(),
            agent_binary: default_agent_binary(),
            version_details: default_version_details(),
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
            pull_timeout: default_pull_timeout(),
            allow_containerized: false,
            update_sql_path: None,
            db_login: None,
            db_key: None,
            db_host: None,
            db_port: None,
        }
    }
}

impl AgentConfig {
    /// Decodes the configured asset manifest, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when the value is set but malformed.
    pub fn asset_manifest(&self) -> Result<Option<AssetManifest>, CodecError> {
        decode_optional(self.asset_manifest.as_deref())
    }

    /// Decodes the configured sub manifest, if any.
    pub fn sub_manifest(&self) -> Result<Option<SubManifest>, CodecError> {
        decode_optional(self.sub_manifest.as_deref())
    }

    /// The database hook parameters, when every required value is present.
    #[must_use]
    pub fn database(&self) -> Option<DatabaseConfig> {
        Some(DatabaseConfig {
            sql_path: self.update_sql_path.clone()?,
            login: self.db_login.clone()?,
            key_file: self.db_key.clone()?,
            host: self.db_host.clone().unwrap_or_else(|| "127.0.0.1".to_string()),
            port: self.db_port.clone().unwrap_or_else(|| "3306".to_string()),
        })
    }

    #[must_use]
    pub fn launch_script_path(&self) -> PathBuf {
        self.updater_root.join(&self.launch_script)
    }

    #[must_use]
    pub fn agent_binary_path(&self) -> PathBuf {
        self.updater_root.join(&self.agent_binary)
    }

    /// Where the unit file sits inside an unpacked content package.
    #[must_use]
    pub fn packaged_unit_path(&self) -> PathBuf {
        self.updater_root
            .join("config")
            .join(format!("{}.service", self.updater_service))
    }

    #[must_use]
    pub fn installed_unit_path(&self) -> PathBuf {
        self.unit_dir.join(format!("{}.service", self.updater_service))
    }

    /// Rejects combinations that cannot work for the chosen mode.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Configuration`] naming the missing value.
    pub fn validate_for(&self, mode: WorkMode) -> Result<(), UpdateError> {
        if self.updater_service.trim().is_empty() {
            return Err(UpdateError::Configuration(
                "HOIST_UPDATER_SERVICE must not be empty".into(),
            ));
        }
        if self.sched_duration.is_zero() && mode != WorkMode::Sub {
            return Err(UpdateError::Configuration(
                "HOIST_SCHED_DURATION must be greater than zero".into(),
            ));
        }
        if mode == WorkMode::Sub && self.sub_manifest.is_none() {
            return Err(UpdateError::Configuration(
                "work mode 'sub' requires HOIST_SUB_MANIFEST".into(),
            ));
        }
        if mode == WorkMode::Sched && self.asset_manifest.is_none() {
            return Err(UpdateError::Configuration(
                "work mode 'sched' requires HOIST_ASSET_MANIFEST".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn marker_path(&self) -> &Path {
        &self.post_op_marker
    }
}

fn decode_optional<T: serde::de::DeserializeOwned>(
    value: Option<&str>,
) -> Result<Option<T>, CodecError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => hoist_common::decode_payload(text.as_bytes()).map(Some),
    }
}
