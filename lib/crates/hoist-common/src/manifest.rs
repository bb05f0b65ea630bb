use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::channel::Channel;

/// Component name reserved for the agent's own deployment.
pub const AGENT_COMPONENT: &str = "updater";

/// What the agent should do with a component.
///
/// Encoded on the wire as an integer (`0` = update, `1` = deprecate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum UpdateOp {
    #[default]
    Update,
    Deprecate,
}

impl UpdateOp {
    #[must_use]
    pub fn is_update(&self) -> bool {
        *self == Self::Update
    }
}

impl From<UpdateOp> for u8 {
    fn from(op: UpdateOp) -> Self {
        match op {
            UpdateOp::Update => 0,
            UpdateOp::Deprecate => 1,
        }
    }
}

impl TryFrom<u8> for UpdateOp {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Update),
            1 => Ok(Self::Deprecate),
            other => Err(format!("unknown update op {other}")),
        }
    }
}

/// Container creation settings, using the container engine's own field names.
///
/// Fields the agent does not interpret are kept in `extra` so that a
/// manifest survives a decode/encode cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub working_dir: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tty: bool,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, deserialize_with = "str_slice", skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    #[serde(default, deserialize_with = "str_slice", skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub exposed_ports: BTreeMap<String, serde_json::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A single host-side port binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_port: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub maximum_retry_count: u32,
}

impl RestartPolicy {
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.name.is_empty() && self.maximum_retry_count == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceMapping {
    pub path_on_host: String,
    #[serde(default)]
    pub path_in_container: String,
    #[serde(default)]
    pub cgroup_permissions: String,
}

/// Host-side settings: mounts, port publishing, restart policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network_mode: String,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    #[serde(default, skip_serializing_if = "RestartPolicy::is_unset")]
    pub restart_policy: RestartPolicy,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceMapping>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub privileged: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_remove: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Everything needed to create a container, grouped the way the engine
/// API groups it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    #[serde(rename = "container_config", default, deserialize_with = "null_default")]
    pub config: ContainerConfig,
    #[serde(rename = "host_config", default, deserialize_with = "null_default")]
    pub host: HostConfig,
    /// Network attachment settings, passed through untouched.
    #[serde(
        rename = "net_config",
        default,
        skip_serializing_if = "serde_json::Value::is_null"
    )]
    pub network: serde_json::Value,
}

/// One managed container: its desired image and creation settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    #[serde(default)]
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub registry: String,
    #[serde(default)]
    pub image_name: String,
    #[serde(default)]
    pub image_tag: String,
    #[serde(flatten)]
    pub container_spec: ContainerSpec,
    #[serde(default)]
    pub container_name: String,
    #[serde(rename = "op", default, skip_serializing_if = "UpdateOp::is_update")]
    pub operation: UpdateOp,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
    /// Encoded registry credential; empty means anonymous pulls.
    #[serde(rename = "cred", default, skip_serializing_if = "String::is_empty")]
    pub credential: String,
}

impl Component {
    /// The image reference to pull and run.
    ///
    /// The container config's image wins when set; otherwise the reference
    /// is assembled from `registry/image_name:image_tag`.
    #[must_use]
    pub fn image_ref(&self) -> String {
        let image = &self.container_spec.config.image;
        if !image.is_empty() {
            return image.clone();
        }
        let name = if self.registry.is_empty() {
            self.image_name.clone()
        } else {
            format!("{}/{}", self.registry.trim_end_matches('/'), self.image_name)
        };
        if self.image_tag.is_empty() {
            name
        } else {
            format!("{name}:{}", self.image_tag)
        }
    }

    /// Whether this entry describes the agent itself.
    #[must_use]
    pub fn is_agent(&self) -> bool {
        self.name == AGENT_COMPONENT
    }
}

/// The desired state for a set of components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateManifest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_default")]
    pub components: Vec<Component>,
}

impl UpdateManifest {
    /// Container names claimed by more than one component, in first-seen order.
    #[must_use]
    pub fn duplicate_container_names(&self) -> Vec<&str> {
        let mut seen = std::collections::BTreeSet::new();
        let mut dups = Vec::new();
        for component in &self.components {
            let name = component.container_name.as_str();
            if !seen.insert(name) && !dups.contains(&name) {
                dups.push(name);
            }
        }
        dups
    }
}

/// Username/password pair for a broker or registry.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
}

impl Credential {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.pass.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("pass", &if self.pass.is_empty() { "" } else { "***" })
            .finish()
    }
}

/// Connection details for the message bus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubManifest {
    pub uri: String,
    #[serde(rename = "cred", default)]
    pub credential: Credential,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub queues: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub topics: BTreeMap<String, String>,
}

impl SubManifest {
    /// Broker name for a logical channel. Topics take precedence over queues.
    #[must_use]
    pub fn channel(&self, channel: Channel) -> Option<&str> {
        self.topics
            .get(channel.key())
            .or_else(|| self.queues.get(channel.key()))
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }
}

/// Where to fetch the current update manifest from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub url: String,
}

/// Treats an explicit JSON `null` the same as a missing field.
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts either a single string or a list of strings, as the engine does
/// for `Cmd` and `Entrypoint`.
fn str_slice<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match Option::<OneOrMany>::deserialize(deserializer) {
        Ok(None) => Ok(Vec::new()),
        Ok(Some(OneOrMany::One(s))) => Ok(vec![s]),
        Ok(Some(OneOrMany::Many(v))) => Ok(v),
        Err(_) => Err(de::Error::custom("expected a string or a list of strings")),
    }
}
