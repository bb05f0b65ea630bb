//! Payloads the agent publishes: lifecycle events and heartbeats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::inventory::{ContainerSummary, ImageSummary};
use crate::manifest::AGENT_COMPONENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Started,
    Updated,
    Error,
}

/// A lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub component: String,
    pub created_at: DateTime<Utc>,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub payload: String,
}

impl Event {
    /// An event attributed to the agent itself.
    #[must_use]
    pub fn new(kind: EventType, version: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind,
            component: AGENT_COMPONENT.to_string(),
            created_at: Utc::now(),
            version: version.into(),
            payload: payload.into(),
        }
    }
}

/// Periodic status snapshot. When the inventory cannot be read, `error` is
/// set and the unread parts are left empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub component: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageSummary>,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl Heartbeat {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            component: AGENT_COMPONENT.to_string(),
            created_at: Utc::now(),
            containers: Vec::new(),
            images: Vec::new(),
            version: version.into(),
            error: String::new(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}
