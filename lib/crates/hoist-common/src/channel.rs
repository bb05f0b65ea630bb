//! Logical message-bus channel names.
//!
//! A [`SubManifest`](crate::SubManifest) maps each of these keys to the
//! broker-specific queue or topic name.

use std::fmt;

/// Key for the channel carrying encoded update manifests.
pub const UPDATE_MANIFEST: &str = "update_manifest";
/// Key for the channel carrying heartbeats.
pub const HEARTBEAT: &str = "heartbeat";
/// Key for the channel carrying lifecycle events.
pub const EVENT: &str = "event";

/// A logical channel the agent talks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    UpdateManifest,
    Heartbeat,
    Event,
}

impl Channel {
    /// The key used for this channel in the `queues`/`topics` maps.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::UpdateManifest => UPDATE_MANIFEST,
            Self::Heartbeat => HEARTBEAT,
            Self::Event => EVENT,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
