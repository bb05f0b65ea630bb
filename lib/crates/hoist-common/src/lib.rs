pub mod channel;
pub mod codec;
pub mod inventory;
pub mod manifest;
pub mod report;
pub mod version;

pub use channel::Channel;
pub use codec::{CodecError, decode, decode_credential, decode_payload, encode, encode_credential};
pub use inventory::{ContainerState, ContainerSummary, ImageSummary};
pub use manifest::*;
pub use report::{Event, EventType, Heartbeat};
pub use version::{InvalidVersionError, VersionNumber, latest, sort_tags};
