//! Typed error taxonomy for a single component update.
//!
//! Collaborator errors arrive as `anyhow::Error` chains; they are rendered
//! into `reason` with the full context chain so events carry the cause.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    /// Credential decoding or image pull failed; nothing was mutated.
    #[error("failed to fetch image {image}: {reason}")]
    ImageFetch { image: String, reason: String },

    /// The new container could not be created or started.
    #[error("failed to start container {container}: {reason}")]
    ContainerStart { container: String, reason: String },

    /// A required setting is missing or unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The agent's own update could not be completed.
    #[error("self-update failed: {0}")]
    SelfUpdate(String),
}

impl UpdateError {
    pub fn image_fetch(image: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::ImageFetch {
            image: image.into(),
            reason: format!("{err:#}"),
        }
    }

    pub fn container_start(container: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::ContainerStart {
            container: container.into(),
            reason: format!("{err:#}"),
        }
    }
}
