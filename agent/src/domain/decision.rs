//! Pure update-decision rules.

use std::fmt;

use hoist_common::{Component, ContainerSummary, UpdateOp};

/// What a pass should do with one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The running container already matches.
    Skip,
    /// No usable container exists; start one.
    Create,
    /// A running container exists with a different image.
    Replace,
    /// The component is retired; any container has already been removed.
    Deprecate,
}

impl Decision {
    /// Whether applying this decision pulls an image and starts a container.
    #[must_use]
    pub fn mutates(self) -> bool {
        matches!(self, Self::Create | Self::Replace)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Skip => "skip",
            Self::Create => "create",
            Self::Replace => "replace",
            Self::Deprecate => "deprecate",
        };
        f.write_str(s)
    }
}

/// Applies the decision rules in order: force, deprecate, absent,
/// not running, image match, otherwise replace.
///
/// `existing` is the container currently holding the component's name.
#[must_use]
pub fn evaluate(component: &Component, existing: Option<&ContainerSummary>) -> Decision {
    if component.force {
        return if existing.is_some() {
            Decision::Replace
        } else {
            Decision::Create
        };
    }
    if component.operation == UpdateOp::Deprecate {
        return Decision::Deprecate;
    }
    let Some(container) = existing else {
        return Decision::Create;
    };
    if !container.is_running() {
        return Decision::Create;
    }
    if container.image == component.image_ref() {
        Decision::Skip
    } else {
        Decision::Replace
    }
}
