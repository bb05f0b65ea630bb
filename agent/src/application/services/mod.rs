//! Application services: use-case orchestration.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports`, never from `crate::infra` or
//! `crate::commands`.

pub mod decision;
pub mod orchestrator;
pub mod pass;
pub mod reporting;
pub mod self_update;
pub mod trigger;

pub use decision::{decide, find_container};
pub use orchestrator::{ApplyReport, HookOutcome, HookRunner, HookTarget, NoHooks, PostSetupStep, apply, execute};
pub use pass::{ComponentOutcome, PassReport, UpdateAgent};
pub use reporting::{Reporter, build_heartbeat};
pub use self_update::SelfUpdater;
pub use trigger::{RestartRequested, TriggerCoordinator};
