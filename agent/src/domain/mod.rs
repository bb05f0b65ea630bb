//! Domain layer: configuration, decision rules and the error taxonomy.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.

pub mod config;
pub mod decision;
pub mod error;

pub use config::{AgentConfig, DatabaseConfig, WorkMode};
pub use decision::{Decision, evaluate};
pub use error::UpdateError;
