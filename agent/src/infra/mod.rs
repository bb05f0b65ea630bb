//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, the
//! docker CLI, systemd, the host filesystem, manifest fetching and the
//! push transports.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` are forbidden.

pub mod command_runner;
pub mod database;
pub mod docker;
pub mod host;
pub mod manifest_source;
pub mod marker;
pub mod package;
pub mod systemd;
pub mod transport;

#[cfg(test)]
pub mod test_support;
