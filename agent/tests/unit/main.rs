//! Unit tests for the hoist agent services
//!
//! These tests run the application services against in-memory port doubles
//! and need neither a container engine nor a broker.

mod mocks;
mod trigger;
