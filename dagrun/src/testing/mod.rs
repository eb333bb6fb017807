//! Test support: mock backends and description fixtures.
//!
//! Public so downstream crates can drive the core against mocks in their
//! own tests.

pub mod fixtures;
pub mod mocks;

pub use fixtures::{chain, description, diamond};
pub use mocks::{FailingRunner, RecordingRunner};
