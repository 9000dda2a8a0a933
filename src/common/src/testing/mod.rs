//! Test utilities for tsgate.
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```

mod config_builder;
mod faulty_storage;

pub use config_builder::TestConfigBuilder;
pub use faulty_storage::{Faults, FaultyStorage};
