// src/config/mod.rs

//! Engine configuration.
//!
//! - [`model`] holds the `EngineConfig` struct as deserialized from TOML,
//!   with serde defaults matching the original engine's constants.
//! - [`loader`] reads and validates a config file from disk.

pub mod loader;
pub mod model;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::EngineConfig;
