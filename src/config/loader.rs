// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::model::EngineConfig;

/// Load a configuration file from a given path and return the raw
/// `EngineConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {:?}", path))?;

    let config: EngineConfig = toml::from_str(&contents)
        .with_context(|| format!("parsing TOML config from {:?}", path))?;

    Ok(config)
}

/// Load a configuration file from path and run basic validation.
///
/// This is the recommended entry point for the rest of the application:
/// reads TOML, applies defaults (handled by `serde` + `Default` impls), and
/// checks pool size, poll interval, and default timeout sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let config = load_from_path(&path)?;
    config.validate()?;
    Ok(config)
}

/// Helper to resolve a default config path.
///
/// Currently this just returns `Checkrun.toml` in the current working
/// directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Checkrun.toml")
}
