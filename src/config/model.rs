// src/config/model.rs

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::engine::SpawnStrategy;

/// Engine configuration as read from a TOML file.
///
/// ```toml
/// pool_size = 4
/// default_timeout_secs = 600.0
/// poll_interval_secs = 0.5
/// strategy = "direct"
/// ```
///
/// All fields are optional and default to the engine's built-in constants.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Number of poller workers in the direct strategy's pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Timeout applied when the caller does not set one, in seconds.
    /// `0` disables the timeout.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: f64,

    /// Poll interval substituted when a deadline is imminent but not yet
    /// due, in seconds. Bounds timeout detection resolution.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,

    /// `"direct"` (poller pool) or `"delegated"` (spawn manager).
    #[serde(default)]
    pub strategy: SpawnStrategy,
}

fn default_pool_size() -> usize {
    4
}

fn default_timeout_secs() -> f64 {
    600.0
}

fn default_poll_interval_secs() -> f64 {
    0.5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            default_timeout_secs: default_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            strategy: SpawnStrategy::default(),
        }
    }
}

impl EngineConfig {
    /// Run basic semantic validation against a loaded configuration.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(anyhow!("pool_size must be >= 1 (got 0)"));
        }

        if !self.poll_interval_secs.is_finite() || self.poll_interval_secs <= 0.0 {
            return Err(anyhow!(
                "poll_interval_secs must be a positive number (got {})",
                self.poll_interval_secs
            ));
        }

        if !self.default_timeout_secs.is_finite() || self.default_timeout_secs < 0.0 {
            return Err(anyhow!(
                "default_timeout_secs must be >= 0 (got {})",
                self.default_timeout_secs
            ));
        }

        Ok(())
    }

    /// The poll interval as a `Duration`, falling back to the built-in
    /// default when the configured value is unusable.
    pub fn poll_interval(&self) -> Duration {
        if self.poll_interval_secs.is_finite() && self.poll_interval_secs > 0.0 {
            Duration::from_secs_f64(self.poll_interval_secs)
        } else {
            Duration::from_secs_f64(default_poll_interval_secs())
        }
    }
}
