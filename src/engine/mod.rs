// src/engine/mod.rs

//! The process execution engine.
//!
//! [`ProcessEngine`] owns the completion poller pool and, on the delegated
//! strategy, the spawn-manager thread. Registering a command never blocks
//! the caller; results are delivered exactly once through the configured
//! [`CallbackExecutor`].

pub mod dispatch;
mod manager;
mod poller;

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::command::environment::compose_environment;
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::process::{Process, ProcessResult};

pub use dispatch::{CallbackExecutor, RuntimeExecutor, UnitOfWork};

use manager::SpawnManager;
use poller::{PollerPool, PollerRequest};

/// How children are spawned and reaped.
///
/// - `Direct`: each poller worker spawns its own children inline.
/// - `Delegated`: all spawning happens on the dedicated spawn-manager
///   thread, isolated from the host's threads; `LC_NUMERIC=C` is pinned in
///   every child environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnStrategy {
    Direct,
    Delegated,
}

impl Default for SpawnStrategy {
    fn default() -> Self {
        if cfg!(unix) {
            SpawnStrategy::Delegated
        } else {
            SpawnStrategy::Direct
        }
    }
}

impl FromStr for SpawnStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "direct" => Ok(SpawnStrategy::Direct),
            "delegated" => Ok(SpawnStrategy::Delegated),
            other => Err(format!(
                "invalid strategy: {other} (expected \"direct\" or \"delegated\")"
            )),
        }
    }
}

/// The engine: a poller pool, an optional spawn manager, and the callback
/// executor results are dispatched through.
pub struct ProcessEngine {
    strategy: SpawnStrategy,
    pool: PollerPool,
    manager: Option<SpawnManager>,
    next_id: AtomicU64,
}

impl ProcessEngine {
    /// Build an engine. Must be called inside a tokio runtime; worker tasks
    /// are spawned onto it. Any failure here is fatal — there is no
    /// degraded mode.
    pub fn new(
        config: EngineConfig,
        executor: Arc<dyn CallbackExecutor>,
    ) -> Result<Self, EngineError> {
        let poll_interval = config.poll_interval();
        let pool = PollerPool::start(config.pool_size, poll_interval, Arc::clone(&executor))?;

        let manager = match config.strategy {
            SpawnStrategy::Delegated => Some(SpawnManager::start(executor, poll_interval)?),
            SpawnStrategy::Direct => None,
        };

        Ok(Self {
            strategy: config.strategy,
            pool,
            manager,
            next_id: AtomicU64::new(0),
        })
    }

    /// The strategy this engine was built with.
    pub fn strategy(&self) -> SpawnStrategy {
        self.strategy
    }

    /// Register a descriptor and return immediately. `callback` is invoked
    /// exactly once, asynchronously, with the terminal [`ProcessResult`],
    /// whichever way the command ends.
    pub fn run<F>(&self, process: Process, callback: F)
    where
        F: FnOnce(ProcessResult) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (arguments, extra_environment, timeout) = process.into_parts();
        let environment = compose_environment(std::env::vars(), &extra_environment);

        let req = PollerRequest {
            id,
            arguments,
            environment,
            timeout,
            callback: Box::new(callback),
        };

        match &self.manager {
            Some(manager) => manager.register(req),
            None => self.pool.register(req),
        }
    }
}

/// The process-wide engine, built lazily on first use with default
/// configuration. The first caller must be inside a tokio runtime.
pub fn global() -> Result<&'static ProcessEngine, EngineError> {
    static ENGINE: OnceCell<ProcessEngine> = OnceCell::new();

    ENGINE.get_or_try_init(|| {
        let executor = Arc::new(RuntimeExecutor::current()?);
        ProcessEngine::new(EngineConfig::default(), executor)
    })
}
