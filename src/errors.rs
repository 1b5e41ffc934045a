// src/errors.rs

//! Crate-wide error aliases and the fatal engine-initialization error.
//!
//! Per-command failures (spawn errors, timeouts) are never surfaced here:
//! they travel to the caller as ordinary terminal `ProcessResult`s. The
//! typed errors below only cover conditions that make the engine itself
//! unusable.

pub use anyhow::{Error, Result};

/// Fatal errors raised while building a [`crate::engine::ProcessEngine`].
///
/// These are surfaced synchronously from engine construction, before any
/// command can be registered. The engine never degrades to a half-working
/// state: if construction fails, there is no engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The poller pool was configured with zero workers.
    #[error("poller pool requires at least one worker")]
    EmptyPool,

    /// The engine was built outside of a tokio runtime, so there is no
    /// context to run poller workers or dispatch callbacks on.
    #[error("engine must be created inside a tokio runtime")]
    NoRuntime,

    /// The dedicated spawn-manager thread could not be created.
    #[error("failed to start spawn manager thread")]
    ManagerInit(#[source] std::io::Error),

    /// The spawn manager's private runtime could not be built.
    #[error("failed to build spawn manager runtime")]
    ManagerRuntime(#[source] std::io::Error),
}
