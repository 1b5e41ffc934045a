// src/process.rs

//! The per-invocation descriptor and its terminal result.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::engine;
use crate::errors::EngineError;

/// Default wall-clock timeout applied to new descriptors, in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 600.0;

/// Synthetic text appended to the output when a command is killed for
/// exceeding its deadline.
pub const TIMEOUT_MARKER: &str = "<Timeout exceeded.>";

/// Sentinel exit status reported when the spawn itself failed.
pub const SPAWN_FAILURE_EXIT_STATUS: i32 = 127;

/// An argv-style argument list, program first.
pub type Arguments = Vec<String>;

/// One-shot completion callback. Moving it into whichever completion path
/// fires is what makes at-most-once delivery structural.
pub type Callback = Box<dyn FnOnce(ProcessResult) + Send + 'static>;

/// The terminal result of one external command, produced exactly once per
/// run and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessResult {
    /// Pid of the spawned child; `0` if the spawn itself failed.
    pub pid: u32,

    /// Wall-clock start, seconds since the Unix epoch.
    pub execution_start: f64,

    /// Wall-clock end, seconds since the Unix epoch. Never less than
    /// `execution_start`.
    pub execution_end: f64,

    /// Child exit code; [`SPAWN_FAILURE_EXIT_STATUS`] on spawn failure, and
    /// `128 + signal` when the child was killed by a signal.
    pub exit_status: i32,

    /// Captured, interleaved stdout+stderr. Ends with [`TIMEOUT_MARKER`]
    /// when termination was timeout-driven.
    pub output: String,
}

impl ProcessResult {
    /// Wall-clock duration of the execution in seconds.
    pub fn duration(&self) -> f64 {
        self.execution_end - self.execution_start
    }
}

/// Descriptor for one external command invocation.
///
/// Built by the caller from [`crate::command::prepare_command`] output plus
/// environment overrides, then handed to the engine. `run` consumes the
/// descriptor, so mutating the timeout after spawning is unrepresentable.
#[derive(Debug, Clone)]
pub struct Process {
    arguments: Arguments,
    extra_environment: BTreeMap<String, String>,
    timeout: f64,
}

impl Process {
    /// Create a descriptor with the default timeout of
    /// [`DEFAULT_TIMEOUT_SECS`] seconds.
    pub fn new(arguments: Arguments, extra_environment: BTreeMap<String, String>) -> Self {
        Self {
            arguments,
            extra_environment,
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the wall-clock timeout in seconds. `0` disables the timeout;
    /// negative and non-finite values are treated as `0`.
    pub fn set_timeout(&mut self, timeout: f64) {
        self.timeout = if timeout.is_finite() { timeout.max(0.0) } else { 0.0 };
    }

    /// The currently configured timeout in seconds.
    pub fn timeout(&self) -> f64 {
        self.timeout
    }

    /// The argv this descriptor will execute.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Register this descriptor with the global engine and return
    /// immediately; `callback` is invoked exactly once, asynchronously, with
    /// the terminal [`ProcessResult`].
    ///
    /// The global engine is built lazily on first use; a failure to build it
    /// is fatal and surfaced here.
    pub fn run<F>(self, callback: F) -> Result<(), EngineError>
    where
        F: FnOnce(ProcessResult) + Send + 'static,
    {
        engine::global()?.run(self, callback);
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (Arguments, BTreeMap<String, String>, f64) {
        (self.arguments, self.extra_environment, self.timeout)
    }
}

/// Current wall-clock time as seconds since the Unix epoch.
pub(crate) fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_descriptor_gets_default_timeout() {
        let p = Process::new(vec!["true".to_string()], BTreeMap::new());
        assert_eq!(p.timeout(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn set_timeout_clamps_invalid_values_to_disabled() {
        let mut p = Process::new(vec!["true".to_string()], BTreeMap::new());

        p.set_timeout(5.5);
        assert_eq!(p.timeout(), 5.5);

        p.set_timeout(-1.0);
        assert_eq!(p.timeout(), 0.0);

        p.set_timeout(f64::INFINITY);
        assert_eq!(p.timeout(), 0.0);
    }

    #[test]
    fn result_duration_is_end_minus_start() {
        let result = ProcessResult {
            pid: 42,
            execution_start: 100.0,
            execution_end: 101.5,
            exit_status: 0,
            output: String::new(),
        };
        assert_eq!(result.duration(), 1.5);
    }
}
