// src/lib.rs

pub mod cli;
pub mod command;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod process;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::oneshot;
use tracing::info;

use crate::cli::{parse_env_pair, CliArgs};
use crate::config::{default_config_path, load_and_validate};

pub use command::{compose_environment, prepare_command, pretty_print_arguments, CommandSpec};
pub use config::EngineConfig;
pub use engine::{CallbackExecutor, ProcessEngine, RuntimeExecutor, SpawnStrategy};
pub use process::{Process, ProcessResult, DEFAULT_TIMEOUT_SECS, TIMEOUT_MARKER};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - engine construction
/// - one command execution through the engine
///
/// Returns the child's exit status so `main` can propagate it.
pub async fn run(args: CliArgs) -> Result<i32> {
    let mut cfg = match &args.config {
        Some(path) => load_and_validate(path)?,
        None => {
            let path = default_config_path();
            if path.exists() {
                load_and_validate(&path)?
            } else {
                EngineConfig::default()
            }
        }
    };

    if let Some(strategy) = &args.strategy {
        cfg.strategy = strategy.parse().map_err(|e: String| anyhow!(e))?;
    }

    let spec = match args.shell {
        Some(line) => CommandSpec::Shell(line),
        None => {
            if args.command.is_empty() {
                bail!("no command given (positional COMMAND or --shell required)");
            }
            CommandSpec::Argv(args.command.clone())
        }
    };

    let mut extra_environment = BTreeMap::new();
    for pair in &args.env {
        let (key, value) = parse_env_pair(pair)?;
        extra_environment.insert(key, value);
    }

    let timeout = args.timeout.unwrap_or(cfg.default_timeout_secs);

    let executor = Arc::new(RuntimeExecutor::current()?);
    let engine = ProcessEngine::new(cfg, executor)?;

    let mut process = Process::new(prepare_command(spec), extra_environment);
    process.set_timeout(timeout);

    let (tx, rx) = oneshot::channel();
    engine.run(process, move |result| {
        let _ = tx.send(result);
    });

    let result = rx
        .await
        .context("engine dropped without delivering a result")?;

    print!("{}", result.output);

    info!(
        pid = result.pid,
        exit_status = result.exit_status,
        duration_secs = result.duration(),
        "command finished"
    );

    Ok(result.exit_status)
}
