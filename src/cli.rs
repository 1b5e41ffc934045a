// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! The binary runs a single external command through the engine and exits
//! with the command's status. Everything after `--` (or the first positional
//! argument) is the argv; `--shell` runs a free-form string through the
//! platform's command interpreter instead.

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};

/// Command-line arguments for `checkrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "checkrun",
    version,
    about = "Run an external command with a wall-clock timeout and capture its output.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// If omitted, `Checkrun.toml` in the current working directory is used
    /// when present, otherwise built-in defaults apply.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Wall-clock timeout in seconds; 0 disables the timeout.
    ///
    /// Overrides `default_timeout_secs` from the config.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Extra environment variable for the child, as KEY=VALUE. Repeatable.
    ///
    /// Overrides win over the ambient environment on name collision.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Spawn strategy: "direct" (poller pool) or "delegated" (spawn manager).
    #[arg(long, value_name = "STRATEGY")]
    pub strategy: Option<String>,

    /// Run this string through the platform shell (`sh -c` / `cmd /C`)
    /// instead of an argv list.
    #[arg(long, value_name = "CMDLINE", conflicts_with = "command")]
    pub shell: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CHECKRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// The command and its arguments, used verbatim as argv.
    #[arg(value_name = "COMMAND", trailing_var_arg = true)]
    pub command: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Split a `KEY=VALUE` pair as given on the command line.
pub fn parse_env_pair(pair: &str) -> Result<(String, String)> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("invalid --env value '{pair}': expected KEY=VALUE"))?;

    if key.is_empty() {
        return Err(anyhow!("invalid --env value '{pair}': empty variable name"));
    }

    Ok((key.to_string(), value.to_string()))
}
