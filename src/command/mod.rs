// src/command/mod.rs

//! Command and environment preparation.
//!
//! Pure transforms only; nothing in this module touches the OS. They turn a
//! user-supplied command specification into a platform-appropriate argv and
//! assemble the environment block a child will be spawned with.
//!
//! - [`prepare`] handles argv-vs-shell-string preparation, `CreateProcess`
//!   argument escaping, and diagnostic pretty-printing.
//! - [`environment`] merges the ambient environment with caller overrides.

pub mod environment;
pub mod prepare;

pub use environment::{compose_environment, force_locale_override};
pub use prepare::{escape_create_process_arg, prepare_command, pretty_print_arguments, CommandSpec};
