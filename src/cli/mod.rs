//! CLI module for kvstore
//!
//! Provides command-line interface for:
//! - serve: Run the HTTP API (default)
//! - check: Verify the engine is reachable and the space exists

mod args;
mod commands;
mod errors;

pub use args::{BackendKind, Cli, Command};
pub use commands::{check, run, run_command, serve};
pub use errors::{CliError, CliResult};
