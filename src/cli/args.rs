//! CLI argument definitions using clap
//!
//! Commands:
//! - kvstore serve [--config <path>] [--backend tarantool|memory]
//! - kvstore check [--config <path>]
//!
//! With no subcommand the service runs as `serve`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// JSON key-value service backed by Tarantool
#[derive(Parser, Debug)]
#[command(name = "kvstore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the HTTP API
    Serve {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Storage engine to run against
        #[arg(long, value_enum, default_value_t = BackendKind::Tarantool)]
        backend: BackendKind,
    },

    /// Connect to the engine, resolve the space and ping it
    Check {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Serve {
            config: None,
            backend: BackendKind::Tarantool,
        }
    }
}

/// Storage engine behind the adapter
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Remote Tarantool over IPROTO
    Tarantool,
    /// Process-local engine; data is lost on exit
    Memory,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    pub fn command(self) -> Command {
        self.command.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["kvstore"]).unwrap();
        assert_eq!(cli.command(), Command::default());
    }

    #[test]
    fn test_serve_with_memory_backend() {
        let cli =
            Cli::try_parse_from(["kvstore", "serve", "--backend", "memory", "--config", "kv.json"])
                .unwrap();
        assert_eq!(
            cli.command(),
            Command::Serve {
                config: Some(PathBuf::from("kv.json")),
                backend: BackendKind::Memory,
            }
        );
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(Cli::try_parse_from(["kvstore", "serve", "--backend", "redis"]).is_err());
    }
}
