//! CLI command implementations
//!
//! Both commands load configuration, install logging and then run on a
//! multi-threaded tokio runtime.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::backend::{BackendConfig, MemoryEngine, TarantoolConnection, TupleConnection};
use crate::config::Config;
use crate::http_server::{HttpServer, SharedStorage};
use crate::observability::init_logging;
use crate::storage::TupleStorage;

use super::args::{BackendKind, Command};
use super::errors::{CliError, CliResult};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command())
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, backend } => serve(config.as_deref(), backend),
        Command::Check { config } => check(config.as_deref()),
    }
}

fn prepare(config_path: Option<&Path>) -> CliResult<Config> {
    let config = Config::load(config_path)?;
    init_logging(&config.logging)?;
    Ok(config)
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::io("failed to create tokio runtime", e))
}

/// Serve the HTTP API until SIGINT/SIGTERM
pub fn serve(config_path: Option<&Path>, backend: BackendKind) -> CliResult<()> {
    let config = prepare(config_path)?;
    info!(
        backend = ?backend,
        address = %config.backend.address,
        space = %config.backend.space,
        index = %config.backend.index,
        listen = %config.http.socket_addr(),
        "starting kvstore"
    );

    runtime()?.block_on(async move {
        let conn = open_connection(&config.backend, backend).await?;
        let storage: SharedStorage =
            Arc::new(TupleStorage::new(conn).with_timeout(config.backend.call_timeout()));

        HttpServer::new(config.http, storage)
            .start()
            .await
            .map_err(|e| CliError::io("HTTP server failed", e))
    })?;

    info!("kvstore stopped");
    Ok(())
}

/// Connect, authenticate, resolve the space and ping, then report
pub fn check(config_path: Option<&Path>) -> CliResult<()> {
    let config = prepare(config_path)?;

    runtime()?.block_on(async move {
        let conn = TarantoolConnection::connect(&config.backend).await?;
        conn.ping().await?;

        println!(
            "ok: {} at {}, space {:?} (id {}), index {:?} (id {})",
            conn.server_version(),
            config.backend.address,
            config.backend.space,
            conn.space_id(),
            config.backend.index,
            conn.index_id(),
        );
        conn.close();
        Ok::<(), CliError>(())
    })
}

async fn open_connection(
    config: &BackendConfig,
    kind: BackendKind,
) -> CliResult<Arc<dyn TupleConnection>> {
    let conn: Arc<dyn TupleConnection> = match kind {
        BackendKind::Tarantool => {
            let conn = TarantoolConnection::connect(config).await?;
            info!(
                version = %conn.server_version(),
                space_id = conn.space_id(),
                index_id = conn.index_id(),
                "connected to tarantool"
            );
            Arc::new(conn)
        }
        BackendKind::Memory => {
            info!("using in-process memory engine");
            Arc::new(MemoryEngine::new())
        }
    };
    Ok(conn)
}
