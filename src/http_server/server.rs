//! # HTTP Server
//!
//! Combines the routers with request logging, a request deadline and panic
//! recovery, and serves them until a shutdown signal arrives.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::http::Request;
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{info, info_span, warn, Level};
use uuid::Uuid;

use super::config::HttpServerConfig;
use super::kv_routes::{kv_routes, SharedStorage};
use super::observability_routes::health_routes;

/// HTTP server for the key-value API
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a server over the given storage
    pub fn new(config: HttpServerConfig, storage: SharedStorage) -> Self {
        let router = Self::build_router(&config, storage);
        Self { config, router }
    }

    /// Build the combined router with all endpoints
    pub fn build_router(config: &HttpServerConfig, storage: SharedStorage) -> Router {
        let trace = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                info_span!(
                    "request",
                    id = %Uuid::new_v4(),
                    method = %request.method(),
                    uri = %request.uri(),
                )
            })
            .on_response(DefaultOnResponse::new().level(Level::INFO));

        let middleware = ServiceBuilder::new()
            .layer(trace)
            .layer(CatchPanicLayer::new())
            .layer(TimeoutLayer::new(config.request_timeout()));

        Router::new()
            .merge(health_routes())
            .merge(kv_routes(storage))
            .layer(middleware)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until SIGINT/SIGTERM
    pub async fn start(self) -> Result<(), std::io::Error> {
        self.start_with_shutdown(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then drain for at most the
    /// configured shutdown timeout
    pub async fn start_with_shutdown<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self.config.socket_addr().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid listen address {}: {}", self.config.socket_addr(), e),
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "HTTP server listening");

        serve_until(listener, self.router, shutdown, self.config.shutdown_timeout()).await
    }
}

/// Serve `router` on `listener`; after `shutdown` resolves, in-flight
/// requests get `grace` to finish
pub async fn serve_until<F>(
    listener: TcpListener,
    router: Router,
    shutdown: F,
    grace: Duration,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stopped_tx, stopped_rx) = tokio::sync::oneshot::channel::<()>();
    let signal = async move {
        shutdown.await;
        let _ = stopped_tx.send(());
    };

    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
    });

    tokio::select! {
        joined = &mut server => return flatten(joined),
        _ = stopped_rx => {
            info!("shutting down, draining in-flight requests");
        }
    }

    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => {
            info!("server stopped cleanly");
            flatten(joined)
        }
        Err(_) => {
            warn!(grace_secs = grace.as_secs(), "drain timed out, dropping remaining connections");
            server.abort();
            Ok(())
        }
    }
}

fn flatten(
    joined: Result<Result<(), std::io::Error>, tokio::task::JoinError>,
) -> Result<(), std::io::Error> {
    joined.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::backend::MemoryEngine;
    use crate::storage::TupleStorage;

    fn storage() -> SharedStorage {
        Arc::new(TupleStorage::new(Arc::new(MemoryEngine::new())))
    }

    #[test]
    fn test_server_with_custom_port() {
        let config = HttpServerConfig::with_port(9090);
        let server = HttpServer::new(config, storage());
        assert_eq!(server.socket_addr(), "0.0.0.0:9090");
    }

    #[tokio::test]
    async fn test_serve_until_stops_on_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let router = HttpServer::new(HttpServerConfig::default(), storage()).router();

        let result = serve_until(
            listener,
            router,
            async {},
            Duration::from_secs(1),
        )
        .await;
        assert!(result.is_ok());
    }
}
