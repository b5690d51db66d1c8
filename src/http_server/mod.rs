//! # HTTP Server Module
//!
//! JSON front end for the key-value store. Routes validate requests,
//! call the storage layer and map its error kinds to status codes.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/kv`, `/kv/:id` - Create, read, replace and delete records

pub mod config;
pub mod errors;
pub mod kv_routes;
pub mod observability_routes;
pub mod server;

pub use config::HttpServerConfig;
pub use errors::{ApiError, ApiResult, ErrorResponse};
pub use kv_routes::{kv_routes, SharedStorage};
pub use observability_routes::health_routes;
pub use server::{serve_until, shutdown_signal, HttpServer};
