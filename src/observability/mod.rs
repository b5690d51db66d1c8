//! Observability for the key-value service
//!
//! Installs the `tracing` subscriber. Everything else in the crate logs
//! through `tracing` macros with structured fields.

mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LoggingError};
