//! # Backend Connection Errors

use thiserror::Error;

/// Result type for backend connection operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Transport and protocol failures talking to the engine.
///
/// Engine-reported statuses on data requests are not errors at this level;
/// they travel back in an `EngineReply` for the adapter to classify.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid greeting: {0}")]
    Greeting(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed (code={code}): {message}")]
    Auth { code: u32, message: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Connection closed")]
    Disconnected,

    #[error("Timed out after {0} ms")]
    Timeout(u64),
}

impl BackendError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }
}
