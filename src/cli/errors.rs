//! CLI-specific error types
//!
//! All CLI errors are fatal: `main` prints them and exits non-zero.

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::observability::LoggingError;

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("backend unavailable: {0}")]
    Backend(#[from] BackendError),

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "KV_CLI_CONFIG_ERROR",
            Self::Logging(_) => "KV_CLI_LOGGING_ERROR",
            Self::Backend(_) => "KV_CLI_BACKEND_ERROR",
            Self::Io { .. } => "KV_CLI_IO_ERROR",
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = CliError::from(ConfigError::Empty("backend.address"));
        assert_eq!(err.code(), "KV_CLI_CONFIG_ERROR");
        assert_eq!(err.to_string(), "backend.address must not be empty");

        let err = CliError::from(BackendError::Disconnected);
        assert_eq!(err.code(), "KV_CLI_BACKEND_ERROR");
        assert!(err.to_string().starts_with("backend unavailable"));
    }
}
