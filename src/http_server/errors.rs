//! # HTTP API Errors
//!
//! The only place storage error kinds become status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::storage::{ErrorKind, StorageError};

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Generic body for server-side failures; causes stay in the logs
const INTERNAL_MESSAGE: &str = "internal server error";

/// HTTP API errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body is not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// Request is well-formed JSON but missing or wrong fields
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidJson(_) | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(err) => match err.kind() {
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::AlreadyExists => StatusCode::CONFLICT,
                ErrorKind::BackendFailure => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Message safe to show the client
    pub fn public_message(&self) -> String {
        if self.status_code().is_server_error() {
            INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            let cause = match &self {
                ApiError::Storage(err) => std::error::Error::source(err)
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                _ => String::new(),
            };
            error!(error = %self, cause = %cause, "request failed");
        }

        let body = Json(ErrorResponse {
            error: self.public_message(),
            code: status.as_u16(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::invalid_request("missing key").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StorageError::not_found("k")).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StorageError::already_exists("k")).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(StorageError::invalid_input("empty key")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StorageError::backend("socket closed")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_backend_details_are_not_exposed() {
        let err = ApiError::from(StorageError::backend("engine at 10.0.0.5 refused"));
        assert_eq!(err.public_message(), "internal server error");
    }

    #[test]
    fn test_client_errors_keep_their_message() {
        let err = ApiError::from(StorageError::not_found("user:1"));
        assert!(err.public_message().contains("user:1"));
    }
}
