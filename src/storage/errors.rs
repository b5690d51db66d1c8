//! Storage error taxonomy
//!
//! Kinds:
//! - INVALID_INPUT: malformed request data, never reaches the engine
//! - NOT_FOUND: no record for the key
//! - ALREADY_EXISTS: record already present on insert
//! - BACKEND_FAILURE: transport error, timeout, unrecognized engine status,
//!   or a stored value that does not decode
//!
//! `classify` is the single table from engine statuses to kinds. It reads
//! only error numbers, never message text.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::backend::{BackendError, EngineErrorCode, EngineStatus};
use crate::document::CodecError;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Stable error vocabulary of the storage layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    AlreadyExists,
    BackendFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::BackendFailure => "BACKEND_FAILURE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Map an engine status to an error kind
pub fn classify(status: &EngineStatus) -> ErrorKind {
    match status.error_code() {
        Some(EngineErrorCode::TupleFound) => ErrorKind::AlreadyExists,
        Some(EngineErrorCode::TupleNotFound) => ErrorKind::NotFound,
        _ => ErrorKind::BackendFailure,
    }
}

/// Engine-reported failure kept as the diagnostic cause
#[derive(Debug, Error)]
#[error("engine {operation} error (code={code}): {message}")]
pub struct EngineFailure {
    pub operation: &'static str,
    pub code: u32,
    pub message: String,
}

/// Storage error: a kind plus an optional underlying cause
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct StorageError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn not_found(key: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("key '{}' not found", key))
    }

    pub fn already_exists(key: &str) -> Self {
        Self::new(ErrorKind::AlreadyExists, format!("key '{}' already exists", key))
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendFailure, message)
    }

    /// Classify a nonzero engine status for an operation on `key`
    pub fn from_engine(operation: &'static str, key: &str, status: EngineStatus) -> Self {
        let kind = classify(&status);
        let message = match kind {
            ErrorKind::AlreadyExists => format!("key '{}' already exists", key),
            ErrorKind::NotFound => format!("key '{}' not found", key),
            _ => format!("{} of key '{}' failed", operation, key),
        };
        Self::new(kind, message).with_source(EngineFailure {
            operation,
            code: status.code,
            message: status.message,
        })
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl From<BackendError> for StorageError {
    fn from(err: BackendError) -> Self {
        StorageError::backend("engine request failed").with_source(err)
    }
}

impl From<CodecError> for StorageError {
    fn from(err: CodecError) -> Self {
        StorageError::backend("stored value is not a document").with_source(err)
    }
}
