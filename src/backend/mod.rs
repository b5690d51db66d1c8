//! # Backend Connection
//!
//! A single logical handle to the remote tuple engine. The handle owns the
//! transport and the request/response framing; it knows nothing about
//! documents, only tuples, keys and engine statuses.
//!
//! Two implementations:
//! - `TarantoolConnection` speaks IPROTO over one multiplexed TCP stream
//! - `MemoryEngine` keeps tuples in-process with the same reply semantics

pub mod auth;
pub mod config;
pub mod connection;
pub mod errors;
pub mod iproto;
pub mod memory;
pub mod value;

use async_trait::async_trait;

pub use config::BackendConfig;
pub use connection::TarantoolConnection;
pub use errors::{BackendError, BackendResult};
pub use iproto::EngineErrorCode;
pub use memory::MemoryEngine;
pub use value::WireValue;

/// A stored tuple, positional
pub type Tuple = Vec<WireValue>;

/// Status the engine attached to a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    /// 0 on success, engine error number otherwise
    pub code: u32,
    pub message: String,
}

impl EngineStatus {
    pub fn ok() -> Self {
        Self {
            code: 0,
            message: String::new(),
        }
    }

    pub fn error(code: EngineErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    pub fn error_code(&self) -> Option<EngineErrorCode> {
        if self.is_ok() {
            None
        } else {
            Some(EngineErrorCode::from_code(self.code))
        }
    }
}

/// Reply to a data request
#[derive(Debug, Clone, PartialEq)]
pub struct EngineReply {
    pub status: EngineStatus,
    /// Tuples returned or affected (empty on error)
    pub tuples: Vec<Tuple>,
}

impl EngineReply {
    pub fn ok(tuples: Vec<Tuple>) -> Self {
        Self {
            status: EngineStatus::ok(),
            tuples,
        }
    }

    pub fn failed(status: EngineStatus) -> Self {
        Self {
            status,
            tuples: Vec::new(),
        }
    }
}

/// Field update applied by the engine in place
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// `"="`: replace the field at a zero-based position
    Assign { field: u32, value: WireValue },
}

impl UpdateOp {
    pub fn to_wire(&self) -> WireValue {
        match self {
            UpdateOp::Assign { field, value } => WireValue::Array(vec![
                WireValue::str("="),
                WireValue::UInt(u64::from(*field)),
                value.clone(),
            ]),
        }
    }
}

/// Tuple primitives over the configured space and its primary index.
///
/// Implementations must allow any number of concurrent calls on a shared
/// reference; callers add no locking of their own.
#[async_trait]
pub trait TupleConnection: Send + Sync {
    /// Exact-match lookup; zero or one tuple
    async fn select(&self, key: &str) -> BackendResult<EngineReply>;

    /// Insert a new tuple; a duplicate key is an engine error status
    async fn insert(&self, tuple: Tuple) -> BackendResult<EngineReply>;

    /// Update-if-exists; an absent key is success with no tuples
    async fn update(&self, key: &str, ops: Vec<UpdateOp>) -> BackendResult<EngineReply>;

    /// Delete; returns the removed tuple, or nothing if absent
    async fn delete(&self, key: &str) -> BackendResult<EngineReply>;

    async fn ping(&self) -> BackendResult<()>;
}
