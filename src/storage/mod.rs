//! # Storage
//!
//! Document CRUD over a tuple engine. `KvStorage` is the capability the
//! HTTP layer depends on; `TupleStorage` implements it on top of any
//! `TupleConnection`.
//!
//! Invariants:
//! - insert never overwrites an existing record
//! - update never creates a record, and replaces the whole value
//! - a failed update or delete leaves the prior state untouched
//! - every failure is exactly one `ErrorKind`

pub mod adapter;
pub mod errors;

use async_trait::async_trait;

use crate::document::Document;

pub use adapter::TupleStorage;
pub use errors::{classify, ErrorKind, StorageError, StorageResult};

/// Single-key document store
#[async_trait]
pub trait KvStorage: Send + Sync {
    /// Create a record; fails with `AlreadyExists` if the key is taken
    async fn insert(&self, key: &str, value: Document) -> StorageResult<()>;

    /// Fetch a record's value; fails with `NotFound` if absent
    async fn get(&self, key: &str) -> StorageResult<Document>;

    /// Replace a record's value; fails with `NotFound` if absent
    async fn update(&self, key: &str, value: Document) -> StorageResult<()>;

    /// Remove a record; fails with `NotFound` if absent
    async fn delete(&self, key: &str) -> StorageResult<()>;
}
