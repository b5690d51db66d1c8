//! Tuple Storage Adapter
//!
//! Translates document CRUD into tuple engine calls:
//!
//! | operation | engine call              | absent key           |
//! |-----------|--------------------------|----------------------|
//! | insert    | insert `[key, value]`    | n/a (duplicate = 409)|
//! | get       | select by key, limit 1   | empty result         |
//! | update    | update `= value` by key  | empty result         |
//! | delete    | delete by key            | empty result         |
//!
//! Update relies on the engine's update-if-exists, so the existence check
//! and the write are one atomic step. Every call is bounded by
//! `call_timeout`; nothing is retried here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::backend::{BackendError, BackendResult, EngineReply, TupleConnection};
use crate::document::{assign_value, from_tuple, to_tuple, Document};

use super::errors::{ErrorKind, StorageError, StorageResult};
use super::KvStorage;

/// Default bound on a single engine call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(3);

/// `KvStorage` over a tuple engine connection
pub struct TupleStorage<C: ?Sized> {
    conn: Arc<C>,
    call_timeout: Duration,
}

impl<C: TupleConnection + ?Sized> TupleStorage<C> {
    pub fn new(conn: Arc<C>) -> Self {
        Self {
            conn,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Run one engine call under the timeout and check its status
    async fn call<F>(&self, operation: &'static str, key: &str, request: F) -> StorageResult<EngineReply>
    where
        F: Future<Output = BackendResult<EngineReply>> + Send,
    {
        let reply = match timeout(self.call_timeout, request).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(operation, key, error = %e, "engine call failed");
                return Err(e.into());
            }
            Err(_) => {
                let ms = self.call_timeout.as_millis() as u64;
                warn!(operation, key, timeout_ms = ms, "engine call timed out");
                return Err(BackendError::Timeout(ms).into());
            }
        };

        if !reply.status.is_ok() {
            let err = StorageError::from_engine(operation, key, reply.status);
            if err.kind() == ErrorKind::BackendFailure {
                warn!(operation, key, error = %err, "engine rejected request");
            }
            return Err(err);
        }

        Ok(reply)
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.trim().is_empty() {
        return Err(StorageError::invalid_input("key must not be empty"));
    }
    Ok(())
}

#[async_trait]
impl<C: TupleConnection + ?Sized + 'static> KvStorage for TupleStorage<C> {
    async fn insert(&self, key: &str, value: Document) -> StorageResult<()> {
        validate_key(key)?;

        let tuple = to_tuple(key, &value);
        self.call("insert", key, self.conn.insert(tuple)).await?;

        debug!(key, "record inserted");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Document> {
        validate_key(key)?;

        let reply = self.call("select", key, self.conn.select(key)).await?;
        let tuple = reply
            .tuples
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found(key))?;

        from_tuple(tuple).map_err(|e| {
            warn!(key, error = %e, "stored value does not decode");
            StorageError::from(e)
        })
    }

    async fn update(&self, key: &str, value: Document) -> StorageResult<()> {
        validate_key(key)?;

        let ops = vec![assign_value(&value)];
        let reply = self.call("update", key, self.conn.update(key, ops)).await?;
        if reply.tuples.is_empty() {
            return Err(StorageError::not_found(key));
        }

        debug!(key, "record updated");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;

        let reply = self.call("delete", key, self.conn.delete(key)).await?;
        if reply.tuples.is_empty() {
            return Err(StorageError::not_found(key));
        }

        debug!(key, "record deleted");
        Ok(())
    }
}
