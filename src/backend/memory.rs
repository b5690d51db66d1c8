//! In-memory tuple engine
//!
//! Mirrors the engine's reply semantics for the `[key, ...]` layout so the
//! storage adapter can be exercised without a server: duplicate inserts
//! come back as `TupleFound`, updates and deletes of absent keys succeed
//! with an empty tuple set.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::errors::BackendResult;
use super::iproto::EngineErrorCode;
use super::value::WireValue;
use super::{EngineReply, EngineStatus, Tuple, TupleConnection, UpdateOp};

/// In-process tuple store keyed by the first field
#[derive(Default)]
pub struct MemoryEngine {
    tuples: RwLock<HashMap<String, Tuple>>,
    /// Status returned by the next data request instead of executing it
    injected: RwLock<Option<EngineStatus>>,
    latency: Option<Duration>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, for exercising caller timeouts
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Make the next data request fail with this status
    pub fn fail_next(&self, status: EngineStatus) {
        *self.injected.write() = Some(status);
    }

    /// Store a tuple verbatim, bypassing every check
    pub fn put_raw(&self, key: impl Into<String>, tuple: Tuple) {
        self.tuples.write().insert(key.into(), tuple);
    }

    /// Raw tuple currently stored under `key`
    pub fn raw(&self, key: &str) -> Option<Tuple> {
        self.tuples.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.tuples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn enter(&self) -> Option<EngineReply> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.injected.write().take().map(EngineReply::failed)
    }
}

fn apply(tuple: &mut Tuple, op: &UpdateOp) -> Result<(), EngineStatus> {
    match op {
        UpdateOp::Assign { field, value } => {
            let pos = *field as usize;
            if pos == 0 {
                return Err(EngineStatus::error(
                    EngineErrorCode::Other(105),
                    "Attempt to modify a tuple field which is part of primary index",
                ));
            }
            if pos < tuple.len() {
                tuple[pos] = value.clone();
            } else if pos == tuple.len() {
                tuple.push(value.clone());
            } else {
                return Err(EngineStatus::error(
                    EngineErrorCode::Other(39),
                    format!("Field {} was not found in the tuple", pos),
                ));
            }
            Ok(())
        }
    }
}

#[async_trait]
impl TupleConnection for MemoryEngine {
    async fn select(&self, key: &str) -> BackendResult<EngineReply> {
        if let Some(reply) = self.enter().await {
            return Ok(reply);
        }
        let tuples = self.tuples.read().get(key).cloned().into_iter().collect();
        Ok(EngineReply::ok(tuples))
    }

    async fn insert(&self, tuple: Tuple) -> BackendResult<EngineReply> {
        if let Some(reply) = self.enter().await {
            return Ok(reply);
        }
        let key = match tuple.first() {
            Some(WireValue::Str(key)) => key.clone(),
            _ => {
                return Ok(EngineReply::failed(EngineStatus::error(
                    EngineErrorCode::Other(23),
                    "Tuple field 1 type does not match one required by operation",
                )))
            }
        };

        let mut tuples = self.tuples.write();
        if tuples.contains_key(&key) {
            return Ok(EngineReply::failed(EngineStatus::error(
                EngineErrorCode::TupleFound,
                "Duplicate key exists in unique index \"primary\" in space \"kv\"",
            )));
        }
        tuples.insert(key, tuple.clone());
        Ok(EngineReply::ok(vec![tuple]))
    }

    async fn update(&self, key: &str, ops: Vec<UpdateOp>) -> BackendResult<EngineReply> {
        if let Some(reply) = self.enter().await {
            return Ok(reply);
        }
        let mut tuples = self.tuples.write();
        let Some(current) = tuples.get(key) else {
            return Ok(EngineReply::ok(Vec::new()));
        };

        let mut updated = current.clone();
        for op in &ops {
            if let Err(status) = apply(&mut updated, op) {
                return Ok(EngineReply::failed(status));
            }
        }
        tuples.insert(key.to_string(), updated.clone());
        Ok(EngineReply::ok(vec![updated]))
    }

    async fn delete(&self, key: &str) -> BackendResult<EngineReply> {
        if let Some(reply) = self.enter().await {
            return Ok(reply);
        }
        let removed = self.tuples.write().remove(key);
        Ok(EngineReply::ok(removed.into_iter().collect()))
    }

    async fn ping(&self) -> BackendResult<()> {
        Ok(())
    }
}
