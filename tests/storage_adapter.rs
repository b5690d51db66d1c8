//! Storage adapter properties
//!
//! Exercised against the in-process engine:
//! 1. insert never overwrites
//! 2. update never creates and always replaces
//! 3. failed operations leave state untouched
//! 4. concurrent writers on one key see serializable outcomes

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use kvstore::backend::{EngineErrorCode, EngineStatus, MemoryEngine, WireValue};
use kvstore::document::{as_document, Document};
use kvstore::storage::{ErrorKind, KvStorage, TupleStorage};

fn doc(value: Value) -> Document {
    as_document(value).unwrap()
}

fn storage() -> (Arc<MemoryEngine>, TupleStorage<MemoryEngine>) {
    let engine = Arc::new(MemoryEngine::new());
    let storage = TupleStorage::new(engine.clone());
    (engine, storage)
}

// =============================================================================
// Single-caller properties
// =============================================================================

#[tokio::test]
async fn test_insert_never_overwrites() {
    let (_, storage) = storage();
    storage.insert("k", doc(json!({"v": 1}))).await.unwrap();

    let err = storage.insert("k", doc(json!({"v": 2}))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let stored = storage.get("k").await.unwrap();
    assert_eq!(Value::Object(stored), json!({"v": 1}));
}

#[tokio::test]
async fn test_update_never_creates() {
    let (engine, storage) = storage();

    let err = storage.update("ghost", doc(json!({"a": 1}))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(engine.raw("ghost").is_none());
}

#[tokio::test]
async fn test_update_then_get_returns_exactly_new_value() {
    let (_, storage) = storage();
    storage
        .insert("k", doc(json!({"old": true, "shared": 1})))
        .await
        .unwrap();

    storage.update("k", doc(json!({"shared": 2}))).await.unwrap();

    let stored = storage.get("k").await.unwrap();
    assert_eq!(Value::Object(stored), json!({"shared": 2}));
}

#[tokio::test]
async fn test_stored_tuple_layout() {
    let (engine, storage) = storage();
    storage.insert("k", doc(json!({"n": 5}))).await.unwrap();

    let tuple = engine.raw("k").unwrap();
    assert_eq!(tuple.len(), 2);
    assert_eq!(tuple[0], WireValue::str("k"));
    assert!(matches!(tuple[1], WireValue::Map(_)));
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    let (engine, storage) = storage();
    storage.insert("k", doc(json!({}))).await.unwrap();
    storage.delete("k").await.unwrap();

    assert!(storage.get("k").await.unwrap_err().is_not_found());
    assert!(storage.delete("k").await.unwrap_err().is_not_found());
    assert!(storage
        .update("k", doc(json!({"a": 1})))
        .await
        .unwrap_err()
        .is_not_found());
    assert!(engine.raw("k").is_none());
}

#[tokio::test]
async fn test_failed_update_leaves_state_untouched() {
    let (engine, storage) = storage();
    storage.insert("k", doc(json!({"v": 1}))).await.unwrap();
    let before = engine.raw("k");

    engine.fail_next(EngineStatus::error(
        EngineErrorCode::AccessDenied,
        "Write access to space 'kv' is denied",
    ));
    let err = storage.update("k", doc(json!({"v": 2}))).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BackendFailure);
    assert_eq!(engine.raw("k"), before);
}

#[tokio::test]
async fn test_engine_not_found_code_maps_to_not_found() {
    let (engine, storage) = storage();
    engine.fail_next(EngineStatus::error(
        EngineErrorCode::TupleNotFound,
        "Tuple doesn't exist in index 'primary' in space 'kv'",
    ));

    let err = storage.delete("k").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_slow_engine_times_out_as_backend_failure() {
    let engine = Arc::new(MemoryEngine::with_latency(Duration::from_millis(200)));
    let storage = TupleStorage::new(engine).with_timeout(Duration::from_millis(20));

    let err = storage.get("k").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendFailure);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_have_one_winner() {
    let (_, storage) = storage();
    let storage = Arc::new(storage);

    let mut handles = Vec::new();
    for i in 0..16 {
        let storage = storage.clone();
        handles.push(tokio::spawn(async move {
            storage.insert("hot", doc(json!({ "writer": i }))).await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => created += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::AlreadyExists),
        }
    }
    assert_eq!(created, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_update_racing_delete_never_resurrects() {
    for _ in 0..20 {
        let (engine, storage) = storage();
        let storage = Arc::new(storage);
        storage.insert("k", doc(json!({"v": 0}))).await.unwrap();

        let mut updates = Vec::new();
        for i in 1..=8 {
            let storage = storage.clone();
            updates.push(tokio::spawn(async move {
                storage.update("k", doc(json!({ "v": i }))).await
            }));
        }
        let deleter = {
            let storage = storage.clone();
            tokio::spawn(async move { storage.delete("k").await })
        };

        deleter.await.unwrap().unwrap();
        for handle in updates {
            if let Err(e) = handle.await.unwrap() {
                assert_eq!(e.kind(), ErrorKind::NotFound);
            }
        }

        assert!(engine.is_empty());
        assert!(storage.get("k").await.unwrap_err().is_not_found());
    }
}
