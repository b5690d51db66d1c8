//! HTTP API scenario tests
//!
//! Requests go through the full router, including middleware, with the
//! in-process engine behind the storage adapter.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use kvstore::backend::{EngineErrorCode, EngineStatus, MemoryEngine, WireValue};
use kvstore::http_server::{HttpServer, HttpServerConfig, SharedStorage};
use kvstore::storage::TupleStorage;

struct TestApp {
    router: Router,
    engine: Arc<MemoryEngine>,
}

impl TestApp {
    fn new() -> Self {
        let engine = Arc::new(MemoryEngine::new());
        let storage: SharedStorage = Arc::new(TupleStorage::new(engine.clone()));
        let router = HttpServer::new(HttpServerConfig::default(), storage).router();
        Self { router, engine }
    }

    async fn send(&self, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn post(&self, body: &str) -> (StatusCode, Value) {
        self.send(Method::POST, "/kv", Some(body)).await
    }

    async fn put(&self, key: &str, body: &str) -> (StatusCode, Value) {
        self.send(Method::PUT, &format!("/kv/{}", key), Some(body)).await
    }

    async fn get(&self, key: &str) -> (StatusCode, Value) {
        self.send(Method::GET, &format!("/kv/{}", key), None).await
    }

    async fn delete(&self, key: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, &format!("/kv/{}", key), None).await
    }
}

// =============================================================================
// Full lifecycle
// =============================================================================

#[tokio::test]
async fn test_record_lifecycle() {
    let app = TestApp::new();

    let (status, body) = app
        .post(r#"{"key":"user:1","value":{"name":"Ann"}}"#)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({"status": "created"}));

    let (status, body) = app.get("user:1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"name": "Ann"}));

    let (status, body) = app
        .put("user:1", r#"{"value":{"name":"Anna","age":30}}"#)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "updated"}));

    let (status, body) = app.get("user:1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"name": "Anna", "age": 30}));

    let (status, body) = app.delete("user:1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "deleted"}));

    let (status, body) = app.get("user:1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!(404));
}

#[tokio::test]
async fn test_update_replaces_without_merging() {
    let app = TestApp::new();
    app.post(r#"{"key":"cfg","value":{"a":1,"b":{"c":2}}}"#).await;

    let (status, _) = app.put("cfg", r#"{"value":{"b":{"d":3}}}"#).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get("cfg").await;
    assert_eq!(body, json!({"b": {"d": 3}}));
}

#[tokio::test]
async fn test_nested_document_is_returned_intact() {
    let app = TestApp::new();
    let value = json!({
        "tags": ["a", "b"],
        "meta": {"score": 1.5, "active": true, "owner": null},
        "count": -7
    });
    let body = json!({"key": "doc", "value": value}).to_string();

    let (status, _) = app.post(&body).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, fetched) = app.get("doc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, value);
}

// =============================================================================
// Conflicts and absent keys
// =============================================================================

#[tokio::test]
async fn test_duplicate_create_conflicts() {
    let app = TestApp::new();

    let (first, _) = app.post(r#"{"key":"x","value":{}}"#).await;
    let (second, body) = app.post(r#"{"key":"x","value":{}}"#).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["code"], json!(409));
}

#[tokio::test]
async fn test_update_of_absent_key_is_not_found() {
    let app = TestApp::new();

    let (status, _) = app.put("ghost", r#"{"value":{"a":1}}"#).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.engine.is_empty());
}

#[tokio::test]
async fn test_delete_of_absent_key_is_not_found() {
    let app = TestApp::new();

    let (status, _) = app.delete("ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_second_delete_is_not_found() {
    let app = TestApp::new();
    app.post(r#"{"key":"k","value":{"v":1}}"#).await;

    let (first, _) = app.delete("k").await;
    let (second, _) = app.delete("k").await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::NOT_FOUND);
}

// =============================================================================
// Request validation
// =============================================================================

#[tokio::test]
async fn test_invalid_create_bodies_are_rejected() {
    let app = TestApp::new();

    let cases = [
        "{not json",
        r#"{"value":{"a":1}}"#,
        r#"{"key":"","value":{"a":1}}"#,
        r#"{"key":"   ","value":{"a":1}}"#,
        r#"{"key":"k"}"#,
        r#"{"key":"k","value":null}"#,
        r#"{"key":"k","value":[1,2]}"#,
        r#"{"key":"k","value":"text"}"#,
    ];

    for body in cases {
        let (status, response) = app.post(body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(response["code"], json!(400));
    }
    assert!(app.engine.is_empty());
}

#[tokio::test]
async fn test_invalid_update_bodies_are_rejected() {
    let app = TestApp::new();
    app.post(r#"{"key":"k","value":{"a":1}}"#).await;

    for body in ["", "{}", r#"{"value":null}"#, r#"{"value":42}"#] {
        let (status, _) = app.put("k", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {:?}", body);
    }

    let (_, stored) = app.get("k").await;
    assert_eq!(stored, json!({"a": 1}));
}

// =============================================================================
// Backend failures
// =============================================================================

#[tokio::test]
async fn test_backend_failure_hides_details() {
    let app = TestApp::new();
    app.engine.fail_next(EngineStatus::error(
        EngineErrorCode::Other(40),
        "Failed to write to disk at /var/lib/tarantool",
    ));

    let (status, body) = app.post(r#"{"key":"k","value":{"a":1}}"#).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("internal server error"));
    assert_eq!(body["code"], json!(500));
}

#[tokio::test]
async fn test_undecodable_record_is_server_error() {
    let app = TestApp::new();
    app.engine
        .put_raw("legacy", vec![WireValue::str("legacy"), WireValue::UInt(7)]);

    let (status, body) = app.get("legacy").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("internal server error"));
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));
}
