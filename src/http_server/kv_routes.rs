//! Key-Value HTTP Routes
//!
//! - `POST   /kv`      create `{"key": ..., "value": {...}}`
//! - `PUT    /kv/:id`  replace `{"value": {...}}`
//! - `GET    /kv/:id`  fetch the stored document
//! - `DELETE /kv/:id`  remove
//!
//! Requests are validated here, before the storage layer is called.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::document::{as_document, Document};
use crate::storage::KvStorage;

use super::errors::{ApiError, ApiResult};

/// Storage shared across handlers
pub type SharedStorage = Arc<dyn KvStorage>;

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    fn new(status: &'static str) -> Json<Self> {
        Json(Self { status })
    }
}

/// Create key-value routes
pub fn kv_routes(storage: SharedStorage) -> Router {
    Router::new()
        .route("/kv", post(create_handler))
        .route(
            "/kv/:id",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .with_state(storage)
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidJson(e.to_string()))
}

fn require_key(key: &str) -> ApiResult<()> {
    if key.trim().is_empty() {
        return Err(ApiError::invalid_request("missing key"));
    }
    Ok(())
}

/// `null` or absent is missing; anything but an object is not a document
fn require_document(value: Option<Value>) -> ApiResult<Document> {
    match value {
        None | Some(Value::Null) => Err(ApiError::invalid_request("missing value")),
        Some(value) => {
            as_document(value).ok_or_else(|| ApiError::invalid_request("value must be a JSON object"))
        }
    }
}

async fn create_handler(
    State(storage): State<SharedStorage>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<StatusResponse>)> {
    let request: CreateRequest = parse_body(&body)?;
    let key = request.key.unwrap_or_default();
    require_key(&key)?;
    let value = require_document(request.value)?;

    storage.insert(&key, value).await?;

    info!(key = %key, "record created");
    Ok((StatusCode::CREATED, StatusResponse::new("created")))
}

async fn update_handler(
    State(storage): State<SharedStorage>,
    Path(key): Path<String>,
    body: Bytes,
) -> ApiResult<Json<StatusResponse>> {
    require_key(&key)?;
    let request: UpdateRequest = parse_body(&body)?;
    let value = require_document(request.value)?;

    storage.update(&key, value).await?;

    info!(key = %key, "record updated");
    Ok(StatusResponse::new("updated"))
}

async fn get_handler(
    State(storage): State<SharedStorage>,
    Path(key): Path<String>,
) -> ApiResult<Json<Document>> {
    require_key(&key)?;
    let document = storage.get(&key).await?;
    Ok(Json(document))
}

async fn delete_handler(
    State(storage): State<SharedStorage>,
    Path(key): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    require_key(&key)?;

    storage.delete(&key).await?;

    info!(key = %key, "record deleted");
    Ok(StatusResponse::new("deleted"))
}
