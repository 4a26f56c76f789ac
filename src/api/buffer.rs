//! Buffer Store REST API endpoints.

use crate::{api::AppState, buffer::BufferDelta};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct SetValueRequest {
    pub value: Value,
}

pub fn create_buffer_routes() -> Router<AppState> {
    Router::new()
        .route("/api/buffer", get(list_entries))
        .route("/api/buffer/{key}", get(get_entry).put(set_entry))
}

/// GET /api/buffer
async fn list_entries(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "entries": state.runtime.buffer().snapshot() }))
}

/// GET /api/buffer/{key}
async fn get_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state
        .runtime
        .buffer()
        .entry(&key)
        .map(|entry| {
            Json(json!({
                "key": key,
                "value": entry.value,
                "writer": entry.writer,
                "ts": entry.ts,
            }))
        })
        .ok_or(StatusCode::NOT_FOUND)
}

/// Write a value as this runtime; replicated to connected frontends
///
/// PUT /api/buffer/{key}
/// Body: { "value": ... }
async fn set_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(payload): Json<SetValueRequest>,
) -> Result<Json<BufferDelta>, StatusCode> {
    if key.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(state.runtime.buffer().set(&key, payload.value)))
}
