//! Authority lease endpoints
//!
//! For frontends that cannot hold a WebSocket open: signals posted here are
//! applied exactly like signals arriving over a transport link.

use crate::{
    api::AppState,
    authority::{LeaseStatus, SignalKind},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SignalRequest {
    pub connection_id: String,
}

pub fn create_authority_routes() -> Router<AppState> {
    Router::new()
        .route("/api/authority", get(get_status))
        .route("/api/authority/{signal}", post(post_signal))
}

/// GET /api/authority
async fn get_status(State(state): State<AppState>) -> Json<LeaseStatus> {
    Json(state.runtime.coordinator().status())
}

/// POST /api/authority/{acquire|heartbeat|release}
/// Body: { "connection_id": "..." }
async fn post_signal(
    State(state): State<AppState>,
    Path(signal): Path<String>,
    Json(payload): Json<SignalRequest>,
) -> Result<Json<LeaseStatus>, StatusCode> {
    let kind = match signal.as_str() {
        "acquire" => SignalKind::Acquire,
        "heartbeat" => SignalKind::Heartbeat,
        "release" => SignalKind::Release,
        _ => return Err(StatusCode::NOT_FOUND),
    };
    if payload.connection_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    state.runtime.coordinator().apply(kind, &payload.connection_id);
    Ok(Json(state.runtime.coordinator().status()))
}
