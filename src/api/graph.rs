//! Graph management REST API endpoints
//!
//! Saving a graph validates it, stores it as a new version and hot-reloads
//! it into the running evaluation loop.

use crate::{api::AppState, error::GraphError, graph::Graph};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Response for graph save operations
#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub id: String,
    pub version: i64,
    pub message: String,
}

pub fn create_graph_routes() -> Router<AppState> {
    Router::new()
        .route("/api/graph", get(get_graph).put(put_graph))
        .route("/api/graph/snapshot", post(snapshot_graph))
        .route("/api/graphs", get(list_graphs))
        .route("/api/events/upcoming", get(upcoming_events))
}

/// GET /api/graph
async fn get_graph(State(state): State<AppState>) -> Json<Graph> {
    Json(state.registry.current().graph.clone())
}

/// Replace the running graph
///
/// PUT /api/graph
/// Body: { "id": "...", "nodes": [...], "edges": [...] }
async fn put_graph(
    State(state): State<AppState>,
    Json(graph): Json<Graph>,
) -> Result<Json<GraphResponse>, (StatusCode, Json<Value>)> {
    let compiled = state.registry.save(graph).await.map_err(|e| {
        if let Some(invalid) = e.downcast_ref::<GraphError>() {
            tracing::warn!("⚠️ Rejected graph: {}", invalid);
            (StatusCode::BAD_REQUEST, Json(json!({ "error": invalid.to_string() })))
        } else {
            tracing::error!("Failed to save graph: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Failed to save graph" })))
        }
    })?;

    if let Err(e) = state.runtime.load(compiled.clone()) {
        tracing::error!("Failed to hot-reload graph: {}", e);
        return Err((StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": e.to_string() }))));
    }

    tracing::info!("🔥 Hot-reloaded graph '{}' v{}", compiled.graph.id, compiled.graph.version);

    Ok(Json(GraphResponse {
        id: compiled.graph.id.clone(),
        version: compiled.graph.version,
        message: format!(
            "Graph '{}' saved as version {}",
            compiled.graph.id, compiled.graph.version
        ),
    }))
}

/// Persist the runtime's current node properties as a new version
///
/// POST /api/graph/snapshot
async fn snapshot_graph(State(state): State<AppState>) -> Result<Json<GraphResponse>, StatusCode> {
    let snapshot = state.runtime.engine().snapshot().await.map_err(|e| {
        tracing::error!("Failed to snapshot running graph: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    // The running instances already hold this state: store without reloading
    let stored = state.registry.save(snapshot).await.map_err(|e| {
        tracing::error!("Failed to save graph snapshot: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    tracing::info!(
        "📸 Saved snapshot of graph '{}' as v{}",
        stored.graph.id,
        stored.graph.version
    );

    Ok(Json(GraphResponse {
        id: stored.graph.id.clone(),
        version: stored.graph.version,
        message: "Snapshot saved".to_string(),
    }))
}

/// GET /api/graphs
async fn list_graphs(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.registry.storage().list().await {
        Ok(graphs) => Ok(Json(json!({ "graphs": graphs }))),
        Err(e) => {
            tracing::error!("Failed to list graphs: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/events/upcoming
async fn upcoming_events(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.runtime.engine().upcoming_events().await {
        Ok(events) => Ok(Json(json!({ "events": events }))),
        Err(e) => {
            tracing::error!("Failed to query upcoming events: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
