// crates/server/src/routes/sessions.rs
//! Session observation routes for UI collaborators.
//!
//! Everything here goes through the monitor's serialized operations; no
//! route touches engine state directly.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::live::session::SessionRecord;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/{pid}/refresh", post(refresh_session))
        .route("/sessions/{pid}/acknowledge", post(acknowledge_session))
        .route("/sessions/{pid}/reorder", post(reorder_session))
}

/// GET /sessions - Snapshot of the published session list, in display order.
async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionRecord>> {
    Json(state.monitor.snapshot().await)
}

/// POST /sessions/{pid}/refresh - Re-read the session's transcript for
/// usage and cost. Returns immediately; the update lands asynchronously.
async fn refresh_session(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<u32>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.monitor.refresh(pid).await {
        return Err(ApiError::SessionNotFound(pid));
    }
    Ok(Json(serde_json::json!({ "status": "refreshing" })))
}

/// POST /sessions/{pid}/acknowledge - Clear the pending-output flag.
async fn acknowledge_session(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<u32>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.monitor.acknowledge(pid).await {
        return Err(ApiError::SessionNotFound(pid));
    }
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
struct ReorderRequest {
    index: usize,
}

/// POST /sessions/{pid}/reorder - Move a session in the displayed order.
async fn reorder_session(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<u32>,
    Json(request): Json<ReorderRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.monitor.reorder(pid, request.index).await {
        return Err(ApiError::SessionNotFound(pid));
    }
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
