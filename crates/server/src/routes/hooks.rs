// crates/server/src/routes/hooks.rs
//! Hook-event ingestion.
//!
//! `POST /hook/{kind}` for kind in {pretooluse, posttooluse, stop,
//! notification}. The body is read raw and parsed here, not through the
//! Json extractor, so any malformed payload maps to a plain 400 with
//! nothing dispatched. Non-POST methods get 405 from axum's method router;
//! unknown kinds get 404. Each response closes its connection: hooks are
//! one-shot calls, there is no keep-alive to win.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use claude_scope_core::{HookEvent, HookEventKind, HookPayload};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/hook/{kind}", post(handle_hook))
}

async fn handle_hook(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    body: String,
) -> ApiResult<Response> {
    let Some(kind) = HookEventKind::from_path_segment(&kind) else {
        return Err(ApiError::UnknownHookKind(kind));
    };

    let payload: HookPayload =
        serde_json::from_str(&body).map_err(|e| ApiError::Protocol(e.to_string()))?;

    let event = HookEvent::from_payload(kind, payload);
    tracing::info!(
        session_id = %event.session_id,
        kind = kind.as_str(),
        tool = event.tool_name.as_deref().unwrap_or(""),
        "hook event received"
    );

    // Forward into the single ordered delivery path. Sender-side ordering
    // is whatever order the hooks arrived in; the single consumer
    // guarantees no reordering after this point.
    state
        .events
        .send(event)
        .await
        .map_err(|_| ApiError::Internal("event channel closed".to_string()))?;

    Ok((
        [(header::CONNECTION, "close")],
        Json(serde_json::json!({ "status": "ok" })),
    )
        .into_response())
}
