// crates/server/src/routes/mod.rs
//! Route handlers for the claude-scope server.

pub mod health;
pub mod hooks;
pub mod sessions;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router.
///
/// Routes:
/// - POST /hook/{kind} - Hook-event ingestion (pretooluse, posttooluse,
///   stop, notification)
/// - GET /sessions - Published session list snapshot
/// - POST /sessions/{pid}/refresh - On-demand usage/cost refresh
/// - POST /sessions/{pid}/acknowledge - Clear pending-output
/// - POST /sessions/{pid}/reorder - Display-only reordering
/// - GET /health - Health check
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(hooks::router())
        .merge(sessions::router())
        .merge(health::router())
        .with_state(state)
}
