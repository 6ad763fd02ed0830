// crates/server/src/lib.rs
//! claude-scope server library.
//!
//! Monitors long-running Claude Code CLI sessions: ingests hook events on a
//! local HTTP port, correlates each event's ephemeral session id with a
//! scanned OS process, tracks per-session Idle/Working/Waiting state, and
//! serves the published session list to UI collaborators.

pub mod error;
pub mod live;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================
