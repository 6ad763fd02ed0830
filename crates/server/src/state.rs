// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use claude_scope_core::HookEvent;

use crate::live::monitor::SessionMonitor;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// The session engine behind its serialization point.
    pub monitor: Arc<SessionMonitor>,
    /// Ordered delivery channel into the monitor's event loop.
    pub events: mpsc::Sender<HookEvent>,
}

impl AppState {
    pub fn new(monitor: Arc<SessionMonitor>, events: mpsc::Sender<HookEvent>) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            monitor,
            events,
        })
    }

    /// Server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> Arc<AppState> {
        let monitor = SessionMonitor::new();
        let (tx, _rx) = mpsc::channel(16);
        AppState::new(monitor, tx)
    }

    #[tokio::test]
    async fn test_app_state_new() {
        let state = test_state();
        assert!(state.uptime_secs() < 1);
    }
}
