// crates/server/src/main.rs
//! claude-scope server binary.
//!
//! Binds the hook-ingestion listener on a fixed local port, starts the
//! session monitor (event dispatch loop + periodic process rescan), and
//! serves the observation routes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use claude_scope_server::{create_app, AppState};
use claude_scope_server::live::monitor::{MonitorConfig, SessionMonitor};

/// Default port for the hook listener.
const DEFAULT_PORT: u16 = 47931;

#[derive(Debug, Parser)]
#[command(name = "claude-scope", version, about = "Local monitor for Claude Code sessions")]
struct Args {
    /// Port to bind on 127.0.0.1.
    #[arg(long, env = "CLAUDE_SCOPE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seconds between full process rescans.
    #[arg(long, default_value_t = 30)]
    scan_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let args = Args::parse();

    let (monitor, events) = SessionMonitor::start(MonitorConfig {
        scan_interval: Duration::from_secs(args.scan_interval.max(1)),
        ..MonitorConfig::default()
    });

    let state: Arc<AppState> = AppState::new(monitor, events);
    let app = create_app(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "claude-scope listening");

    axum::serve(listener, app).await?;

    Ok(())
}
