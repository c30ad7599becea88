//! HTTP planning service.
//!
//! - [`api`]: request/response types and route handlers
//! - [`metrics`]: Prometheus request counters and plan latency

pub mod api;
pub mod metrics;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use api::{build_router, AppState};

/// Bind `listen_addr` and serve until Ctrl+C.
pub async fn run(config: Config, listen_addr: &str) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config)?);
    let app = build_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
    }
}
