// vpt-server/src/server.rs
// ============================================================================
// Module: Server HTTP Server
// Description: Binds and serves the Server's axum router, and spawns the
//              background heartbeat-sweep task that marks a Host (and its
//              devices) unavailable after missed heartbeats (§4.5, §5).
// Purpose: The process-level "run everything" entry point `vpt-cli` calls.
// Dependencies: axum, tokio, tower-http
// ============================================================================

use std::net::SocketAddr;

use tower_http::trace::TraceLayer;

use crate::routes::router;
use crate::state::ServerState;

/// Errors starting or running the Server's HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),
    #[error("failed to bind: {0}")]
    Bind(#[source] std::io::Error),
    #[error("server failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Runs the Server process to completion: binds `server_url`, spawns the
/// heartbeat-sweep loop, and serves until the process is killed (§4.5).
///
/// # Errors
/// Returns [`ServerError`] if the bind address is invalid, the socket can't
/// be bound, or the server loop itself fails.
pub async fn run(state: ServerState) -> Result<(), ServerError> {
    let addr: SocketAddr = state.config.server_url.parse().map_err(|_| ServerError::InvalidAddress(state.config.server_url.clone()))?;

    let sweep_state = state.clone();
    tokio::spawn(async move {
        heartbeat_sweep_loop(sweep_state).await;
    });

    let app = router(state).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app.into_make_service()).await.map_err(ServerError::Serve)
}

/// Runs forever, sweeping stale hosts out of the registry once per
/// `heartbeat_interval` (§4.5 "3 missed heartbeats mark the host and its
/// devices unavailable").
async fn heartbeat_sweep_loop(state: ServerState) {
    let interval = state.config.heartbeat_interval();
    let unavailable_after = state.unavailable_after();
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let stale = state.hosts.sweep_stale(chrono::Utc::now(), unavailable_after);
        for host_id in stale {
            tracing::warn!(%host_id, "host swept as unavailable");
        }
    }
}
