// vpt-host/src/server.rs
// ============================================================================
// Module: Host HTTP Server
// Description: Binds and serves the Host's axum router, and spawns the
//              registration/heartbeat background tasks (§4.5, §6.2).
// Purpose: The process-level "run everything" entry point `vpt-cli` calls.
// Dependencies: axum, tokio, tower-http, vpt-client
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;

use vpt_client::ProxyClient;

use crate::plan_generator::PlanGenerator;
use crate::registration::heartbeat_loop;
use crate::registration::register_once;
use crate::registration::STARTUP_DELAY;
use crate::routes::router;
use crate::state::HostState;

/// Errors starting or running the Host's HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum HostServerError {
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),
    #[error("failed to bind: {0}")]
    Bind(#[source] std::io::Error),
    #[error("server failed: {0}")]
    Serve(#[source] std::io::Error),
    #[error("client setup failed: {0}")]
    Client(#[from] vpt_client::ClientError),
}

/// Runs the Host process to completion: binds `host_url`, spawns the
/// heartbeat loop, and serves until the process is killed (§4.5).
///
/// # Errors
/// Returns [`HostServerError`] if the bind address is invalid, the socket
/// can't be bound, or the server loop itself fails.
pub async fn run(state: HostState, generator: Arc<dyn PlanGenerator>) -> Result<(), HostServerError> {
    let addr: SocketAddr = state
        .host_config
        .host_url
        .parse()
        .map_err(|_| HostServerError::InvalidAddress(state.host_config.host_url.clone()))?;

    let client = ProxyClient::new(state.shared_config.proxy_timeout())?;

    let registration_state = state.clone();
    let registration_client = client.clone();
    tokio::spawn(async move {
        tokio::time::sleep(STARTUP_DELAY).await;
        register_once(registration_state.clone(), registration_client.clone()).await;
        heartbeat_loop(registration_state, registration_client).await;
    });

    let app = router(state, generator).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(HostServerError::Bind)?;
    tracing::info!(%addr, "host listening");
    axum::serve(listener, app.into_make_service()).await.map_err(HostServerError::Serve)
}
