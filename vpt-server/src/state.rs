// vpt-server/src/state.rs
// ============================================================================
// Module: Server Runtime State
// Description: The shared state every Server HTTP handler reads from: its
//              own persistence (trees/testcases/AI cache), the host
//              registry, task routing, and execution backpressure (§4.5).
// Purpose: One struct `axum::extract::State` hands to every handler.
// Dependencies: vpt-core, vpt-store-sqlite, vpt-client, vpt-config
// ============================================================================

use std::sync::Arc;

use vpt_client::ProxyClient;
use vpt_config::VptConfig;
use vpt_core::navigation::NavigationEngine;
use vpt_store_sqlite::SqliteStore;

use crate::hosts::HostRegistry;
use crate::locks::ExecutionLocks;
use crate::tasks::TaskRegistry;

/// Shared state for one Server process. Cheaply `Clone`; every field is an
/// `Arc` or internally concurrent.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<VptConfig>,
    pub store: Arc<SqliteStore>,
    pub navigation: Arc<NavigationEngine>,
    pub hosts: Arc<HostRegistry>,
    pub tasks: Arc<TaskRegistry>,
    pub locks: Arc<ExecutionLocks>,
    pub client: Arc<ProxyClient>,
}

impl ServerState {
    /// # Errors
    /// Returns [`vpt_client::ClientError`] if the proxy client can't be
    /// constructed (its TLS/connector setup failed).
    pub fn new(config: VptConfig, store: SqliteStore) -> Result<Self, vpt_client::ClientError> {
        let client = ProxyClient::new(config.proxy_timeout())?;
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            navigation: Arc::new(NavigationEngine::new()),
            hosts: Arc::new(HostRegistry::new()),
            tasks: Arc::new(TaskRegistry::new()),
            locks: Arc::new(ExecutionLocks::new()),
            client: Arc::new(client),
        })
    }

    /// The `chrono::Duration` form of `heartbeat_unavailable_after` used by
    /// [`crate::hosts::HostRegistry`] (which, unlike `vpt-config`, speaks
    /// `chrono::Duration` rather than `std::time::Duration`).
    #[must_use]
    pub fn unavailable_after(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.heartbeat_unavailable_after()).unwrap_or(chrono::Duration::seconds(30))
    }
}
