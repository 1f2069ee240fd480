// vpt-host/src/state.rs
// ============================================================================
// Module: Host Runtime State
// Description: The shared, `Arc`-wrapped state every Host HTTP handler reads
//              from: persistence, navigation cache, controller registry, and
//              the async task table (§2 Host agent, §9).
// Purpose: One struct `axum::extract::State` hands to every handler, so
//          handlers stay thin translations between HTTP and `vpt-core`.
// Dependencies: vpt-core, vpt-store-sqlite, vpt-controllers, vpt-config
// ============================================================================

use std::sync::Arc;

use vpt_config::VptConfig;
use vpt_controllers::ControllerRegistry;
use vpt_core::navigation::NavigationEngine;
use vpt_store_sqlite::SqliteStore;

use crate::config::HostConfig;
use crate::tasks::TaskTable;

/// Shared state for one Host process. Cheaply `Clone` (every field is an
/// `Arc` or already cheap), so axum handlers can clone it per request
/// without contention beyond what each field's own lock provides.
#[derive(Clone)]
pub struct HostState {
    pub host_config: Arc<HostConfig>,
    pub shared_config: Arc<VptConfig>,
    pub store: Arc<SqliteStore>,
    pub navigation: Arc<NavigationEngine>,
    pub registry: Arc<ControllerRegistry>,
    pub tasks: TaskTable,
}

impl HostState {
    #[must_use]
    pub fn new(
        host_config: HostConfig,
        shared_config: VptConfig,
        store: SqliteStore,
        registry: ControllerRegistry,
    ) -> Self {
        for device in &host_config.devices {
            registry.register_device(device.device_id.clone(), device.device_model.clone());
        }
        Self {
            host_config: Arc::new(host_config),
            shared_config: Arc::new(shared_config),
            store: Arc::new(store),
            navigation: Arc::new(NavigationEngine::new()),
            registry: Arc::new(registry),
            tasks: TaskTable::new(),
        }
    }
}
