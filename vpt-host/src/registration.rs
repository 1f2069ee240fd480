// vpt-host/src/registration.rs
// ============================================================================
// Module: Host Registration & Heartbeat
// Description: Startup self-registration and the periodic heartbeat loop a
//              Host runs against its Server (§4.5 Model, §6.2).
// Purpose: Keep the Server's `{host_id, host_url, devices[]}` record and
//          availability view current without the Host ever being polled.
// Dependencies: vpt-client, vpt-core, tokio, tracing
// ============================================================================

//! ## Overview
//! §4.5: "Host self-registers `{host_id, host_url, devices[]}` with Server at
//! startup" and "heartbeat every 10s, 3 missed = unavailable". Both happen
//! here, both through [`vpt_client::ProxyClient`] — the Host never talks to
//! the Server's storage directly, only its HTTP surface, same as every other
//! cross-process call in this system.

use std::time::Duration;

use vpt_client::HostRegistration;
use vpt_client::ProxyClient;
use vpt_client::RegisteredDevice;

use crate::state::HostState;

/// Builds the registration payload from the Host's configured device
/// inventory (§4.5 Model).
#[must_use]
pub fn registration_payload(state: &HostState) -> HostRegistration {
    HostRegistration {
        host_id: state.host_config.host_id.clone(),
        host_url: state.host_config.host_url.clone(),
        devices: state
            .host_config
            .devices
            .iter()
            .map(|device| RegisteredDevice {
                device_id: device.device_id.clone(),
                model: device.device_model.clone(),
                capabilities: device.capabilities.clone(),
            })
            .collect(),
    }
}

/// Registers once against the Server, logging the outcome. Failure here is
/// not fatal to process startup — the heartbeat loop keeps retrying — but it
/// is surfaced at `warn` so an operator notices a Host that never joined.
pub async fn register_once(state: HostState, client: ProxyClient) {
    let payload = registration_payload(&state);
    let server_url = state.host_config.server_url.clone();
    let result = tokio::task::spawn_blocking(move || client.register_host(&server_url, &payload)).await;
    match result {
        Ok(Ok(())) => tracing::info!(host_id = %state.host_config.host_id, "registered with server"),
        Ok(Err(error)) => tracing::warn!(host_id = %state.host_config.host_id, %error, "registration failed, will retry via heartbeat"),
        Err(join_error) => tracing::error!(%join_error, "registration task panicked"),
    }
}

/// Runs forever, sending a heartbeat every `heartbeat_interval` (§6.6
/// `heartbeat_interval_secs`, default 10s per §4.5). Intended to be spawned
/// as its own tokio task for the lifetime of the process.
pub async fn heartbeat_loop(state: HostState, client: ProxyClient) {
    let interval = state.shared_config.heartbeat_interval();
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        send_heartbeat_once(&state, &client).await;
    }
}

async fn send_heartbeat_once(state: &HostState, client: &ProxyClient) {
    let server_url = state.host_config.server_url.clone();
    let host_id = state.host_config.host_id.clone();
    let client = client.clone();
    let result = tokio::task::spawn_blocking(move || client.send_heartbeat(&server_url, &host_id)).await;
    match result {
        Ok(Ok(())) => tracing::debug!(host_id = %state.host_config.host_id, "heartbeat sent"),
        Ok(Err(error)) => tracing::warn!(host_id = %state.host_config.host_id, %error, "heartbeat failed"),
        Err(join_error) => tracing::error!(%join_error, "heartbeat task panicked"),
    }
}

/// Delay before the very first registration attempt, giving the HTTP server
/// a moment to start listening first.
pub const STARTUP_DELAY: Duration = Duration::from_millis(200);

#[cfg(test)]
mod tests {
    use super::*;
    use vpt_core::core::ids::DeviceId;
    use vpt_core::core::ids::HostId;

    use crate::config::DeviceConfig;
    use crate::config::HostConfig;

    #[test]
    fn registration_payload_mirrors_device_inventory() {
        let shared = vpt_config::VptConfig::default();
        let host_config = HostConfig::new(
            HostId::new("host-1"),
            &shared,
            vec![DeviceConfig { device_id: DeviceId::new("d1"), device_model: "android_mobile".into(), capabilities: vec!["remote".into(), "av".into()] }],
        );
        let store = vpt_store_sqlite::SqliteStore::open_in_memory().unwrap();
        let registry = vpt_controllers::ControllerRegistry::new(vec![]);
        let state = HostState::new(host_config, shared, store, registry);

        let payload = registration_payload(&state);
        assert_eq!(payload.host_id, HostId::new("host-1"));
        assert_eq!(payload.devices.len(), 1);
        assert_eq!(payload.devices[0].capabilities, vec!["remote".to_string(), "av".to_string()]);
    }
}
