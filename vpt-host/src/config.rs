// vpt-host/src/config.rs
// ============================================================================
// Module: Host Configuration
// Description: The physical-device inventory and driver catalog one Host
//              process owns (§4.4, §4.5 Model).
// Purpose: Describe the `{device_id, model, capabilities}` set a Host
//          registers with the Server, and build the `ControllerRegistry`
//          from it.
// Dependencies: vpt-core, vpt-controllers, vpt-config, serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use vpt_core::core::ids::DeviceId;
use vpt_core::core::ids::HostId;
use vpt_config::VptConfig;

/// One physical device this Host owns, and the model whose driver set it
/// uses (§4.4, §6.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_id: DeviceId,
    pub device_model: String,
    pub capabilities: Vec<String>,
}

/// Everything a Host process needs beyond the shared [`VptConfig`]: its own
/// identity, the address it publishes to the Server, and its device
/// inventory (§4.5 Model).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub host_id: HostId,
    /// Address the Server should use to reach this Host (`host_url`).
    pub host_url: String,
    pub server_url: String,
    pub devices: Vec<DeviceConfig>,
}

impl HostConfig {
    /// Builds a `HostConfig` from the shared `server_url`/`host_url`
    /// defaults plus an explicit device inventory. Production deployments
    /// load the device inventory from the device-model catalog described in
    /// §6.4; tests and examples pass it directly.
    #[must_use]
    pub fn new(host_id: HostId, shared: &VptConfig, devices: Vec<DeviceConfig>) -> Self {
        Self {
            host_id,
            host_url: shared.host_url.clone(),
            server_url: shared.server_url.clone(),
            devices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_shared_config() {
        let shared = VptConfig::default();
        let config = HostConfig::new(
            HostId::new("host-1"),
            &shared,
            vec![DeviceConfig { device_id: DeviceId::new("d1"), device_model: "android_mobile".into(), capabilities: vec!["remote".into()] }],
        );
        assert_eq!(config.host_url, shared.host_url);
        assert_eq!(config.devices.len(), 1);
    }
}
