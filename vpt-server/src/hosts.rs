// vpt-server/src/hosts.rs
// ============================================================================
// Module: Host Registry
// Description: The Server's `(device_id -> host_url)` map, refreshed on
//              registration and heartbeat, with availability tracking
//              (§4.5 Model, "Heartbeat / failure detection").
// Purpose: Resolve which Host owns a device before every proxied call, and
//          mark a host (and its devices) unavailable after missed
//          heartbeats.
// Dependencies: vpt-core, vpt-client, dashmap, chrono
// ============================================================================

//! ## Overview
//! One [`HostRegistry`] per Server process (§9 "Global mutable state" lists
//! the navigation cache and controller registry as the only Host-side
//! process-wide state; this is the Server-side analogue — a device→host
//! map instead of a device→controller map).

use chrono::DateTime;
use chrono::Utc;
use dashmap::DashMap;

use vpt_client::HostRegistration;
use vpt_core::core::ids::DeviceId;
use vpt_core::core::ids::HostId;

/// One registered Host's last-known state.
#[derive(Debug, Clone)]
struct HostEntry {
    host_url: String,
    devices: Vec<DeviceId>,
    last_heartbeat: DateTime<Utc>,
}

/// The Server's view of which Host owns which device, and whether that Host
/// is still alive (§4.5).
#[derive(Default)]
pub struct HostRegistry {
    hosts: DashMap<HostId, HostEntry>,
    device_to_host: DashMap<DeviceId, HostId>,
}

impl HostRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a registration (or re-registration) from a Host, replacing
    /// its prior device set and resetting its heartbeat clock.
    pub fn register(&self, registration: &HostRegistration, now: DateTime<Utc>) {
        for previous_device in self.hosts.get(&registration.host_id).map(|entry| entry.devices.clone()).unwrap_or_default() {
            self.device_to_host.remove(&previous_device);
        }
        let devices: Vec<DeviceId> = registration.devices.iter().map(|device| device.device_id.clone()).collect();
        for device_id in &devices {
            self.device_to_host.insert(device_id.clone(), registration.host_id.clone());
        }
        self.hosts.insert(registration.host_id.clone(), HostEntry { host_url: registration.host_url.clone(), devices, last_heartbeat: now });
        tracing::info!(host_id = %registration.host_id, device_count = registration.devices.len(), "host registered");
    }

    /// Records a heartbeat, resetting the host's missed-beat clock.
    ///
    /// Returns `false` if the host never registered.
    pub fn heartbeat(&self, host_id: &HostId, now: DateTime<Utc>) -> bool {
        if let Some(mut entry) = self.hosts.get_mut(host_id) {
            entry.last_heartbeat = now;
            true
        } else {
            false
        }
    }

    /// Resolves the `host_url` that owns `device_id`, if that host is still
    /// considered available.
    #[must_use]
    pub fn resolve_device(&self, device_id: &DeviceId, now: DateTime<Utc>, unavailable_after: chrono::Duration) -> Option<String> {
        let host_id = self.device_to_host.get(device_id)?.clone();
        let entry = self.hosts.get(&host_id)?;
        if now - entry.last_heartbeat > unavailable_after {
            return None;
        }
        Some(entry.host_url.clone())
    }

    /// Sweeps every registered host, evicting any whose last heartbeat is
    /// older than `unavailable_after`. Intended to run on a periodic
    /// background tick (§4.5 "3 missed heartbeats mark the host and its
    /// devices unavailable").
    pub fn sweep_stale(&self, now: DateTime<Utc>, unavailable_after: chrono::Duration) -> Vec<HostId> {
        let stale: Vec<HostId> = self
            .hosts
            .iter()
            .filter(|entry| now - entry.last_heartbeat > unavailable_after)
            .map(|entry| entry.key().clone())
            .collect();
        for host_id in &stale {
            if let Some((_, entry)) = self.hosts.remove(host_id) {
                for device_id in entry.devices {
                    self.device_to_host.remove(&device_id);
                }
            }
            tracing::warn!(%host_id, "host marked unavailable after missed heartbeats");
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vpt_client::RegisteredDevice;

    fn registration() -> HostRegistration {
        HostRegistration {
            host_id: HostId::new("host-1"),
            host_url: "http://127.0.0.1:9000".to_string(),
            devices: vec![RegisteredDevice { device_id: DeviceId::new("d1"), model: "android_mobile".into(), capabilities: vec![] }],
        }
    }

    #[test]
    fn resolves_freshly_registered_device() {
        let registry = HostRegistry::new();
        let now = Utc::now();
        registry.register(&registration(), now);
        let resolved = registry.resolve_device(&DeviceId::new("d1"), now, Duration::seconds(30));
        assert_eq!(resolved, Some("http://127.0.0.1:9000".to_string()));
    }

    #[test]
    fn stale_host_resolves_to_none() {
        let registry = HostRegistry::new();
        let now = Utc::now();
        registry.register(&registration(), now);
        let later = now + Duration::seconds(60);
        let resolved = registry.resolve_device(&DeviceId::new("d1"), later, Duration::seconds(30));
        assert_eq!(resolved, None);
    }

    #[test]
    fn heartbeat_extends_availability() {
        let registry = HostRegistry::new();
        let now = Utc::now();
        registry.register(&registration(), now);
        let later = now + Duration::seconds(25);
        assert!(registry.heartbeat(&HostId::new("host-1"), later));
        let even_later = later + Duration::seconds(25);
        let resolved = registry.resolve_device(&DeviceId::new("d1"), even_later, Duration::seconds(30));
        assert_eq!(resolved, Some("http://127.0.0.1:9000".to_string()));
    }

    #[test]
    fn sweep_stale_evicts_and_returns_host_ids() {
        let registry = HostRegistry::new();
        let now = Utc::now();
        registry.register(&registration(), now);
        let later = now + Duration::seconds(60);
        let evicted = registry.sweep_stale(later, Duration::seconds(30));
        assert_eq!(evicted, vec![HostId::new("host-1")]);
        assert_eq!(registry.resolve_device(&DeviceId::new("d1"), later, Duration::seconds(30)), None);
    }
}
