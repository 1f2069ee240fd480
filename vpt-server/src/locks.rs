// vpt-server/src/locks.rs
// ============================================================================
// Module: Execution Backpressure
// Description: Per-device busy tracking and the per-team global execution
//              lock for multi-device fan-out (§5 "Backpressure").
// Purpose: Reject a second execution on a device already executing
//          (`DeviceBusy`, 409) and serialize multi-device submissions per
//          team until all outstanding executions reach a terminal state.
// Dependencies: vpt-core, dashmap
// ============================================================================

use dashmap::DashMap;

use vpt_core::core::ids::DeviceId;
use vpt_core::core::ids::TeamId;
use vpt_core::core::CoreError;

/// Tracks which devices are mid-execution and which teams hold the
/// multi-device fan-out lock (§5).
#[derive(Default)]
pub struct ExecutionLocks {
    busy_devices: DashMap<DeviceId, ()>,
    team_locks: DashMap<TeamId, usize>,
}

/// RAII guard releasing a device's busy flag when an execution finishes or
/// its submission is rejected before starting.
pub struct DeviceGuard<'a> {
    locks: &'a ExecutionLocks,
    device_id: DeviceId,
}

impl Drop for DeviceGuard<'_> {
    fn drop(&mut self) {
        self.locks.busy_devices.remove(&self.device_id);
    }
}

impl ExecutionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `device_id` for the duration of one execution (§7
    /// `DeviceBusy`).
    ///
    /// # Errors
    /// Returns [`CoreError::DeviceBusy`] if the device is already claimed.
    pub fn claim_device(&self, device_id: DeviceId) -> Result<DeviceGuard<'_>, CoreError> {
        if self.busy_devices.insert(device_id.clone(), ()).is_some() {
            self.busy_devices.remove(&device_id);
            return Err(CoreError::DeviceBusy(device_id.to_string()));
        }
        Ok(DeviceGuard { locks: self, device_id })
    }

    /// Begins a multi-device fan-out for `team_id`, incrementing its
    /// outstanding-execution counter. A team with any outstanding executions
    /// rejects a new fan-out submission (§5 "execution lock is global per
    /// team").
    ///
    /// # Errors
    /// Returns [`CoreError::DeviceBusy`] if the team already has a fan-out
    /// in flight.
    pub fn begin_team_fanout(&self, team_id: &TeamId, target_count: usize) -> Result<(), CoreError> {
        let mut entry = self.team_locks.entry(team_id.clone()).or_insert(0);
        if *entry > 0 {
            return Err(CoreError::DeviceBusy(format!("team {team_id} already has an execution in flight")));
        }
        *entry = target_count;
        Ok(())
    }

    /// Marks one target of a team's fan-out as terminal; once every target
    /// has finished, the team's lock is released.
    pub fn complete_team_target(&self, team_id: &TeamId) {
        if let Some(mut entry) = self.team_locks.get_mut(team_id) {
            *entry = entry.saturating_sub(1);
            if *entry == 0 {
                drop(entry);
                self.team_locks.remove(team_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_on_same_device_is_busy() {
        let locks = ExecutionLocks::new();
        let _guard = locks.claim_device(DeviceId::new("d1")).unwrap();
        let error = locks.claim_device(DeviceId::new("d1")).unwrap_err();
        assert_eq!(error.kind(), "DeviceBusy");
    }

    #[test]
    fn dropping_guard_releases_device() {
        let locks = ExecutionLocks::new();
        {
            let _guard = locks.claim_device(DeviceId::new("d1")).unwrap();
        }
        assert!(locks.claim_device(DeviceId::new("d1")).is_ok());
    }

    #[test]
    fn team_fanout_rejects_while_in_flight_then_releases() {
        let locks = ExecutionLocks::new();
        let team = TeamId::new("team-1");
        locks.begin_team_fanout(&team, 2).unwrap();
        assert!(locks.begin_team_fanout(&team, 1).is_err());
        locks.complete_team_target(&team);
        assert!(locks.begin_team_fanout(&team, 1).is_err());
        locks.complete_team_target(&team);
        assert!(locks.begin_team_fanout(&team, 1).is_ok());
    }
}
