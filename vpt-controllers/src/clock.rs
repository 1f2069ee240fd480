// vpt-controllers/src/clock.rs
// ============================================================================
// Module: Controller Clock
// Description: Sleep abstraction for `params.wait_time`, `final_wait_time`,
//              and action-set `timer` handling (§3, §5 Timeouts).
// Purpose: Let drivers and the registry honor post-command settle times
//          without hard-coding `std::thread::sleep`, so tests run instantly.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Every action carries an optional `params.wait_time` in milliseconds: a
//! settle delay observed *after* the command completes, before the next step
//! runs (§3 Action, §5 Timeouts). [`RealClock`] sleeps for real; test doubles
//! record the requested duration instead so suites don't pay for it.

use std::time::Duration;

/// Honors a wait after a command completes.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the calling thread. The registry invokes drivers synchronously
/// (§5: "controllers issuing one command at a time per device"), so a
/// blocking sleep here is the correct backpressure, not a workaround.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl Clock for RealClock {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Extracts `wait_time` (milliseconds) from a command's params, defaulting to
/// no wait when absent or malformed (§3: "a missing timeout means the
/// controller's default").
#[must_use]
pub fn wait_time_from_params(params: &serde_json::Value) -> Duration {
    params
        .get("wait_time")
        .and_then(serde_json::Value::as_u64)
        .map(Duration::from_millis)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::atomic::Ordering;

    #[derive(Default)]
    pub struct RecordingClock {
        total_millis: AtomicU64,
    }

    impl Clock for RecordingClock {
        fn sleep(&self, duration: Duration) {
            self.total_millis.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
        }
    }

    #[test]
    fn wait_time_defaults_to_zero_when_absent() {
        let params = serde_json::json!({"key": "OK"});
        assert_eq!(wait_time_from_params(&params), Duration::ZERO);
    }

    #[test]
    fn wait_time_reads_milliseconds() {
        let params = serde_json::json!({"wait_time": 250});
        assert_eq!(wait_time_from_params(&params), Duration::from_millis(250));
    }

    #[test]
    fn recording_clock_accumulates_requested_sleeps() {
        let clock = RecordingClock::default();
        clock.sleep(Duration::from_millis(100));
        clock.sleep(Duration::from_millis(50));
        assert_eq!(clock.total_millis.load(Ordering::SeqCst), 150);
    }
}
