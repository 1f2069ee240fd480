// vpt-controllers/src/builtin/remote.rs
// ============================================================================
// Module: Reference Remote Driver
// Description: An in-process `remote` category driver that records the
//              commands it was asked to perform instead of reaching real
//              hardware.
// Purpose: Exercise the Controller Registry and Executor end-to-end without
//          ADB/IR/Appium (§1 Non-goals: "implementing a specific
//          remote-control protocol").
// Dependencies: std::sync
// ============================================================================

//! ## Overview
//! `press_key`, `click_element`, `input_text`, and `tap_coordinates` are the
//! commands real remote bridges in this domain expose. [`LoggingRemoteDriver`]
//! accepts all of them, always succeeds, and appends each call to an
//! in-memory log so tests and the reference Host deployment (no physical
//! device attached) can assert on what the Executor sent it.

use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use crate::driver::CancelSignal;
use crate::driver::Category;
use crate::driver::CommandSpec;
use crate::driver::Driver;
use crate::driver::DriverOutcome;
use crate::params::validate;
use crate::params::FieldKind;
use crate::params::FieldSpec;

/// One recorded remote command, in dispatch order.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub command: String,
    pub params: Value,
}

/// Reference `remote` driver: records calls, never fails.
#[derive(Default)]
pub struct LoggingRemoteDriver {
    log: Mutex<Vec<RemoteCall>>,
}

impl LoggingRemoteDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every command dispatched so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.log.lock().expect("remote driver log lock poisoned").clone()
    }
}

impl Driver for LoggingRemoteDriver {
    fn category(&self) -> Category {
        Category::Remote
    }

    fn device_models_supported(&self) -> Vec<String> {
        vec!["*".to_string()]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec { name: "press_key".to_string(), param_schema: serde_json::json!({"key": "string"}), timeout_default: Duration::from_secs(5) },
            CommandSpec { name: "click_element".to_string(), param_schema: serde_json::json!({"selector": "string"}), timeout_default: Duration::from_secs(5) },
            CommandSpec { name: "input_text".to_string(), param_schema: serde_json::json!({"text": "string"}), timeout_default: Duration::from_secs(5) },
            CommandSpec { name: "tap_coordinates".to_string(), param_schema: serde_json::json!({"x": "number", "y": "number"}), timeout_default: Duration::from_secs(5) },
        ]
    }

    fn execute(&self, command: &str, params: &Value, _cancel: &dyn CancelSignal) -> Result<DriverOutcome, String> {
        let fields: &[FieldSpec] = match command {
            "press_key" => &[FieldSpec { name: "key".to_string(), required: true, kind: FieldKind::String }],
            "click_element" => &[FieldSpec { name: "selector".to_string(), required: true, kind: FieldKind::String }],
            "input_text" => &[FieldSpec { name: "text".to_string(), required: true, kind: FieldKind::String }],
            "tap_coordinates" => &[],
            _ => return Err(format!("LoggingRemoteDriver does not support command \"{command}\"")),
        };
        if let Err(reason) = validate(fields, params) {
            return Ok(DriverOutcome { success: false, evidence: vec![], error: Some(reason) });
        }

        self.log.lock().expect("remote driver log lock poisoned").push(RemoteCall { command: command.to_string(), params: params.clone() });
        Ok(DriverOutcome { success: true, evidence: vec![], error: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Never;
    impl CancelSignal for Never {
        fn is_canceled(&self) -> bool {
            false
        }
    }

    #[test]
    fn records_successful_calls_in_order() {
        let driver = LoggingRemoteDriver::new();
        driver.execute("press_key", &serde_json::json!({"key": "OK"}), &Never).unwrap();
        driver.execute("press_key", &serde_json::json!({"key": "BACK"}), &Never).unwrap();
        let calls = driver.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].params["key"], "OK");
        assert_eq!(calls[1].params["key"], "BACK");
    }

    #[test]
    fn missing_required_param_is_a_failed_outcome_not_an_error() {
        let driver = LoggingRemoteDriver::new();
        let outcome = driver.execute("press_key", &serde_json::json!({}), &Never).unwrap();
        assert!(!outcome.success);
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn unsupported_command_is_an_error() {
        let driver = LoggingRemoteDriver::new();
        assert!(driver.execute("swipe", &serde_json::json!({}), &Never).is_err());
    }
}
