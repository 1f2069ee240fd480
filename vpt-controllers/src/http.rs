// vpt-controllers/src/http.rs
// ============================================================================
// Module: HTTP Bridge Driver
// Description: A [`Driver`] that forwards `(command, params)` to an external
//              HTTP endpoint and interprets the JSON body as the outcome.
// Purpose: Ground for the device protocols the core deliberately stays out
//          of (ADB, IR, Appium, HDMI capture, §1) whenever the real bridge
//          for a device model happens to speak HTTP.
// Dependencies: reqwest, serde_json
// ============================================================================

//! ## Overview
//! Some device bridges (a network-attached IR blaster, an Appium grid, a
//! vendor's remote-control gateway) expose their own HTTP surface. Rather
//! than teach the registry about each one, [`HttpDriver`] declares one
//! category and a fixed list of commands, and forwards every call as
//! `POST {base_url}/{command}` with `params` as the JSON body. The remote
//! endpoint is expected to answer `{"success": bool, "evidence": [string],
//! "error": string?}`; a malformed or unreachable endpoint is a driver
//! construction/transport error (§4.4 "structural failures"), not a
//! controller-reported step failure.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde_json::Value;

use crate::driver::CancelSignal;
use crate::driver::Category;
use crate::driver::CommandSpec;
use crate::driver::Driver;
use crate::driver::DriverOutcome;

/// Configuration for one HTTP bridge driver instance.
#[derive(Debug, Clone)]
pub struct HttpDriverConfig {
    pub base_url: String,
    pub device_models_supported: Vec<String>,
    pub category: Category,
    pub commands: Vec<CommandSpec>,
    pub timeout: Duration,
}

/// Forwards commands to an HTTP bridge and interprets the JSON response
/// shape as a [`DriverOutcome`].
pub struct HttpDriver {
    config: HttpDriverConfig,
    client: Client,
}

impl HttpDriver {
    /// # Errors
    /// Returns an error string when the underlying HTTP client cannot be
    /// constructed (invalid timeout, TLS backend unavailable, ...).
    pub fn new(config: HttpDriverConfig) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|err| format!("http driver client build failed: {err}"))?;
        Ok(Self { config, client })
    }
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    success: bool,
    #[serde(default)]
    evidence: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

impl Driver for HttpDriver {
    fn category(&self) -> Category {
        self.config.category
    }

    fn device_models_supported(&self) -> Vec<String> {
        self.config.device_models_supported.clone()
    }

    fn commands(&self) -> Vec<CommandSpec> {
        self.config.commands.clone()
    }

    fn execute(&self, command: &str, params: &Value, _cancel: &dyn CancelSignal) -> Result<DriverOutcome, String> {
        let url = format!("{}/{command}", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(params)
            .send()
            .map_err(|err| format!("http bridge request failed: {err}"))?;

        if !response.status().is_success() {
            return Err(format!("http bridge returned status {}", response.status()));
        }

        let body: BridgeResponse = response.json().map_err(|err| format!("http bridge returned malformed body: {err}"))?;
        Ok(DriverOutcome { success: body.success, evidence: body.evidence, error: body.error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_base_url_is_trimmed_for_command_path() {
        let config = HttpDriverConfig {
            base_url: "http://127.0.0.1:9/bridge/".to_string(),
            device_models_supported: vec!["bridge_model".to_string()],
            category: Category::Remote,
            commands: vec![CommandSpec { name: "press_key".to_string(), param_schema: serde_json::json!({}), timeout_default: Duration::from_secs(1) }],
            timeout: Duration::from_millis(50),
        };
        let driver = HttpDriver::new(config).unwrap();
        assert_eq!(driver.category(), Category::Remote);
        assert_eq!(driver.device_models_supported(), vec!["bridge_model".to_string()]);
    }

    #[test]
    fn unreachable_bridge_is_a_transport_error_not_a_panic() {
        let config = HttpDriverConfig {
            base_url: "http://127.0.0.1:1/bridge".to_string(),
            device_models_supported: vec!["bridge_model".to_string()],
            category: Category::Remote,
            commands: vec![],
            timeout: Duration::from_millis(50),
        };
        let driver = HttpDriver::new(config).unwrap();
        struct Never;
        impl CancelSignal for Never {
            fn is_canceled(&self) -> bool {
                false
            }
        }
        let err = driver.execute("press_key", &serde_json::json!({}), &Never).unwrap_err();
        assert!(err.contains("http bridge request failed"));
    }
}
