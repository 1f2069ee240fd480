// vpt-controllers/src/driver.rs
// ============================================================================
// Module: Driver Contract
// Description: The closed set of controller categories and the `Execute`
//              entry point every driver implements.
// Purpose: Let the Controller Registry dispatch by category without runtime
//          type introspection (§4.4, §6.4, REDESIGN FLAGS "no duck typing").
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! A driver is one controller implementation for one [`Category`] on one
//! device model. It declares the commands it supports up front so the
//! registry can build its `{command -> category}` routing table at startup
//! (§4.4) instead of discovering it per call.

use serde_json::Value;

/// The closed set of controller categories (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Remote,
    Av,
    VerificationImage,
    VerificationText,
    VerificationVideo,
    VerificationAudio,
}

impl Category {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Av => "av",
            Self::VerificationImage => "verification.image",
            Self::VerificationText => "verification.text",
            Self::VerificationVideo => "verification.video",
            Self::VerificationAudio => "verification.audio",
        }
    }
}

/// One command a driver declares support for (§6.4).
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub name: String,
    pub param_schema: Value,
    pub timeout_default: std::time::Duration,
}

/// The result of one `Execute` call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DriverOutcome {
    pub success: bool,
    pub evidence: Vec<String>,
    pub error: Option<String>,
}

/// A cooperative cancel signal passed into `Execute` (§5 Cancellation):
/// drivers that support mid-command cancellation poll it; drivers that
/// don't run the in-flight command to completion and return normally.
pub trait CancelSignal {
    fn is_canceled(&self) -> bool;
}

impl CancelSignal for vpt_core::core::execution::CancelHandle {
    fn is_canceled(&self) -> bool {
        self.is_canceled()
    }
}

/// One controller implementation for one category (§6.4).
///
/// `device_models_supported` and `commands` are declared up front so the
/// registry can build its command→category routing table without calling
/// into the driver.
pub trait Driver: Send {
    fn category(&self) -> Category;

    fn device_models_supported(&self) -> Vec<String>;

    fn commands(&self) -> Vec<CommandSpec>;

    /// # Errors
    /// Returns `Err` only for a failure internal to the driver (e.g. the
    /// transport could not be constructed); a failed device-side command is
    /// represented as `Ok(DriverOutcome { success: false, .. })`, not an
    /// `Err`, so the executor can route it through the edge's
    /// `failure_actions` rather than aborting.
    fn execute(&self, command: &str, params: &Value, cancel: &dyn CancelSignal) -> Result<DriverOutcome, String>;
}

/// Extra capture surface exposed by AV drivers only (§6.4).
pub trait AvCapture {
    /// Paths to the most recent `count` segments of roughly `duration_sec`
    /// each, newest last.
    fn recent_segments(&self, count: u32, duration_sec: u32) -> Result<Vec<String>, String>;

    /// Root directory this driver writes capture segments into.
    fn capture_folder(&self) -> String;
}
