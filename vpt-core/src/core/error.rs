// vpt-core/src/core/error.rs
// ============================================================================
// Module: Core Error Taxonomy
// Description: The closed set of error kinds shared by every crate boundary.
// Purpose: Give sub-executors and the persistence contract a common vocabulary
//          that the HTTP layer can map to status codes without re-deriving it.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! One enum per documented error kind. Sub-executors never throw across a node
//! boundary: they return `Result<_, CoreError>` and the executor records the
//! kind on the `StepRecord` instead of unwinding. `CacheMiss` is listed here
//! for completeness but callers should log it at `info`, not treat it as a
//! failure.

use thiserror::Error;

/// The shared error taxonomy (§7 of the governing design).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity missing from the persistence layer.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input or a broken invariant.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Pathfinding was called before `BuildUnified` populated the cache.
    #[error("unified graph cache missing for root tree")]
    UnifiedCacheMissing,

    /// Host missed heartbeats, or the device's model declares no driver for
    /// the requested category.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A second execution was requested against a device already executing.
    #[error("device busy: {0}")]
    DeviceBusy(String),

    /// An action or verification step returned not-success; traversal
    /// continues along the `failure` handle.
    #[error("step failed: {0}")]
    StepFailed(String),

    /// Execution was canceled or hit an unrecoverable controller error.
    #[error("execution aborted: {0}")]
    ExecutionAborted(String),

    /// Timeout or 5xx from a dependency; retried at most once by the owning
    /// action set's `retry_actions`.
    #[error("transient error: {0}")]
    Transient(String),

    /// No plan cached for the given prompt and context. Not a failure; log
    /// at `info` and generate a new plan.
    #[error("cache miss")]
    CacheMiss,
}

impl CoreError {
    /// A short, stable label naming the error kind, used by HTTP layers to
    /// select a status code without string-matching the display message.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::ValidationError(_) => "ValidationError",
            Self::UnifiedCacheMissing => "UnifiedCacheMissing",
            Self::DeviceUnavailable(_) => "DeviceUnavailable",
            Self::DeviceBusy(_) => "DeviceBusy",
            Self::StepFailed(_) => "StepFailed",
            Self::ExecutionAborted(_) => "ExecutionAborted",
            Self::Transient(_) => "Transient",
            Self::CacheMiss => "CacheMiss",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
