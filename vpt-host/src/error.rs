// vpt-host/src/error.rs
// ============================================================================
// Module: HTTP Error Mapping
// Description: Maps `CoreError`/`SubmitError` onto the status codes and
//              envelope §6.1 defines ("Every response carries
//              `{success, error?}`").
// Purpose: Keep every handler's error path a single `?` instead of
//          hand-matching status codes per route.
// Dependencies: axum, vpt-core
// ============================================================================

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use serde_json::json;

use vpt_core::core::CoreError;

use crate::execution::SubmitError;

/// Wraps any handler error so `IntoResponse` can pick the right status code
/// per §6.1's table (validation 400, not found 404, busy 409, internal 500).
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        let status = match &error {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::ValidationError(_) | CoreError::UnifiedCacheMissing => StatusCode::BAD_REQUEST,
            CoreError::DeviceBusy(_) => StatusCode::CONFLICT,
            CoreError::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::StepFailed(_) | CoreError::ExecutionAborted(_) | CoreError::Transient(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::CacheMiss => StatusCode::NOT_FOUND,
        };
        Self { status, message: error.to_string() }
    }
}

impl From<SubmitError> for ApiError {
    fn from(error: SubmitError) -> Self {
        match error {
            SubmitError::Core(core) => core.into(),
            SubmitError::MissingTestcaseId(_) | SubmitError::MissingPrompt => Self::new(StatusCode::BAD_REQUEST, error.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "success": false, "error": self.message }))).into_response()
    }
}

/// Wraps a successful handler payload in the `{success: true, ...}` envelope
/// §6.1 requires, flattening the payload's own fields alongside it.
#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    #[must_use]
    pub fn ok(data: T) -> Json<Self> {
        Json(Self { success: true, data })
    }
}
