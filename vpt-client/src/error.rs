// vpt-client/src/error.rs
// ============================================================================
// Module: Client Error Taxonomy
// Description: HTTP-call failure modes mapped onto the shared `CoreError`
//              taxonomy (§7).
// Purpose: Let callers (`vpt-server`, `vpt-host`) convert a failed proxied
//          call into the same error kinds the rest of the system uses.
// Dependencies: vpt-core, reqwest, thiserror
// ============================================================================

use thiserror::Error;

use vpt_core::core::CoreError;

/// Failure modes for one proxied HTTP call.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be sent at all (DNS, connection refused,
    /// TLS handshake) or timed out.
    #[error("request to {url} failed: {source}")]
    Transport { url: String, source: reqwest::Error },

    /// The request timed out against the configured deadline (§4.5: default
    /// 30s for control calls).
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The peer responded with a non-2xx status.
    #[error("request to {url} returned status {status}: {body}")]
    Status { url: String, status: u16, body: String },

    /// The response body was not valid JSON or did not match the expected shape.
    #[error("failed to decode response from {url}: {source}")]
    Decode { url: String, source: serde_json::Error },
}

impl ClientError {
    /// Maps a transport/status failure onto the §7 taxonomy the rest of the
    /// system speaks. Connection failures and 5xx responses are `Transient`
    /// (retryable once by the caller); 404s are `NotFound`; everything else
    /// that isn't a clean mapping becomes `DeviceUnavailable`, since every
    /// caller of this client is ultimately trying to reach a host that owns
    /// a device.
    #[must_use]
    pub fn to_core_error(&self) -> CoreError {
        match self {
            Self::Transport { url, .. } => CoreError::DeviceUnavailable(format!("unreachable: {url}")),
            Self::Timeout { url } => CoreError::Transient(format!("timeout calling {url}")),
            Self::Status { url, status, body } if *status == 404 => CoreError::NotFound(format!("{url}: {body}")),
            Self::Status { url, status, body } if *status == 409 => CoreError::DeviceBusy(format!("{url}: {body}")),
            Self::Status { url, status, body } if *status >= 500 => CoreError::Transient(format!("{url} returned {status}: {body}")),
            Self::Status { url, status, body } => CoreError::ValidationError(format!("{url} returned {status}: {body}")),
            Self::Decode { url, source } => CoreError::ValidationError(format!("malformed response from {url}: {source}")),
        }
    }
}
