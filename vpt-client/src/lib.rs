// vpt-client/src/lib.rs
// ============================================================================
// Module: VirtualPyTest Proxy Client
// Description: The Server's blocking HTTP client to a Host, and the Host's
//              client back to the Server for registration/heartbeat (§4.5).
// Purpose: One small, testable surface for every cross-process HTTP call the
//          orchestration layer makes, so `vpt-server`/`vpt-host` never touch
//          `reqwest` directly.
// Dependencies: vpt-core, reqwest (blocking), serde_json
// ============================================================================

//! ## Overview
//! `vpt-client` does not know about axum routing tables; it knows how to
//! turn a `(base_url, path)` pair plus team/user context into a timed-out
//! HTTP call and a typed result. `vpt-server` uses it to proxy
//! `/server/X` → `/host/X` calls (§4.5 "Proxying rules") and to poll a host's
//! async task status; `vpt-host` uses the same client to register itself and
//! send heartbeats to the Server.

pub mod client;
pub mod error;
pub mod model;

pub use client::ProxyClient;
pub use error::ClientError;
pub use model::ExecuteTaskResponse;
pub use model::HostRegistration;
pub use model::LogEntry;
pub use model::RegisteredDevice;
pub use model::TaskStatus;
