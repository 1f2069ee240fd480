// vpt-client/src/model.rs
// ============================================================================
// Module: Cross-Process Wire Shapes
// Description: JSON shapes exchanged between Server and Host (§4.5, §6.1,
//              §6.2).
// Purpose: Give the proxy client typed request/response bodies instead of
//          raw `serde_json::Value` at every call site.
// Dependencies: vpt-core, serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use vpt_core::core::ids::DeviceId;
use vpt_core::core::ids::HostId;
use vpt_core::core::ids::TaskId;

/// A Host's self-declared device inventory at registration time (§4.5
/// Model: `{host_id, host_url, devices: [{device_id, model, capabilities}]}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub device_id: DeviceId,
    pub model: String,
    pub capabilities: Vec<String>,
}

/// Body of `POST /server/hosts/register` and `POST /host/register` (§4.5,
/// §6.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRegistration {
    pub host_id: HostId,
    pub host_url: String,
    pub devices: Vec<RegisteredDevice>,
}

/// Response of `POST /host/.../executeTask`: the async task handle the
/// Server polls against (§4.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteTaskResponse {
    pub task_id: TaskId,
}

/// One entry in a task's monotonic execution log (§5 "Ordering guarantees").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Strictly increasing index; the Server surfaces only entries after the
    /// client's last observed index (§5).
    pub index: u64,
    pub message: String,
}

/// Body of `GET /host/.../status?task_id=` (§4.5, §6.2). `execution_log`
/// here holds only the delta since the caller's `since` query parameter;
/// the full log is never re-sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub is_executing: bool,
    pub current_step: Option<String>,
    pub current_position: Option<String>,
    pub execution_log_delta: Vec<LogEntry>,
    /// `true` once the task has reached a terminal state and no further
    /// polling is necessary.
    pub done: bool,
    pub success: Option<bool>,
}
