// vpt-host/src/tasks.rs
// ============================================================================
// Module: Async Task Table
// Description: In-memory tracking for the Host's asynchronous
//              executeTask/status pattern (§4.5, §9 "Coroutine-style
//              orchestration").
// Purpose: Let `POST /host/{kind}/executeTask` return a `task_id`
//          immediately while a worker thread runs the graph, and let
//          `GET /host/{kind}/status` read a monotonically growing log
//          under a mutex (§5 "Ordering guarantees").
// Dependencies: vpt-core, vpt-client, dashmap, uuid
// ============================================================================

//! ## Overview
//! One [`TaskTable`] per Host process (§9 "Global mutable state" only names
//! the navigation cache and the controller registry as process-wide state;
//! this table is the Host-local analogue for in-flight async tasks and is
//! scoped the same way — behind a narrow API with explicit entries, never a
//! raw shared `Vec`).

use std::sync::Arc;
use std::sync::Mutex;

use dashmap::DashMap;
use uuid::Uuid;

use vpt_core::core::execution::CancelHandle;
use vpt_core::core::ids::TaskId;
use vpt_client::LogEntry;
use vpt_client::TaskStatus;

#[derive(Debug)]
struct TaskState {
    is_executing: bool,
    current_step: Option<String>,
    current_position: Option<String>,
    log: Vec<String>,
    done: bool,
    success: Option<bool>,
}

impl TaskState {
    fn new() -> Self {
        Self {
            is_executing: true,
            current_step: None,
            current_position: None,
            log: Vec::new(),
            done: false,
            success: None,
        }
    }
}

struct TaskEntry {
    state: Mutex<TaskState>,
    cancel: CancelHandle,
}

/// The Host's table of in-flight and recently completed async tasks, keyed
/// by `task_id` (§4.5).
#[derive(Clone, Default)]
pub struct TaskTable {
    tasks: Arc<DashMap<TaskId, Arc<TaskEntry>>>,
}

impl TaskTable {
    #[must_use]
    pub fn new() -> Self {
        Self { tasks: Arc::new(DashMap::new()) }
    }

    /// Registers a new task and returns its id plus the cancel handle the
    /// execution worker should check at every node boundary (§4.2
    /// Cancellation).
    #[must_use]
    pub fn create(&self, cancel: CancelHandle) -> TaskId {
        let task_id = TaskId::new(Uuid::new_v4().to_string());
        self.tasks.insert(task_id.clone(), Arc::new(TaskEntry { state: Mutex::new(TaskState::new()), cancel }));
        task_id
    }

    /// Appends one entry to the task's monotonic execution log and updates
    /// its current step label.
    pub fn record_step(&self, task_id: &TaskId, step: impl Into<String>) {
        let step = step.into();
        if let Some(entry) = self.tasks.get(task_id) {
            let mut state = entry.state.lock().expect("task state mutex poisoned");
            state.log.push(step.clone());
            state.current_step = Some(step);
        }
    }

    /// Updates the device's current position (navigation node id) as
    /// reported by `navigation` steps (§6.1 `getStatus` `current_position`).
    pub fn record_position(&self, task_id: &TaskId, position: impl Into<String>) {
        if let Some(entry) = self.tasks.get(task_id) {
            entry.state.lock().expect("task state mutex poisoned").current_position = Some(position.into());
        }
    }

    /// Marks the task terminal. Idempotent: a second call is a no-op beyond
    /// overwriting the recorded outcome, since a task only finishes once in
    /// practice.
    pub fn finish(&self, task_id: &TaskId, success: bool) {
        if let Some(entry) = self.tasks.get(task_id) {
            let mut state = entry.state.lock().expect("task state mutex poisoned");
            state.is_executing = false;
            state.done = true;
            state.success = Some(success);
        }
    }

    /// Requests cancellation; takes effect at the next node boundary
    /// (§4.2 Cancellation).
    #[must_use]
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        if let Some(entry) = self.tasks.get(task_id) {
            entry.cancel.cancel();
            true
        } else {
            false
        }
    }

    /// Reads a status snapshot, restricting `execution_log_delta` to
    /// entries strictly after `since` (§5).
    #[must_use]
    pub fn status_since(&self, task_id: &TaskId, since: u64) -> Option<TaskStatus> {
        let entry = self.tasks.get(task_id)?;
        let state = entry.state.lock().expect("task state mutex poisoned");
        let delta = state
            .log
            .iter()
            .enumerate()
            .skip(since as usize)
            .map(|(index, message)| LogEntry { index: index as u64, message: message.clone() })
            .collect();
        Some(TaskStatus {
            is_executing: state.is_executing,
            current_step: state.current_step.clone(),
            current_position: state.current_position.clone(),
            execution_log_delta: delta,
            done: state.done,
            success: state.success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpt_core::core::execution::ExecutionContext;
    use vpt_core::core::ids::DeviceId;
    use vpt_core::core::ids::HostId;

    #[test]
    fn status_since_restricts_to_entries_after_index() {
        let table = TaskTable::new();
        let ctx = ExecutionContext::new(DeviceId::new("d1"), HostId::new("h1"));
        let task_id = table.create(ctx.cancel_handle());
        table.record_step(&task_id, "step-1");
        table.record_step(&task_id, "step-2");

        let first = table.status_since(&task_id, 0).unwrap();
        assert_eq!(first.execution_log_delta.len(), 2);

        let second = table.status_since(&task_id, 1).unwrap();
        assert_eq!(second.execution_log_delta.len(), 1);
        assert_eq!(second.execution_log_delta[0].message, "step-2");
    }

    #[test]
    fn finish_marks_done_and_not_executing() {
        let table = TaskTable::new();
        let ctx = ExecutionContext::new(DeviceId::new("d1"), HostId::new("h1"));
        let task_id = table.create(ctx.cancel_handle());
        table.finish(&task_id, true);
        let status = table.status_since(&task_id, 0).unwrap();
        assert!(status.done);
        assert!(!status.is_executing);
        assert_eq!(status.success, Some(true));
    }

    #[test]
    fn cancel_unknown_task_returns_false() {
        let table = TaskTable::new();
        assert!(!table.cancel(&TaskId::new("missing")));
    }
}
