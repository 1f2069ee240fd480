// vpt-server/src/tasks.rs
// ============================================================================
// Module: Proxied Task Routing
// Description: Remembers which Host owns a `task_id` so a later
//              `GET .../status` poll is forwarded to the right place
//              (§4.5 "Server polls GET /host/.../status/{task_id}").
// Purpose: A `task_id` is only unique per-host; the Server needs the
//          `(host_url, kind)` pair alongside it to route a status poll.
// Dependencies: vpt-core, dashmap
// ============================================================================

use dashmap::DashMap;

use vpt_core::core::ids::TaskId;

/// Where a proxied task's status can be polled.
#[derive(Debug, Clone)]
pub struct TaskRoute {
    pub host_url: String,
    pub kind: String,
}

/// Maps an in-flight (or recently finished) `task_id` to the Host that owns
/// it, so the Server's status endpoint knows which Host to poll (§4.5).
#[derive(Default)]
pub struct TaskRegistry {
    routes: DashMap<TaskId, TaskRoute>,
}

impl TaskRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, task_id: TaskId, host_url: String, kind: String) {
        self.routes.insert(task_id, TaskRoute { host_url, kind });
    }

    #[must_use]
    pub fn resolve(&self, task_id: &TaskId) -> Option<TaskRoute> {
        self.routes.get(task_id).map(|entry| entry.clone())
    }

    pub fn forget(&self, task_id: &TaskId) {
        self.routes.remove(task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_resolves_a_route() {
        let registry = TaskRegistry::new();
        registry.record(TaskId::new("t1"), "http://host".to_string(), "script".to_string());
        let route = registry.resolve(&TaskId::new("t1")).unwrap();
        assert_eq!(route.host_url, "http://host");
        assert_eq!(route.kind, "script");
    }

    #[test]
    fn forget_removes_the_route() {
        let registry = TaskRegistry::new();
        registry.record(TaskId::new("t1"), "http://host".to_string(), "script".to_string());
        registry.forget(&TaskId::new("t1"));
        assert!(registry.resolve(&TaskId::new("t1")).is_none());
    }
}
