// vpt-core/src/executor/mod.rs
// ============================================================================
// Module: Plan Execution Engine
// Description: Execute — one traversal of an execution-time graph for both
//              stored testcases and live AI plans (§4.2).
// Purpose: The single canonical path every API surface (Server, Host) calls
//          into to run a graph on a device.
// Dependencies: crate::{core, interfaces, navigation}, chrono
// ============================================================================

//! ## Overview
//! [`execute`] locates the unique `start` node, then repeatedly dispatches
//! the current node and follows the outgoing edge matching its outcome
//! handle, until it reaches a terminal node, runs off the graph, or is
//! canceled. One call, one graph, one device — no intra-graph parallelism
//! (§4.2 Concurrency model).

pub mod dispatch;

use chrono::Utc;

use crate::core::error::CoreError;
use crate::core::execution::ExecGraph;
use crate::core::execution::ExecEdge;
use crate::core::execution::ExecNode;
use crate::core::execution::ExecNodeKind;
use crate::core::execution::ExecutionContext;
use crate::core::execution::ExecutionResult;
use crate::core::execution::ScriptType;
use crate::core::execution::SourceHandle;
use crate::core::execution::StepRecord;
use crate::core::ids::NodeId;
use crate::core::ids::TeamId;
use crate::core::ids::TreeId;
use crate::interfaces::CommandDispatcher;
use crate::interfaces::PersistenceStore;
use crate::navigation::NavigationEngine;

/// `Execute(graph, ctx) → ExecutionResult` (§4.2).
///
/// `team_id`/`root_tree_id` scope `navigation` nodes that carry no
/// pre-baked transitions: they ask `navigation` for a fresh path from
/// `ctx.current_node_id`.
///
/// # Errors
/// Returns [`CoreError::ValidationError`] (tagged `MalformedGraph`) when the
/// graph has no unique `start` node, an edge points at a node id absent
/// from `graph.nodes`, or a pre-baked transition names an edge/action set
/// the store no longer has.
pub fn execute<D, S>(
    dispatcher: &D,
    store: &S,
    navigation: &NavigationEngine,
    team_id: &TeamId,
    root_tree_id: &TreeId,
    script_type: ScriptType,
    script_name: &str,
    graph: &ExecGraph,
    ctx: &mut ExecutionContext,
) -> Result<ExecutionResult, CoreError>
where
    D: CommandDispatcher,
    S: PersistenceStore,
{
    let started_at = Utc::now();
    let start_nodes: Vec<&ExecNode> = graph.nodes.iter().filter(|node| matches!(node.kind, ExecNodeKind::Start)).collect();
    if start_nodes.len() != 1 {
        return Err(CoreError::ValidationError(format!(
            "MalformedGraph: graph must have exactly one start node, found {}",
            start_nodes.len()
        )));
    }
    let start_node = start_nodes[0];

    let mut step_results = Vec::new();
    let mut current_id = start_node.node_id.clone();
    let mut last_handle = SourceHandle::Success;

    loop {
        if ctx.is_canceled() {
            return Ok(finish(script_type, script_name, ctx, started_at, step_results, false, true));
        }

        let node = node_by_id(graph, &current_id).ok_or_else(|| {
            CoreError::ValidationError(format!("MalformedGraph: node {current_id} referenced by an edge but absent from the graph"))
        })?;

        match &node.kind {
            ExecNodeKind::Start => last_handle = SourceHandle::Success,
            ExecNodeKind::Success => {
                return Ok(finish(script_type, script_name, ctx, started_at, step_results, true, false));
            }
            ExecNodeKind::Failure => {
                return Ok(finish(script_type, script_name, ctx, started_at, step_results, false, false));
            }
            ExecNodeKind::Action { command, params } => {
                let step = dispatch::dispatch_action(dispatcher, ctx, &current_id, command, params);
                let success = step.record.success;
                let aborted = step.aborted;
                step_results.push(step.record);
                if aborted {
                    return Ok(finish(script_type, script_name, ctx, started_at, step_results, false, false));
                }
                last_handle = handle_for(success);
            }
            ExecNodeKind::Verification { command, params, .. } => {
                let step = dispatch::dispatch_verification(dispatcher, ctx, &current_id, command, params);
                let success = step.record.success;
                let aborted = step.aborted;
                step_results.push(step.record);
                if aborted {
                    return Ok(finish(script_type, script_name, ctx, started_at, step_results, false, false));
                }
                last_handle = handle_for(success);
            }
            ExecNodeKind::Navigation { target_node_id, transitions } => {
                let path = match transitions {
                    Some(path) => path.clone(),
                    None => navigation.find_path(team_id, root_tree_id, ctx.current_node_id.as_ref(), target_node_id, ctx.action_set_preference.as_ref())?,
                };

                let mut overall_success = true;
                for transition in &path {
                    let step = dispatch::dispatch_navigation(dispatcher, store, ctx, team_id, &current_id, transition)?;
                    let success = step.record.success;
                    let aborted = step.aborted;
                    step_results.push(step.record);
                    if success {
                        ctx.current_node_id = Some(transition.target_node_id.clone());
                    }
                    if aborted {
                        return Ok(finish(script_type, script_name, ctx, started_at, step_results, false, false));
                    }
                    if !success {
                        overall_success = false;
                        break;
                    }
                }
                last_handle = handle_for(overall_success);
            }
            ExecNodeKind::Loop { max_iterations } => {
                let counter = ctx.loop_state.entry(current_id.clone()).or_insert(0);
                if *counter < *max_iterations {
                    *counter += 1;
                    last_handle = SourceHandle::Body;
                } else {
                    last_handle = SourceHandle::Done;
                }
            }
        }

        match outgoing_edge(graph, &current_id, last_handle) {
            Some(edge) => current_id = edge.target_node_id.clone(),
            None => {
                let success = matches!(last_handle, SourceHandle::Success | SourceHandle::Done);
                return Ok(finish(script_type, script_name, ctx, started_at, step_results, success, false));
            }
        }
    }
}

fn handle_for(success: bool) -> SourceHandle {
    if success {
        SourceHandle::Success
    } else {
        SourceHandle::Failure
    }
}

fn node_by_id<'a>(graph: &'a ExecGraph, node_id: &NodeId) -> Option<&'a ExecNode> {
    graph.nodes.iter().find(|node| &node.node_id == node_id)
}

fn outgoing_edge<'a>(graph: &'a ExecGraph, node_id: &NodeId, handle: SourceHandle) -> Option<&'a ExecEdge> {
    graph.edges.iter().find(|edge| &edge.source_node_id == node_id && edge.source_handle == handle)
}

fn finish(
    script_type: ScriptType,
    script_name: &str,
    ctx: &ExecutionContext,
    started_at: chrono::DateTime<Utc>,
    step_results: Vec<StepRecord>,
    success: bool,
    canceled: bool,
) -> ExecutionResult {
    let execution_time_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
    ExecutionResult {
        script_type,
        script_name: script_name.to_string(),
        host: ctx.host_id.clone(),
        device_id: ctx.device_id.clone(),
        success: success && !canceled,
        canceled,
        started_at,
        execution_time_ms,
        report_url: None,
        step_results,
        checked: None,
        check_type: None,
        discard: None,
        discard_type: None,
        discard_comment: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::execution::ExecNode;
    use crate::core::ids::DeviceId;
    use crate::core::ids::HostId;
    use crate::interfaces::CommandOutcome;
    use crate::interfaces::NodePage;
    use crate::core::tree::Edge;
    use crate::core::tree::Node;
    use crate::core::tree::Tree;

    struct FixedDispatcher {
        success: bool,
    }

    impl CommandDispatcher for FixedDispatcher {
        fn execute_command(&self, _device_id: &DeviceId, _command: &str, _params: &serde_json::Value) -> Result<CommandOutcome, CoreError> {
            Ok(CommandOutcome { success: self.success, evidence_uris: vec![] })
        }
    }

    struct NoopStore;

    impl PersistenceStore for NoopStore {
        fn get_tree(&self, _: &TeamId, _: &TreeId) -> Result<Tree, CoreError> { unimplemented!() }
        fn save_tree(&self, _: &Tree) -> Result<(), CoreError> { unimplemented!() }
        fn delete_tree(&self, _: &TeamId, _: &TreeId) -> Result<(), CoreError> { unimplemented!() }
        fn child_trees(&self, _: &TeamId, _: &TreeId, _: &NodeId) -> Result<Vec<Tree>, CoreError> { unimplemented!() }
        fn list_nodes(&self, _: &TeamId, _: &TreeId, _: u32, _: u32) -> Result<NodePage, CoreError> { unimplemented!() }
        fn save_node(&self, _: &TeamId, _: &TreeId, _: &Node) -> Result<(), CoreError> { unimplemented!() }
        fn delete_node(&self, _: &TeamId, _: &TreeId, _: &NodeId) -> Result<(), CoreError> { unimplemented!() }
        fn list_edges(&self, _: &TeamId, _: &TreeId, _: &[NodeId]) -> Result<Vec<Edge>, CoreError> { Ok(vec![]) }
        fn save_edge(&self, _: &TeamId, _: &TreeId, _: &Edge) -> Result<(), CoreError> { unimplemented!() }
        fn delete_edge(&self, _: &TeamId, _: &TreeId, _: &crate::core::ids::EdgeId) -> Result<(), CoreError> { unimplemented!() }
        fn save_testcase(&self, _: &crate::core::testcase::Testcase) -> Result<(), CoreError> { unimplemented!() }
        fn list_testcases(&self, _: &TeamId) -> Result<Vec<crate::core::testcase::Testcase>, CoreError> { unimplemented!() }
        fn get_testcase(&self, _: &TeamId, _: &crate::core::ids::TestcaseId) -> Result<crate::core::testcase::Testcase, CoreError> { unimplemented!() }
        fn delete_testcase(&self, _: &TeamId, _: &crate::core::ids::TestcaseId) -> Result<(), CoreError> { unimplemented!() }
        fn list_executions(&self, _: &TeamId, _: &crate::core::ids::TestcaseId) -> Result<Vec<ExecutionResult>, CoreError> { unimplemented!() }
        fn get_or_create_folder(&self, _: &TeamId, _: &str) -> Result<crate::core::ids::FolderId, CoreError> { unimplemented!() }
        fn get_or_create_tag(&self, _: &TeamId, _: &str) -> Result<crate::core::folder_tag::Tag, CoreError> { unimplemented!() }
        fn list_folders(&self, _: &TeamId) -> Result<Vec<crate::core::folder_tag::Folder>, CoreError> { unimplemented!() }
        fn list_tags(&self, _: &TeamId) -> Result<Vec<crate::core::folder_tag::Tag>, CoreError> { unimplemented!() }
        fn set_executable_tags(&self, _: &TeamId, _: &str, _: &str, _: &[String]) -> Result<(), CoreError> { unimplemented!() }
        fn get_plan_by_fingerprint(&self, _: &TeamId, _: &crate::core::ids::FingerprintId) -> Result<Option<crate::core::plan_cache::CachedPlan>, CoreError> { unimplemented!() }
        fn find_compatible_plans(&self, _: &TeamId, _: &crate::interfaces::PlanCandidateFilter) -> Result<Vec<crate::core::plan_cache::CachedPlan>, CoreError> { unimplemented!() }
        fn upsert_plan(&self, _: &TeamId, _: &crate::core::plan_cache::CachedPlan) -> Result<(), CoreError> { unimplemented!() }
        fn update_plan_metrics(&self, _: &TeamId, _: &crate::core::ids::FingerprintId, _: crate::interfaces::PlanMetricUpdate, _: Option<&str>) -> Result<(), CoreError> { unimplemented!() }
        fn invalidate_plan(&self, _: &TeamId, _: &crate::core::ids::FingerprintId) -> Result<(), CoreError> { unimplemented!() }
        fn maintenance_evict_plans(&self, _: &TeamId) -> Result<u64, CoreError> { unimplemented!() }
        fn insert_script_result(&self, _: &TeamId, _: &ExecutionResult) -> Result<(), CoreError> { unimplemented!() }
        fn update_script_result(&self, _: &TeamId, _: &ExecutionResult) -> Result<(), CoreError> { unimplemented!() }
        fn list_script_results(&self, _: &TeamId, _: &str, _: &str) -> Result<Vec<ExecutionResult>, CoreError> { unimplemented!() }
        fn insert_alert(&self, _: &TeamId, _: &str, _: &str) -> Result<(), CoreError> { unimplemented!() }
        fn update_alert(&self, _: &TeamId, _: i64, _: bool) -> Result<(), CoreError> { unimplemented!() }
    }

    fn start() -> ExecNode {
        ExecNode { node_id: NodeId::new("start"), kind: ExecNodeKind::Start }
    }

    fn terminal(id: &str, success: bool) -> ExecNode {
        ExecNode {
            node_id: NodeId::new(id),
            kind: if success { ExecNodeKind::Success } else { ExecNodeKind::Failure },
        }
    }

    fn action(id: &str) -> ExecNode {
        ExecNode {
            node_id: NodeId::new(id),
            kind: ExecNodeKind::Action { command: "press_key".to_string(), params: serde_json::json!({"key": "OK"}) },
        }
    }

    fn edge(from: &str, to: &str, handle: SourceHandle) -> ExecEdge {
        ExecEdge { source_node_id: NodeId::new(from), target_node_id: NodeId::new(to), source_handle: handle, edge_type: None }
    }

    #[test]
    fn successful_single_action_reaches_success_terminal() {
        let graph = ExecGraph {
            nodes: vec![start(), action("a1"), terminal("ok", true), terminal("fail", false)],
            edges: vec![
                edge("start", "a1", SourceHandle::Success),
                edge("a1", "ok", SourceHandle::Success),
                edge("a1", "fail", SourceHandle::Failure),
            ],
        };
        let dispatcher = FixedDispatcher { success: true };
        let store = NoopStore;
        let navigation = NavigationEngine::new();
        let team = TeamId::new("team1");
        let root = TreeId::new("root");
        let mut ctx = ExecutionContext::new(DeviceId::new("d1"), HostId::new("h1"));

        let result = execute(&dispatcher, &store, &navigation, &team, &root, ScriptType::Testcase, "demo", &graph, &mut ctx).unwrap();
        assert!(result.success);
        assert!(!result.canceled);
        assert_eq!(result.step_results.len(), 1);
    }

    #[test]
    fn failed_action_follows_failure_handle() {
        let graph = ExecGraph {
            nodes: vec![start(), action("a1"), terminal("ok", true), terminal("fail", false)],
            edges: vec![
                edge("start", "a1", SourceHandle::Success),
                edge("a1", "ok", SourceHandle::Success),
                edge("a1", "fail", SourceHandle::Failure),
            ],
        };
        let dispatcher = FixedDispatcher { success: false };
        let store = NoopStore;
        let navigation = NavigationEngine::new();
        let team = TeamId::new("team1");
        let root = TreeId::new("root");
        let mut ctx = ExecutionContext::new(DeviceId::new("d1"), HostId::new("h1"));

        let result = execute(&dispatcher, &store, &navigation, &team, &root, ScriptType::Testcase, "demo", &graph, &mut ctx).unwrap();
        assert!(!result.success);
    }

    #[test]
    fn missing_start_node_is_malformed_graph() {
        let graph = ExecGraph { nodes: vec![terminal("ok", true)], edges: vec![] };
        let dispatcher = FixedDispatcher { success: true };
        let store = NoopStore;
        let navigation = NavigationEngine::new();
        let team = TeamId::new("team1");
        let root = TreeId::new("root");
        let mut ctx = ExecutionContext::new(DeviceId::new("d1"), HostId::new("h1"));

        let err = execute(&dispatcher, &store, &navigation, &team, &root, ScriptType::Testcase, "demo", &graph, &mut ctx).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(msg) if msg.contains("MalformedGraph")));
    }

    #[test]
    fn cancellation_takes_effect_at_node_boundary() {
        let graph = ExecGraph {
            nodes: vec![start(), action("a1"), terminal("ok", true)],
            edges: vec![edge("start", "a1", SourceHandle::Success), edge("a1", "ok", SourceHandle::Success)],
        };
        let dispatcher = FixedDispatcher { success: true };
        let store = NoopStore;
        let navigation = NavigationEngine::new();
        let team = TeamId::new("team1");
        let root = TreeId::new("root");
        let mut ctx = ExecutionContext::new(DeviceId::new("d1"), HostId::new("h1"));
        ctx.cancel();

        let result = execute(&dispatcher, &store, &navigation, &team, &root, ScriptType::Testcase, "demo", &graph, &mut ctx).unwrap();
        assert!(result.canceled);
        assert!(!result.success);
        assert!(result.step_results.is_empty());
    }
}
