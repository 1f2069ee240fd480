// vpt-core/src/executor/dispatch.rs
// ============================================================================
// Module: Step Dispatch
// Description: Per-node-kind dispatch to the Controller Registry, action-set
//              retry/failure handling, and StepRecord construction (§4.2.1,
//              §4.2 Retries and failure actions).
// Purpose: Keep crate::executor::execute's traversal loop free of per-kind
//          dispatch detail.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! `action` and `verification` nodes dispatch a single opaque command and
//! report success/failure directly: the graph itself is expected to encode
//! any retry topology as chained nodes reached via the `failure` handle.
//! `navigation` nodes are different: each pre-baked [`Transition`] names an
//! `action_set_id`, and an action set's own `actions`/`retry_actions`/
//! `failure_actions` lists are run here exactly as §4.2 describes, since
//! that structure exists only at the tree/edge level, not in the flattened
//! execution graph.

use chrono::DateTime;
use chrono::Utc;
use serde_json::Value;

use crate::core::error::CoreError;
use crate::core::execution::ExecutionContext;
use crate::core::execution::StepRecord;
use crate::core::execution::Transition;
use crate::core::ids::NodeId;
use crate::core::ids::TeamId;
use crate::core::tree::Action;
use crate::core::tree::ActionSet;
use crate::interfaces::CommandDispatcher;
use crate::interfaces::PersistenceStore;

/// One step's outcome plus the edge handle the executor should follow next.
pub struct DispatchedStep {
    pub record: StepRecord,
    /// `true` for [`CoreError::DeviceUnavailable`] and other unrecoverable
    /// controller errors: the executor must stop traversal rather than
    /// follow the `failure` handle (§4.2 Cancellation / Retries).
    pub aborted: bool,
}

/// Dispatches a single `action` node (§4.2.1).
pub fn dispatch_action<D: CommandDispatcher>(
    dispatcher: &D,
    ctx: &ExecutionContext,
    node_id: &NodeId,
    command: &str,
    params: &Value,
) -> DispatchedStep {
    let started_at = Utc::now();
    let (success, error, evidence_uris, aborted) = run_command(dispatcher, ctx, command, params);
    finish_step(node_id.clone(), command.to_string(), params.clone(), started_at, success, error, evidence_uris, aborted)
}

/// Dispatches a single `verification` node (§4.2.1). A failed verification
/// marks the step failed but never aborts traversal on its own.
pub fn dispatch_verification<D: CommandDispatcher>(
    dispatcher: &D,
    ctx: &ExecutionContext,
    node_id: &NodeId,
    command: &str,
    params: &Value,
) -> DispatchedStep {
    let started_at = Utc::now();
    let (success, error, evidence_uris, aborted) = run_command(dispatcher, ctx, command, params);
    finish_step(node_id.clone(), command.to_string(), params.clone(), started_at, success, error, evidence_uris, aborted)
}

/// Dispatches one pre-baked or freshly computed [`Transition`] for a
/// `navigation` node, resolving its action set against the persistence
/// store and running the §4.2 retry/failure-action sequence.
///
/// # Errors
/// Returns [`CoreError::ValidationError`] (tagged `MalformedGraph`) when the
/// transition names an edge or action set the store no longer has.
pub fn dispatch_navigation<D: CommandDispatcher, S: PersistenceStore>(
    dispatcher: &D,
    store: &S,
    ctx: &ExecutionContext,
    team_id: &TeamId,
    node_id: &NodeId,
    transition: &Transition,
) -> Result<DispatchedStep, CoreError> {
    let started_at = Utc::now();
    let params = serde_json::json!({
        "source_node_id": transition.source_node_id,
        "target_node_id": transition.target_node_id,
    });

    let Some(action_set_id) = &transition.action_set_id else {
        // Virtual ENTER_SUBTREE/EXIT_SUBTREE hop: a tree-boundary crossing
        // with nothing to dispatch.
        return Ok(finish_step(node_id.clone(), "navigate".to_string(), params, started_at, true, None, Vec::new(), false));
    };

    let edges = store.list_edges(team_id, &transition.tree_id, std::slice::from_ref(&transition.source_node_id))?;
    let edge = edges
        .iter()
        .find(|edge| edge.source_node_id == transition.source_node_id && edge.target_node_id == transition.target_node_id)
        .ok_or_else(|| {
            CoreError::ValidationError(format!(
                "MalformedGraph: no edge ({} -> {}) in tree {} for pre-baked transition",
                transition.source_node_id, transition.target_node_id, transition.tree_id
            ))
        })?;
    let action_set = edge.action_set(action_set_id).ok_or_else(|| {
        CoreError::ValidationError(format!(
            "MalformedGraph: action set {action_set_id} not present on edge ({} -> {})",
            transition.source_node_id, transition.target_node_id
        ))
    })?;

    let (success, evidence_uris, aborted) = run_action_set(dispatcher, ctx, action_set);
    let error = (!success && !aborted).then(|| format!("action set {action_set_id} failed"));
    Ok(finish_step(node_id.clone(), "navigate".to_string(), params, started_at, success, error, evidence_uris, aborted))
}

fn finish_step(
    node_id: NodeId,
    command: String,
    params: Value,
    started_at: DateTime<Utc>,
    success: bool,
    error: Option<String>,
    evidence_uris: Vec<String>,
    aborted: bool,
) -> DispatchedStep {
    DispatchedStep {
        record: StepRecord {
            node_id,
            command,
            params,
            started_at,
            ended_at: Utc::now(),
            success,
            error,
            evidence_uris,
        },
        aborted,
    }
}

/// Runs the `actions`/`retry_actions`/`failure_actions` sequence for one
/// action set (§4.2 Retries and failure actions).
fn run_action_set<D: CommandDispatcher>(dispatcher: &D, ctx: &ExecutionContext, set: &ActionSet) -> (bool, Vec<String>, bool) {
    let mut evidence = Vec::new();

    match run_sequence(dispatcher, ctx, &set.actions) {
        SequenceOutcome::Ok(ev) => {
            evidence.extend(ev);
            return (true, evidence, false);
        }
        SequenceOutcome::Aborted(ev) => {
            evidence.extend(ev);
            return (false, evidence, true);
        }
        SequenceOutcome::Failed(ev) => evidence.extend(ev),
    }

    if !set.retry_actions.is_empty() {
        match run_sequence(dispatcher, ctx, &set.retry_actions) {
            SequenceOutcome::Ok(ev) => {
                evidence.extend(ev);
                return (true, evidence, false);
            }
            SequenceOutcome::Aborted(ev) => {
                evidence.extend(ev);
                return (false, evidence, true);
            }
            SequenceOutcome::Failed(ev) => evidence.extend(ev),
        }
    }

    match run_sequence(dispatcher, ctx, &set.failure_actions) {
        SequenceOutcome::Aborted(ev) => {
            evidence.extend(ev);
            (false, evidence, true)
        }
        SequenceOutcome::Ok(ev) | SequenceOutcome::Failed(ev) => {
            evidence.extend(ev);
            (false, evidence, false)
        }
    }
}

enum SequenceOutcome {
    Ok(Vec<String>),
    Failed(Vec<String>),
    Aborted(Vec<String>),
}

/// Runs a list of actions in order, stopping at the first failure.
fn run_sequence<D: CommandDispatcher>(dispatcher: &D, ctx: &ExecutionContext, actions: &[Action]) -> SequenceOutcome {
    let mut evidence = Vec::new();
    for action in actions {
        if ctx.is_canceled() {
            return SequenceOutcome::Aborted(evidence);
        }
        match dispatcher.execute_command(&ctx.device_id, &action.command, &action.params) {
            Ok(outcome) => {
                evidence.extend(outcome.evidence_uris);
                if !outcome.success {
                    return SequenceOutcome::Failed(evidence);
                }
            }
            Err(CoreError::DeviceUnavailable(_) | CoreError::ExecutionAborted(_)) => {
                return SequenceOutcome::Aborted(evidence);
            }
            Err(_) => return SequenceOutcome::Failed(evidence),
        }
    }
    SequenceOutcome::Ok(evidence)
}

/// Dispatches one command directly, for `action`/`verification` nodes that
/// carry no retry/failure lists of their own.
fn run_command<D: CommandDispatcher>(
    dispatcher: &D,
    ctx: &ExecutionContext,
    command: &str,
    params: &Value,
) -> (bool, Option<String>, Vec<String>, bool) {
    match dispatcher.execute_command(&ctx.device_id, command, params) {
        Ok(outcome) => (outcome.success, None, outcome.evidence_uris, false),
        Err(err @ (CoreError::DeviceUnavailable(_) | CoreError::ExecutionAborted(_))) => (false, Some(err.to_string()), Vec::new(), true),
        Err(err) => (false, Some(err.to_string()), Vec::new(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::ActionSetId;
    use crate::core::ids::DeviceId;
    use crate::core::ids::HostId;
    use crate::interfaces::CommandOutcome;

    struct ScriptedDispatcher {
        results: std::cell::RefCell<Vec<Result<CommandOutcome, CoreError>>>,
    }

    impl CommandDispatcher for ScriptedDispatcher {
        fn execute_command(&self, _device_id: &DeviceId, _command: &str, _params: &Value) -> Result<CommandOutcome, CoreError> {
            self.results.borrow_mut().remove(0)
        }
    }

    fn action_set(actions: Vec<&str>, retries: Vec<&str>, failures: Vec<&str>) -> ActionSet {
        let to_actions = |cmds: Vec<&str>| cmds.into_iter().map(|c| Action { command: c.to_string(), params: serde_json::json!({}) }).collect();
        ActionSet {
            id: ActionSetId::new("a"),
            label: "a".to_string(),
            priority: 0,
            timer: None,
            conditions: None,
            actions: to_actions(actions),
            retry_actions: to_actions(retries),
            failure_actions: to_actions(failures),
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(DeviceId::new("d1"), HostId::new("h1"))
    }

    #[test]
    fn retry_recovers_after_initial_failure() {
        let dispatcher = ScriptedDispatcher {
            results: std::cell::RefCell::new(vec![
                Ok(CommandOutcome { success: false, evidence_uris: vec![] }),
                Ok(CommandOutcome { success: true, evidence_uris: vec!["shot.png".to_string()] }),
            ]),
        };
        let set = action_set(vec!["press_ok"], vec!["press_ok_retry"], vec![]);
        let (success, evidence, aborted) = run_action_set(&dispatcher, &ctx(), &set);
        assert!(success);
        assert!(!aborted);
        assert_eq!(evidence, vec!["shot.png".to_string()]);
    }

    #[test]
    fn failure_actions_run_when_retry_also_fails() {
        let dispatcher = ScriptedDispatcher {
            results: std::cell::RefCell::new(vec![
                Ok(CommandOutcome { success: false, evidence_uris: vec![] }),
                Ok(CommandOutcome { success: false, evidence_uris: vec![] }),
                Ok(CommandOutcome { success: true, evidence_uris: vec![] }),
            ]),
        };
        let set = action_set(vec!["press_ok"], vec!["press_ok_retry"], vec!["go_home"]);
        let (success, _, aborted) = run_action_set(&dispatcher, &ctx(), &set);
        assert!(!success);
        assert!(!aborted);
    }

    #[test]
    fn device_unavailable_aborts_instead_of_failing() {
        let dispatcher = ScriptedDispatcher {
            results: std::cell::RefCell::new(vec![Err(CoreError::DeviceUnavailable("offline".to_string()))]),
        };
        let set = action_set(vec!["press_ok"], vec![], vec![]);
        let (success, _, aborted) = run_action_set(&dispatcher, &ctx(), &set);
        assert!(!success);
        assert!(aborted);
    }
}
