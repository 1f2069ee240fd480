// vpt-core/src/core/execution.rs
// ============================================================================
// Module: Execution-Time Data Model
// Description: The graph shape the executor traverses, plus the result and
//              step records it produces (§4.2, §4.2.1, §6.3).
// Purpose: Give crate::executor a concrete, serializable graph representation
//          independent of how that graph was produced (stored testcase or a
//          live AI plan).
// Dependencies: crate::core::ids, serde, serde_json, chrono
// ============================================================================

//! ## Overview
//! `ExecGraph` is deliberately flatter than [`crate::core::tree::Tree`]: by
//! the time a graph reaches the executor, navigation nodes already carry
//! pre-fetched transitions (or don't, in which case the executor asks the
//! navigation engine at traversal time), and there is no longer a notion of
//! "which physical tree this came from". Both stored testcases and
//! AI-generated plans are converted to this shape before execution.

use std::collections::HashMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::ids::ActionSetId;
use crate::core::ids::DeviceId;
use crate::core::ids::HostId;
use crate::core::ids::NodeId;
use crate::core::ids::TreeId;

// ============================================================================
// SECTION: Execution-Time Graph
// ============================================================================

/// A graph in its execution-ready shape: `{nodes: [...], edges: [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecGraph {
    pub nodes: Vec<ExecNode>,
    pub edges: Vec<ExecEdge>,
}

/// One node in the execution-time graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecNode {
    pub node_id: NodeId,
    #[serde(flatten)]
    pub kind: ExecNodeKind,
}

/// The dispatch-relevant payload of an execution-time node (§4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecNodeKind {
    Start,
    Success,
    Failure,
    Action {
        command: String,
        params: Value,
    },
    Verification {
        verification_type: String,
        command: String,
        params: Value,
    },
    Navigation {
        target_node_id: NodeId,
        /// Pre-fetched transitions, when known at graph-build time, to avoid
        /// a runtime navigation-engine lookup.
        transitions: Option<Vec<Transition>>,
    },
    Loop {
        max_iterations: u32,
    },
}

/// One entry in a computed navigation path (§4.1, GLOSSARY). `action_set_id`
/// is `None` for the virtual `ENTER_SUBTREE`/`EXIT_SUBTREE` hops the unified
/// graph adds at tree boundaries (§3) — those cross a tree seam rather than
/// dispatching a controller command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    pub action_set_id: Option<ActionSetId>,
    pub direction: TransitionDirection,
    /// Tree the underlying edge belongs to, so a pre-baked transition can be
    /// resolved back to its action set without a unified-graph lookup.
    pub tree_id: TreeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionDirection {
    Forward,
    Reverse,
}

/// An edge in the execution-time graph; `source_handle` selects which edge
/// is followed after a node finishes (§4.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecEdge {
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    pub source_handle: SourceHandle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceHandle {
    Success,
    Failure,
    /// `loop` node's repeat edge, taken while the iteration counter is below
    /// `max_iterations`.
    Body,
    /// `loop` node's exit edge, taken once the counter reaches `max_iterations`.
    Done,
}

// ============================================================================
// SECTION: Execution Context
// ============================================================================

/// Per-execution mutable state threaded through one traversal (§4.2, §5).
/// Not `Clone`: an `ExecutionContext` belongs to exactly one in-flight
/// execution and is never shared across devices.
#[derive(Debug)]
pub struct ExecutionContext {
    pub device_id: DeviceId,
    pub host_id: HostId,
    /// Current position in the graph, used by `navigation` nodes that were
    /// not pre-baked with transitions.
    pub current_node_id: Option<NodeId>,
    /// Iteration counters for `loop` nodes, keyed by node id.
    pub loop_state: HashMap<NodeId, u32>,
    /// Caller-supplied tie-break for `navigation` nodes resolved at
    /// traversal time (§9 "action-set selection priority"). Has no effect on
    /// a `navigation` node that already carries pre-baked `transitions`.
    pub action_set_preference: Option<crate::interfaces::ActionSetPreference>,
    canceled: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(device_id: DeviceId, host_id: HostId) -> Self {
        Self {
            device_id,
            host_id,
            current_node_id: None,
            loop_state: HashMap::new(),
            action_set_preference: None,
            canceled: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Attaches an action-set preference, used by `navigation` nodes that
    /// resolve their path at traversal time.
    #[must_use]
    pub fn with_action_set_preference(mut self, preference: crate::interfaces::ActionSetPreference) -> Self {
        self.action_set_preference = Some(preference);
        self
    }

    /// Requests cancellation; takes effect at the next node boundary, never
    /// mid-action (§4.2, §5).
    pub fn cancel(&self) {
        self.canceled.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// A cloneable handle callers can use to cancel this execution from
    /// another task without holding the context itself.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            canceled: self.canceled.clone(),
        }
    }
}

/// A detached handle that can cancel the execution it was taken from.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    canceled: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.canceled.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(std::sync::atomic::Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Result Records
// ============================================================================

/// `script_results.script_type` (§3, §6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    Script,
    Testcase,
    Ai,
}

/// One step's full record, including any evidence sub-executors attached
/// (§4.2 Evidence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub node_id: NodeId,
    pub command: String,
    pub params: Value,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    /// Screenshot, transcript, and frame-description URIs; uploaded to
    /// external object storage by their producers before being attached here.
    pub evidence_uris: Vec<String>,
}

/// The outcome of one `Execute(graph, ctx)` call; persisted as a
/// `script_results` row (§3, §6.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub script_type: ScriptType,
    pub script_name: String,
    pub host: HostId,
    pub device_id: DeviceId,
    pub success: bool,
    pub canceled: bool,
    pub started_at: DateTime<Utc>,
    pub execution_time_ms: u64,
    pub report_url: Option<String>,
    pub step_results: Vec<StepRecord>,
    /// Written only by the external, asynchronous review pipeline (§9 open
    /// questions); never set by the executor itself.
    pub checked: Option<bool>,
    pub check_type: Option<String>,
    pub discard: Option<bool>,
    pub discard_type: Option<String>,
    pub discard_comment: Option<String>,
}
