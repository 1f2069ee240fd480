// vpt-host/src/plan_generator.rs
// ============================================================================
// Module: AI Plan Generator Contract
// Description: The narrow seam between the AI plan cache (§4.3) and the
//              external AI provider that turns a cache miss into a fresh
//              execution graph.
// Purpose: Keep the actual LLM call (OpenRouter or equivalent, §6.6) out of
//          this crate's scope (§1 Non-goals list AI model calls as external
//          collaborators) while giving the executeTask path something
//          concrete to call and test against.
// Dependencies: vpt-core
// ============================================================================

//! ## Overview
//! [`PlanGenerator`] mirrors the driver contract shape of §6.4: one trait,
//! implemented once per AI backend. [`ReferencePlanGenerator`] is the
//! reference implementation shipped here — it builds a trivial
//! `start -> navigation(target) -> success` graph from the prompt's
//! normalized target instead of calling out to a real model, the same way
//! `vpt-controllers::builtin` ships loggers instead of real device drivers.

use serde_json::json;

use vpt_core::ai_cache::normalize_prompt;
use vpt_core::ai_cache::PlanContext;
use vpt_core::core::execution::ExecEdge;
use vpt_core::core::execution::ExecGraph;
use vpt_core::core::execution::ExecNode;
use vpt_core::core::execution::ExecNodeKind;
use vpt_core::core::execution::SourceHandle;
use vpt_core::core::ids::NodeId;
use vpt_core::core::CoreError;

/// Produces a fresh execution graph for a prompt the AI plan cache missed on
/// (§4.3 Lookup, `CacheMiss` — "not an error", generate).
pub trait PlanGenerator: Send + Sync {
    /// # Errors
    /// Returns [`CoreError::ExecutionAborted`] when the provider is
    /// unavailable or declines to produce a plan.
    fn generate(&self, prompt: &str, ctx: &PlanContext) -> Result<ExecGraph, CoreError>;
}

/// Reference generator: no network call, no model weights. Builds a graph
/// that navigates to the prompt's normalized target node if that node is
/// present in `ctx.available_nodes`, otherwise a single `action` node.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferencePlanGenerator;

impl PlanGenerator for ReferencePlanGenerator {
    fn generate(&self, prompt: &str, ctx: &PlanContext) -> Result<ExecGraph, CoreError> {
        let normalized = normalize_prompt(prompt);
        let start = NodeId::new("start");
        let success = NodeId::new("success");
        let failure = NodeId::new("failure");

        let middle = if ctx.available_nodes.iter().any(|node| node == &normalized.target) && !normalized.target.is_empty() {
            ExecNode {
                node_id: NodeId::new("navigate"),
                kind: ExecNodeKind::Navigation { target_node_id: NodeId::new(normalized.target.clone()), transitions: None },
            }
        } else {
            ExecNode {
                node_id: NodeId::new("action"),
                kind: ExecNodeKind::Action { command: normalized.intent.clone(), params: json!({}) },
            }
        };
        let middle_id = middle.node_id.clone();

        Ok(ExecGraph {
            nodes: vec![
                ExecNode { node_id: start.clone(), kind: ExecNodeKind::Start },
                middle,
                ExecNode { node_id: success.clone(), kind: ExecNodeKind::Success },
                ExecNode { node_id: failure.clone(), kind: ExecNodeKind::Failure },
            ],
            edges: vec![
                ExecEdge { source_node_id: start, target_node_id: middle_id.clone(), source_handle: SourceHandle::Success, edge_type: None },
                ExecEdge { source_node_id: middle_id.clone(), target_node_id: success, source_handle: SourceHandle::Success, edge_type: None },
                ExecEdge { source_node_id: middle_id, target_node_id: failure, source_handle: SourceHandle::Failure, edge_type: None },
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_navigation_graph_when_target_is_available() {
        let generator = ReferencePlanGenerator;
        let ctx = PlanContext {
            device_model: "android_mobile".into(),
            ui_name: "horizon_android_mobile".into(),
            available_nodes: vec!["home".into(), "live".into()],
        };
        let graph = generator.generate("go to live", &ctx).unwrap();
        assert!(graph.nodes.iter().any(|node| matches!(node.kind, ExecNodeKind::Navigation { .. })));
    }

    #[test]
    fn falls_back_to_action_node_when_target_unavailable() {
        let generator = ReferencePlanGenerator;
        let ctx = PlanContext { device_model: "m".into(), ui_name: "ui".into(), available_nodes: vec![] };
        let graph = generator.generate("press ok", &ctx).unwrap();
        assert!(graph.nodes.iter().any(|node| matches!(node.kind, ExecNodeKind::Action { .. })));
    }
}
