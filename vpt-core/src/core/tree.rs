// vpt-core/src/core/tree.rs
// ============================================================================
// Module: Navigation Tree Data Model
// Description: Tree, node, edge, action set, action, and verification types.
// Purpose: Canonical shape persisted by the store and consumed by the
//          navigation engine's hierarchy loader and unified-graph builder.
// Dependencies: crate::core::{ids, error}, serde, serde_json
// ============================================================================

//! ## Overview
//! A tree is a named collection of nodes and edges scoped to one user
//! interface. Trees nest: a non-root tree is anchored at a
//! `(parent_tree_id, parent_node_id)` pair in its parent, up to 5 levels
//! deep. [`Tree::validate`] checks the invariants that do not require
//! cross-tree context; hierarchy-wide invariants (depth chains, broken
//! parent links) are the navigation engine's job.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::error::CoreError;
use crate::core::ids::ActionSetId;
use crate::core::ids::EdgeId;
use crate::core::ids::NodeId;
use crate::core::ids::TeamId;
use crate::core::ids::TreeId;

/// Maximum nesting depth for non-root trees (§3).
pub const MAX_TREE_DEPTH: u32 = 5;

// ============================================================================
// SECTION: Tree
// ============================================================================

/// A named collection of nodes and edges scoped to one user interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub tree_id: TreeId,
    pub team_id: TeamId,
    pub name: String,
    /// Depth 0 for the root tree; increases by one per nesting level, max 5.
    pub tree_depth: u32,
    pub is_root_tree: bool,
    /// Tree this tree is anchored under, when `is_root_tree` is false.
    pub parent_tree_id: Option<TreeId>,
    /// Node in `parent_tree_id` that conceptually spawns this tree.
    pub parent_node_id: Option<NodeId>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Tree {
    /// Validates invariants local to one tree (§3, §8):
    /// - `is_root_tree ≡ (parent_tree_id IS NULL AND parent_node_id IS NULL)`.
    /// - `tree_depth ≤ MAX_TREE_DEPTH`.
    /// - every edge's `default_action_set_id` resolves within that edge.
    /// - `is_root` is unique among this tree's nodes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ValidationError`] when an invariant is broken.
    pub fn validate(&self) -> Result<(), CoreError> {
        let has_parent = self.parent_tree_id.is_some() && self.parent_node_id.is_some();
        let has_no_parent = self.parent_tree_id.is_none() && self.parent_node_id.is_none();
        if !has_parent && !has_no_parent {
            return Err(CoreError::ValidationError(format!(
                "tree {}: parent_tree_id and parent_node_id must both be set or both be null",
                self.tree_id
            )));
        }
        if self.is_root_tree != has_no_parent {
            return Err(CoreError::ValidationError(format!(
                "tree {}: is_root_tree must equal (parent_tree_id IS NULL AND parent_node_id IS NULL)",
                self.tree_id
            )));
        }
        if self.tree_depth > MAX_TREE_DEPTH {
            return Err(CoreError::ValidationError(format!(
                "Maximum nesting depth reached ({MAX_TREE_DEPTH} levels)"
            )));
        }

        let root_count = self.nodes.iter().filter(|node| node.is_root).count();
        if root_count > 1 {
            return Err(CoreError::ValidationError(format!(
                "tree {}: more than one node marked is_root", self.tree_id
            )));
        }

        for edge in &self.edges {
            edge.validate()?;
        }

        Ok(())
    }

    /// Returns the root node, if one is marked `is_root`.
    #[must_use]
    pub fn root_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|node| node.is_root)
    }
}

// ============================================================================
// SECTION: Node
// ============================================================================

/// A node within a tree, identified by `(tree_id, node_id)`. `node_id` is
/// stable across sibling trees so labels/screenshots can mirror (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: NodeId,
    pub label: String,
    pub node_type: NodeType,
    pub position_x: f64,
    pub position_y: f64,
    /// Unique per tree; the entry point for pathfinding and validation DFS.
    pub is_root: bool,
    pub verifications: Vec<Verification>,
    /// Maintained by the persistence layer on subtree insert/delete against
    /// this node's `(tree_id, node_id)`.
    pub has_subtree: bool,
    pub subtree_count: u32,
    pub screenshot: Option<String>,
}

/// Node category (§3 lists `entry, screen, menu, action, …` as an open set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Entry,
    Screen,
    Menu,
    Action,
    Other(String),
}

// ============================================================================
// SECTION: Edge
// ============================================================================

/// A directed edge from `source_node_id` to `target_node_id` within one tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub edge_id: EdgeId,
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    pub action_sets: Vec<ActionSet>,
    pub default_action_set_id: ActionSetId,
    pub final_wait_time: u64,
    pub priority: i32,
    pub threshold: f64,
}

impl Edge {
    /// Validates the per-edge invariants (§3, §8):
    /// - `|action_sets| ≥ 1`.
    /// - `default_action_set_id ∈ action_sets`.
    /// - a bidirectional edge (`|action_sets| ≥ 2`) has distinct action-set ids.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ValidationError`] when an invariant is broken.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.action_sets.is_empty() {
            return Err(CoreError::ValidationError(format!(
                "edge {}: must declare at least one action set", self.edge_id
            )));
        }
        if !self.action_sets.iter().any(|set| set.id == self.default_action_set_id) {
            return Err(CoreError::ValidationError(format!(
                "edge {}: default_action_set_id {} not present in action_sets",
                self.edge_id, self.default_action_set_id
            )));
        }
        let mut seen = BTreeSet::new();
        for set in &self.action_sets {
            if !seen.insert(set.id.clone()) {
                return Err(CoreError::ValidationError(format!(
                    "edge {}: duplicate action set id {}", self.edge_id, set.id
                )));
            }
        }
        Ok(())
    }

    /// An edge is bidirectional iff it carries two or more action sets; the
    /// non-default set represents the reverse traversal.
    #[must_use]
    pub fn is_bidirectional(&self) -> bool {
        self.action_sets.len() >= 2
    }

    /// Returns the action set with the given id.
    #[must_use]
    pub fn action_set(&self, id: &ActionSetId) -> Option<&ActionSet> {
        self.action_sets.iter().find(|set| &set.id == id)
    }

    /// Returns the default action set.
    #[must_use]
    pub fn default_action_set(&self) -> Option<&ActionSet> {
        self.action_set(&self.default_action_set_id)
    }

    /// Returns the first action set whose id differs from the default, used
    /// for reverse traversal during validation-sequence generation.
    #[must_use]
    pub fn reverse_action_set(&self) -> Option<&ActionSet> {
        self.action_sets.iter().find(|set| set.id != self.default_action_set_id)
    }
}

// ============================================================================
// SECTION: ActionSet / Action / Verification
// ============================================================================

/// A named bundle of actions (with retries and failure fallbacks) attached
/// to an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSet {
    pub id: ActionSetId,
    pub label: String,
    pub priority: i32,
    /// When `Some(ms)` and `ms > 0`: auto-trigger this action set `ms`
    /// milliseconds after arriving at the target node (temporary overlays).
    pub timer: Option<u64>,
    pub conditions: Option<Value>,
    pub actions: Vec<Action>,
    pub retry_actions: Vec<Action>,
    pub failure_actions: Vec<Action>,
}

impl ActionSet {
    /// True when `timer` is set and positive.
    #[must_use]
    pub fn has_timer_actions(&self) -> bool {
        self.timer.is_some_and(|ms| ms > 0)
    }
}

/// One opaque command dispatched through the Controller Registry. `params`
/// carries `wait_time` (ms, post-execution settle) plus command-specific
/// fields; embedded verbatim, no external action table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub command: String,
    pub params: Value,
}

/// A verification embedded in a node, evaluated after navigation to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    #[serde(rename = "type")]
    pub kind: String,
    pub command: String,
    pub params: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action_set(id: &str) -> ActionSet {
        ActionSet {
            id: ActionSetId::new(id),
            label: id.to_string(),
            priority: 0,
            timer: None,
            conditions: None,
            actions: vec![Action {
                command: "press_key".to_string(),
                params: serde_json::json!({"key": "OK", "wait_time": 500}),
            }],
            retry_actions: vec![],
            failure_actions: vec![],
        }
    }

    #[test]
    fn edge_rejects_missing_default_action_set() {
        let edge = Edge {
            edge_id: EdgeId::new("e1"),
            source_node_id: NodeId::new("a"),
            target_node_id: NodeId::new("b"),
            action_sets: vec![action_set("open")],
            default_action_set_id: ActionSetId::new("missing"),
            final_wait_time: 0,
            priority: 0,
            threshold: 0.0,
        };
        assert!(edge.validate().is_err());
    }

    #[test]
    fn edge_with_two_action_sets_is_bidirectional() {
        let edge = Edge {
            edge_id: EdgeId::new("e1"),
            source_node_id: NodeId::new("live"),
            target_node_id: NodeId::new("live_fullscreen"),
            action_sets: vec![action_set("open"), action_set("close")],
            default_action_set_id: ActionSetId::new("open"),
            final_wait_time: 0,
            priority: 0,
            threshold: 0.0,
        };
        edge.validate().unwrap();
        assert!(edge.is_bidirectional());
        assert_eq!(edge.reverse_action_set().unwrap().id, ActionSetId::new("close"));
    }

    #[test]
    fn tree_root_flag_must_match_parent_fields() {
        let tree = Tree {
            tree_id: TreeId::new("t1"),
            team_id: TeamId::new("team1"),
            name: "horizon".to_string(),
            tree_depth: 0,
            is_root_tree: false,
            parent_tree_id: None,
            parent_node_id: None,
            nodes: vec![],
            edges: vec![],
        };
        assert!(tree.validate().is_err());
    }

    #[test]
    fn tree_over_max_depth_is_rejected() {
        let tree = Tree {
            tree_id: TreeId::new("t6"),
            team_id: TeamId::new("team1"),
            name: "deep".to_string(),
            tree_depth: 6,
            is_root_tree: false,
            parent_tree_id: Some(TreeId::new("t5")),
            parent_node_id: Some(NodeId::new("n")),
            nodes: vec![],
            edges: vec![],
        };
        let err = tree.validate().unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(msg) if msg.contains("Maximum nesting depth")));
    }
}
