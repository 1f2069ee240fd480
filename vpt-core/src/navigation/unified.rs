// vpt-core/src/navigation/unified.rs
// ============================================================================
// Module: Unified Graph Assembly
// Description: BuildUnified — assembles the process-local multigraph from a
//              Hierarchy, with virtual ENTER/EXIT_SUBTREE edges at tree
//              boundaries (§3, §4.1).
// Purpose: Produce the single in-memory structure pathfinding and the
//          validation DFS both operate on.
// Dependencies: crate::core, petgraph
// ============================================================================

use std::collections::HashMap;

use petgraph::graph::DiGraph;
use petgraph::graph::NodeIndex;

use crate::core::error::CoreError;
use crate::core::ids::ActionSetId;
use crate::core::ids::EdgeId;
use crate::core::ids::NodeId;
use crate::core::ids::TreeId;
use crate::navigation::hierarchy::Hierarchy;

/// Whether an edge in the unified graph is a real navigation edge or one of
/// the virtual edges added at a tree boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Real,
    EnterSubtree,
    ExitSubtree,
}

/// Metadata attached to every edge in the unified graph (§4.1 `BuildUnified`).
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeMeta {
    pub kind: EdgeKind,
    /// `None` for virtual `ENTER_SUBTREE`/`EXIT_SUBTREE` edges.
    pub edge_id: Option<EdgeId>,
    pub tree_id: TreeId,
    pub action_sets: Vec<ActionSetSummary>,
    pub default_action_set_id: Option<ActionSetId>,
    pub default_action_set_priority: i32,
    pub is_bidirectional: bool,
    pub alternatives_count: usize,
    pub has_timer_actions: bool,
    pub weight: u32,
}

/// Just enough of an [`crate::core::tree::ActionSet`] for pathfinding to pick
/// between alternatives on a bidirectional edge (§9 "action-set selection
/// priority") without re-reading the source `Edge`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSetSummary {
    pub id: ActionSetId,
    pub priority: i32,
    pub has_timer_actions: bool,
    pub commands: Vec<String>,
}

/// A node identity in the unified graph: a node is unique by `(tree_id,
/// node_id)`, since the same `node_id` can legitimately appear in sibling
/// trees for label/screenshot mirroring (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnifiedNodeKey {
    pub tree_id: TreeId,
    pub node_id: NodeId,
}

/// The assembled multigraph plus the lookup indexes `BuildUnified` produces.
pub struct UnifiedGraph {
    pub graph: DiGraph<UnifiedNodeKey, EdgeMeta>,
    pub index: HashMap<UnifiedNodeKey, NodeIndex>,
    /// `node_id → tree_id`, for locating a bare node id without knowing its
    /// tree up front. Last-write-wins when a `node_id` spans sibling trees;
    /// callers that need a specific tree's instance should index `index`
    /// directly with a full [`UnifiedNodeKey`].
    pub location: HashMap<NodeId, TreeId>,
}

impl UnifiedGraph {
    #[must_use]
    pub fn node_index(&self, tree_id: &TreeId, node_id: &NodeId) -> Option<NodeIndex> {
        self.index
            .get(&UnifiedNodeKey {
                tree_id: tree_id.clone(),
                node_id: node_id.clone(),
            })
            .copied()
    }
}

/// `BuildUnified(hierarchy) → UnifiedGraph` (§4.1, §3).
///
/// # Errors
/// Returns [`CoreError::ValidationError`] when a `default_action_set_id`
/// fails to resolve, a bidirectional edge does not carry exactly two
/// distinct action-set ids, or a node is orphaned (no incident edge and not
/// a root/entry node).
pub fn build_unified(hierarchy: &Hierarchy) -> Result<UnifiedGraph, CoreError> {
    let mut graph: DiGraph<UnifiedNodeKey, EdgeMeta> = DiGraph::new();
    let mut index = HashMap::new();
    let mut location = HashMap::new();

    for tree in &hierarchy.trees {
        for node in &tree.nodes {
            let key = UnifiedNodeKey {
                tree_id: tree.tree_id.clone(),
                node_id: node.node_id.clone(),
            };
            let idx = graph.add_node(key.clone());
            index.insert(key, idx);
            location.insert(node.node_id.clone(), tree.tree_id.clone());
        }
    }

    for tree in &hierarchy.trees {
        for edge in &tree.edges {
            edge.validate()?;

            let source = index
                .get(&UnifiedNodeKey {
                    tree_id: tree.tree_id.clone(),
                    node_id: edge.source_node_id.clone(),
                })
                .copied()
                .ok_or_else(|| CoreError::ValidationError(format!("edge {} source node not found", edge.edge_id)))?;
            let target = index
                .get(&UnifiedNodeKey {
                    tree_id: tree.tree_id.clone(),
                    node_id: edge.target_node_id.clone(),
                })
                .copied()
                .ok_or_else(|| CoreError::ValidationError(format!("edge {} target node not found", edge.edge_id)))?;

            let default_set = edge.default_action_set();
            let meta = EdgeMeta {
                kind: EdgeKind::Real,
                edge_id: Some(edge.edge_id.clone()),
                tree_id: tree.tree_id.clone(),
                action_sets: edge
                    .action_sets
                    .iter()
                    .map(|set| ActionSetSummary {
                        id: set.id.clone(),
                        priority: set.priority,
                        has_timer_actions: set.has_timer_actions(),
                        commands: set.actions.iter().map(|action| action.command.clone()).collect(),
                    })
                    .collect(),
                default_action_set_id: Some(edge.default_action_set_id.clone()),
                default_action_set_priority: default_set.map_or(0, |set| set.priority),
                is_bidirectional: edge.is_bidirectional(),
                alternatives_count: edge.action_sets.len(),
                has_timer_actions: edge.action_sets.iter().any(crate::core::tree::ActionSet::has_timer_actions),
                weight: 1,
            };
            graph.add_edge(source, target, meta);
        }
    }

    for tree in &hierarchy.trees {
        let (Some(parent_tree_id), Some(parent_node_id)) = (&tree.parent_tree_id, &tree.parent_node_id) else {
            continue;
        };
        let Some(entry) = tree.root_node() else {
            return Err(CoreError::ValidationError(format!(
                "tree {} has no root/entry node for its ENTER_SUBTREE edge", tree.tree_id
            )));
        };

        let parent_idx = index
            .get(&UnifiedNodeKey {
                tree_id: parent_tree_id.clone(),
                node_id: parent_node_id.clone(),
            })
            .copied()
            .ok_or_else(|| CoreError::ValidationError(format!("parent node {parent_node_id} of tree {} not found", tree.tree_id)))?;
        let entry_idx = index
            .get(&UnifiedNodeKey {
                tree_id: tree.tree_id.clone(),
                node_id: entry.node_id.clone(),
            })
            .copied()
            .expect("entry node was just indexed above");

        graph.add_edge(
            parent_idx,
            entry_idx,
            EdgeMeta {
                kind: EdgeKind::EnterSubtree,
                edge_id: None,
                tree_id: tree.tree_id.clone(),
                action_sets: vec![],
                default_action_set_id: None,
                default_action_set_priority: 0,
                is_bidirectional: false,
                alternatives_count: 0,
                has_timer_actions: false,
                weight: 1,
            },
        );
        graph.add_edge(
            entry_idx,
            parent_idx,
            EdgeMeta {
                kind: EdgeKind::ExitSubtree,
                edge_id: None,
                tree_id: tree.tree_id.clone(),
                action_sets: vec![],
                default_action_set_id: None,
                default_action_set_priority: 0,
                is_bidirectional: false,
                alternatives_count: 0,
                has_timer_actions: false,
                weight: 1,
            },
        );
    }

    for (key, idx) in &index {
        let has_edge = graph.edges(*idx).next().is_some() || graph.edges_directed(*idx, petgraph::Direction::Incoming).next().is_some();
        if !has_edge {
            let tree = hierarchy.tree(&key.tree_id).expect("tree present in hierarchy");
            let node = tree.nodes.iter().find(|node| node.node_id == key.node_id).expect("node present in tree");
            if !node.is_root {
                return Err(CoreError::ValidationError(format!(
                    "orphan node: {} in tree {} has no incident edge", key.node_id, key.tree_id
                )));
            }
        }
    }

    Ok(UnifiedGraph {
        graph,
        index,
        location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::TeamId;
    use crate::core::tree::Action;
    use crate::core::tree::ActionSet;
    use crate::core::tree::Edge;
    use crate::core::tree::Node;
    use crate::core::tree::NodeType;
    use crate::core::tree::Tree;

    fn node(id: &str, is_root: bool) -> Node {
        Node {
            node_id: NodeId::new(id),
            label: id.to_string(),
            node_type: NodeType::Screen,
            position_x: 0.0,
            position_y: 0.0,
            is_root,
            verifications: vec![],
            has_subtree: false,
            subtree_count: 0,
            screenshot: None,
        }
    }

    fn action_set(id: &str) -> ActionSet {
        ActionSet {
            id: ActionSetId::new(id),
            label: id.to_string(),
            priority: 0,
            timer: None,
            conditions: None,
            actions: vec![Action {
                command: "press_key".to_string(),
                params: serde_json::json!({"key": "OK"}),
            }],
            retry_actions: vec![],
            failure_actions: vec![],
        }
    }

    #[test]
    fn unified_edge_count_matches_real_plus_virtual() {
        let root = Tree {
            tree_id: TreeId::new("root"),
            team_id: TeamId::new("team1"),
            name: "root".to_string(),
            tree_depth: 0,
            is_root_tree: true,
            parent_tree_id: None,
            parent_node_id: None,
            nodes: vec![node("home", true), node("live", false)],
            edges: vec![Edge {
                edge_id: EdgeId::new("e1"),
                source_node_id: NodeId::new("home"),
                target_node_id: NodeId::new("live"),
                action_sets: vec![action_set("open"), action_set("close")],
                default_action_set_id: ActionSetId::new("open"),
                final_wait_time: 0,
                priority: 0,
                threshold: 0.0,
            }],
        };
        let child = Tree {
            tree_id: TreeId::new("child"),
            team_id: TeamId::new("team1"),
            name: "child".to_string(),
            tree_depth: 1,
            is_root_tree: false,
            parent_tree_id: Some(TreeId::new("root")),
            parent_node_id: Some(NodeId::new("live")),
            nodes: vec![node("entry", true)],
            edges: vec![],
        };

        let hierarchy = Hierarchy {
            root_tree_id: TreeId::new("root"),
            trees: vec![root, child],
        };

        let unified = build_unified(&hierarchy).unwrap();
        // 1 real edge + 2 virtual edges (ENTER/EXIT) for the one non-root tree (§8).
        assert_eq!(unified.graph.edge_count(), 3);
    }
}
