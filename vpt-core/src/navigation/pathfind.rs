// vpt-core/src/navigation/pathfind.rs
// ============================================================================
// Module: Pathfinding
// Description: FindPath — shortest path by edge count over the unified
//              graph, tie-broken by cross-tree transitions then action-set
//              priority sum (§4.1).
// Purpose: Answer "how do I get from here to there" for the executor's
//          navigation nodes and for the Server's navigation HTTP surface.
// Dependencies: crate::core, petgraph
// ============================================================================

//! ## Overview
//! Dijkstra over a lexicographically-ordered cost tuple
//! `(edge_count, cross_tree_hops, priority_sum)`. Each component only grows
//! as a path extends, so relaxation still holds component-wise and the
//! usual shortest-path correctness argument applies to the tuple order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::core::error::CoreError;
use crate::core::execution::Transition;
use crate::core::execution::TransitionDirection;
use crate::core::ids::ActionSetId;
use crate::core::ids::NodeId;
use crate::interfaces::ActionSetPreference;
use crate::navigation::unified::EdgeKind;
use crate::navigation::unified::EdgeMeta;
use crate::navigation::unified::UnifiedGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cost {
    edge_count: u32,
    cross_tree_hops: u32,
    priority_sum: i64,
}

impl Cost {
    const ZERO: Cost = Cost {
        edge_count: 0,
        cross_tree_hops: 0,
        priority_sum: 0,
    };
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.edge_count
            .cmp(&other.edge_count)
            .then(self.cross_tree_hops.cmp(&other.cross_tree_hops))
            .then(self.priority_sum.cmp(&other.priority_sum))
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    cost: Cost,
    node: NodeIndex,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the lowest cost pops first.
        other.cost.cmp(&self.cost)
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `FindPath(..) → []Transition` over an already-built unified graph.
/// Unified pathfinding only; callers with no cached graph must fail before
/// reaching here (`CoreError::UnifiedCacheMissing`, handled by
/// [`crate::navigation::NavigationEngine::find_path`]).
///
/// `preference` overrides which of a bidirectional edge's action sets is
/// used for each hop, falling back to `default_action_set_id` when absent or
/// when it matches nothing on a given edge (§9 "action-set selection
/// priority").
///
/// # Errors
/// Returns [`CoreError::NotFound`] when `start_node_id` or `target_node_id`
/// do not resolve to any node in the graph.
pub fn find_path(
    graph: &UnifiedGraph,
    start_node_id: Option<&NodeId>,
    target_node_id: &NodeId,
    preference: Option<&ActionSetPreference>,
) -> Result<Vec<Transition>, CoreError> {
    let start_idx = resolve_start(graph, start_node_id)?;
    let target_tree = graph
        .location
        .get(target_node_id)
        .ok_or_else(|| CoreError::NotFound(format!("target node {target_node_id} not in unified graph")))?;
    let target_idx = graph
        .node_index(target_tree, target_node_id)
        .ok_or_else(|| CoreError::NotFound(format!("target node {target_node_id} not in unified graph")))?;

    if start_idx == target_idx {
        return Ok(Vec::new());
    }

    let mut best: HashMap<NodeIndex, Cost> = HashMap::new();
    let mut came_from: HashMap<NodeIndex, (NodeIndex, petgraph::graph::EdgeIndex)> = HashMap::new();
    let mut heap = BinaryHeap::new();

    best.insert(start_idx, Cost::ZERO);
    heap.push(HeapEntry {
        cost: Cost::ZERO,
        node: start_idx,
    });

    while let Some(HeapEntry { cost, node }) = heap.pop() {
        if node == target_idx {
            break;
        }
        if best.get(&node).is_some_and(|&known| known != cost) {
            continue;
        }

        for edge_ref in graph.graph.edges_directed(node, Direction::Outgoing) {
            let meta = edge_ref.weight();
            let next_cost = Cost {
                edge_count: cost.edge_count + 1,
                cross_tree_hops: cost.cross_tree_hops + u32::from(meta.kind != EdgeKind::Real),
                priority_sum: cost.priority_sum + i64::from(meta.default_action_set_priority),
            };
            let next = edge_ref.target();
            let improves = best.get(&next).map_or(true, |&known| next_cost < known);
            if improves {
                best.insert(next, next_cost);
                came_from.insert(next, (node, edge_ref.id()));
                heap.push(HeapEntry {
                    cost: next_cost,
                    node: next,
                });
            }
        }
    }

    if !best.contains_key(&target_idx) {
        return Err(CoreError::NotFound(format!(
            "no path to node {target_node_id} in unified graph"
        )));
    }

    Ok(reconstruct(graph, &came_from, start_idx, target_idx, preference))
}

/// Picks the action set to report on one hop of a reconstructed path. A
/// supplied `preference` only ever steers a choice among the edge's own
/// `action_sets`; it never invents a command the edge doesn't carry.
fn select_action_set(meta: &EdgeMeta, preference: Option<&ActionSetPreference>) -> Option<ActionSetId> {
    let Some(preference) = preference else {
        return meta.default_action_set_id.clone();
    };

    if preference.prefer_timer_actions {
        if let Some(set) = meta.action_sets.iter().find(|set| set.has_timer_actions) {
            return Some(set.id.clone());
        }
    }

    if !preference.preferred_commands.is_empty() {
        if let Some(set) = meta
            .action_sets
            .iter()
            .find(|set| set.commands.iter().any(|command| preference.preferred_commands.contains(command)))
        {
            return Some(set.id.clone());
        }
    }

    meta.default_action_set_id.clone()
}

fn resolve_start(graph: &UnifiedGraph, start_node_id: Option<&NodeId>) -> Result<NodeIndex, CoreError> {
    match start_node_id {
        Some(node_id) => {
            let tree_id = graph
                .location
                .get(node_id)
                .ok_or_else(|| CoreError::NotFound(format!("start node {node_id} not in unified graph")))?;
            graph
                .node_index(tree_id, node_id)
                .ok_or_else(|| CoreError::NotFound(format!("start node {node_id} not in unified graph")))
        }
        None => graph
            .graph
            .node_indices()
            .next()
            .ok_or_else(|| CoreError::NotFound("unified graph has no nodes".to_string())),
    }
}

fn reconstruct(
    graph: &UnifiedGraph,
    came_from: &HashMap<NodeIndex, (NodeIndex, petgraph::graph::EdgeIndex)>,
    start_idx: NodeIndex,
    target_idx: NodeIndex,
    preference: Option<&ActionSetPreference>,
) -> Vec<Transition> {
    let mut path_edges = Vec::new();
    let mut current = target_idx;
    while current != start_idx {
        let (prev, edge_idx) = came_from[&current];
        path_edges.push(edge_idx);
        current = prev;
    }
    path_edges.reverse();

    path_edges
        .into_iter()
        .map(|edge_idx| {
            let (source, target) = graph.graph.edge_endpoints(edge_idx).expect("edge index came from this graph");
            let meta = &graph.graph[edge_idx];
            let source_key = &graph.graph[source];
            let target_key = &graph.graph[target];
            let direction = match meta.kind {
                EdgeKind::ExitSubtree => TransitionDirection::Reverse,
                _ => TransitionDirection::Forward,
            };
            Transition {
                source_node_id: source_key.node_id.clone(),
                target_node_id: target_key.node_id.clone(),
                action_set_id: select_action_set(meta, preference),
                direction,
                tree_id: meta.tree_id.clone(),
            }
        })
        .collect()
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
    use crate::navigation::unified::build_unified;
    use crate::navigation::Hierarchy;

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

    fn action_set(id: &str, timer: Option<u64>, command: &str) -> ActionSet {
        ActionSet {
            id: ActionSetId::new(id),
            label: id.to_string(),
            priority: 0,
            timer,
            conditions: None,
            actions: vec![Action {
                command: command.to_string(),
                params: serde_json::json!({}),
            }],
            retry_actions: vec![],
            failure_actions: vec![],
        }
    }

    fn single_edge_graph() -> UnifiedGraph {
        let tree = Tree {
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
                action_sets: vec![
                    action_set("open", None, "press_key"),
                    action_set("open_with_timer", Some(500), "tap_coordinates"),
                ],
                default_action_set_id: ActionSetId::new("open"),
                final_wait_time: 0,
                priority: 0,
                threshold: 0.0,
            }],
        };
        let hierarchy = Hierarchy {
            root_tree_id: TreeId::new("root"),
            trees: vec![tree],
        };
        build_unified(&hierarchy).unwrap()
    }

    #[test]
    fn defaults_to_default_action_set_with_no_preference() {
        let graph = single_edge_graph();
        let path = find_path(&graph, Some(&NodeId::new("home")), &NodeId::new("live"), None).unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].action_set_id, Some(ActionSetId::new("open")));
    }

    #[test]
    fn prefers_timer_action_set_when_requested() {
        let graph = single_edge_graph();
        let preference = ActionSetPreference {
            prefer_timer_actions: true,
            preferred_commands: vec![],
        };
        let path = find_path(&graph, Some(&NodeId::new("home")), &NodeId::new("live"), Some(&preference)).unwrap();
        assert_eq!(path[0].action_set_id, Some(ActionSetId::new("open_with_timer")));
    }

    #[test]
    fn prefers_action_set_matching_a_preferred_command() {
        let graph = single_edge_graph();
        let preference = ActionSetPreference {
            prefer_timer_actions: false,
            preferred_commands: vec!["tap_coordinates".to_string()],
        };
        let path = find_path(&graph, Some(&NodeId::new("home")), &NodeId::new("live"), Some(&preference)).unwrap();
        assert_eq!(path[0].action_set_id, Some(ActionSetId::new("open_with_timer")));
    }

    #[test]
    fn falls_back_to_default_when_preference_matches_nothing() {
        let graph = single_edge_graph();
        let preference = ActionSetPreference {
            prefer_timer_actions: false,
            preferred_commands: vec!["nonexistent_command".to_string()],
        };
        let path = find_path(&graph, Some(&NodeId::new("home")), &NodeId::new("live"), Some(&preference)).unwrap();
        assert_eq!(path[0].action_set_id, Some(ActionSetId::new("open")));
    }
}
