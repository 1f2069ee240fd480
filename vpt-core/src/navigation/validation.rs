// vpt-core/src/navigation/validation.rs
// ============================================================================
// Module: Validation Sequence Generation
// Description: ValidationSequence — a depth-first walk exercising every real
//              edge forward and, where possible, its return (§4.1, §4.2b).
// Purpose: Produce self-test walks for one tree, independent of pathfinding.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Builds a direction-tagged adjacency lookup for one tree (both directions
//! for a bidirectional edge map to the *same* underlying edge, §4.2b), then
//! runs a DFS from each entry point. Each edge's return strategy is tried in
//! order: direct, bidirectional, transitional (bounded BFS), then skip.
//! Skipped returns never abort the walk (§4.1 Failure semantics).

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use crate::core::error::CoreError;
use crate::core::execution::TransitionDirection;
use crate::core::ids::ActionSetId;
use crate::core::ids::NodeId;
use crate::core::tree::Tree;

/// Per-edge state during validation-sequence generation (§4.1 state machine).
/// `Pending` is implicit (absence from the tracking map); both terminal
/// states end the edge's participation in the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeState {
    ForwardDone,
    ReturnDone,
    ReturnSkipped,
}

/// How a step's return half was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnStrategy {
    Direct,
    Bidirectional,
    Transitional,
    Skipped,
}

/// One produced step in the validation sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    pub action_set_id: ActionSetId,
    pub transition_direction: TransitionDirection,
    pub step_type: ReturnStrategy,
}

/// Tunables for validation-sequence generation (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOptions {
    pub enable_transitional_fallback: bool,
    pub max_transitional_steps: u32,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            enable_transitional_fallback: true,
            max_transitional_steps: 3,
        }
    }
}

/// A direction-tagged adjacency entry: both `(u, v)` and, for a bidirectional
/// edge, `(v, u)` point at the same underlying edge (§4.2b).
#[derive(Debug, Clone)]
struct DirectedHop {
    edge_index: usize,
    direction: TransitionDirection,
}

/// `ValidationSequence(tree_id, team_id) → []Step` (§4.1).
///
/// # Errors
/// Returns [`CoreError::ValidationError`] when an edge's chosen direction has
/// no usable action set (forward with no default, or reverse with no
/// non-default set).
pub fn validation_sequence(tree: &Tree, options: ValidationOptions) -> Result<Vec<Step>, CoreError> {
    let mut adjacency: HashMap<NodeId, Vec<DirectedHop>> = HashMap::new();
    for (edge_index, edge) in tree.edges.iter().enumerate() {
        adjacency.entry(edge.source_node_id.clone()).or_default().push(DirectedHop {
            edge_index,
            direction: TransitionDirection::Forward,
        });
        if edge.is_bidirectional() {
            adjacency.entry(edge.target_node_id.clone()).or_default().push(DirectedHop {
                edge_index,
                direction: TransitionDirection::Reverse,
            });
        }
    }

    let mut edge_state: HashMap<usize, EdgeState> = HashMap::new();
    let mut steps = Vec::new();

    let entries: Vec<&NodeId> = tree.nodes.iter().filter(|node| node.is_root).map(|node| &node.node_id).collect();
    let entries: Vec<&NodeId> = if entries.is_empty() {
        tree.nodes.iter().map(|node| &node.node_id).collect()
    } else {
        entries
    };

    for entry in entries {
        let mut visited_edges: HashSet<(usize, TransitionDirection)> = HashSet::new();
        walk(tree, &adjacency, &mut edge_state, &mut visited_edges, entry, None, &options, &mut steps)?;
    }

    Ok(steps)
}

#[allow(clippy::too_many_arguments)]
fn walk(
    tree: &Tree,
    adjacency: &HashMap<NodeId, Vec<DirectedHop>>,
    edge_state: &mut HashMap<usize, EdgeState>,
    visited_edges: &mut HashSet<(usize, TransitionDirection)>,
    current: &NodeId,
    came_from_edge: Option<usize>,
    options: &ValidationOptions,
    steps: &mut Vec<Step>,
) -> Result<(), CoreError> {
    let Some(hops) = adjacency.get(current) else {
        return Ok(());
    };

    for hop in hops.clone() {
        if edge_state.contains_key(&hop.edge_index) {
            continue;
        }
        if visited_edges.contains(&(hop.edge_index, hop.direction)) {
            continue;
        }
        // Do not immediately walk back along the edge we just arrived on.
        if came_from_edge == Some(hop.edge_index) {
            continue;
        }

        let edge = &tree.edges[hop.edge_index];
        let (source, target) = match hop.direction {
            TransitionDirection::Forward => (edge.source_node_id.clone(), edge.target_node_id.clone()),
            TransitionDirection::Reverse => (edge.target_node_id.clone(), edge.source_node_id.clone()),
        };

        let forward_action_set = edge.default_action_set_id.clone();
        let action_set_id = match hop.direction {
            TransitionDirection::Forward => forward_action_set,
            TransitionDirection::Reverse => edge
                .reverse_action_set()
                .ok_or_else(|| CoreError::ValidationError(format!("edge {}: no non-default action set for reverse traversal", edge.edge_id)))?
                .id
                .clone(),
        };

        visited_edges.insert((hop.edge_index, hop.direction));
        steps.push(Step {
            source_node_id: source.clone(),
            target_node_id: target.clone(),
            action_set_id,
            transition_direction: hop.direction,
            step_type: ReturnStrategy::Direct,
        });
        edge_state.insert(hop.edge_index, EdgeState::ForwardDone);

        walk(tree, adjacency, edge_state, visited_edges, &target, Some(hop.edge_index), options, steps)?;

        resolve_return(tree, adjacency, edge_state, visited_edges, hop.edge_index, &source, &target, options, steps)?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn resolve_return(
    tree: &Tree,
    adjacency: &HashMap<NodeId, Vec<DirectedHop>>,
    edge_state: &mut HashMap<usize, EdgeState>,
    visited_edges: &mut HashSet<(usize, TransitionDirection)>,
    edge_index: usize,
    source: &NodeId,
    target: &NodeId,
    options: &ValidationOptions,
    steps: &mut Vec<Step>,
) -> Result<(), CoreError> {
    if edge_state.get(&edge_index) != Some(&EdgeState::ForwardDone) {
        return Ok(());
    }

    // Strategy 1: Direct — a distinct edge (child -> parent) exists.
    if let Some(hops) = adjacency.get(target) {
        for hop in hops.clone() {
            if hop.edge_index == edge_index {
                continue;
            }
            let candidate = &tree.edges[hop.edge_index];
            let (candidate_source, candidate_target) = match hop.direction {
                TransitionDirection::Forward => (&candidate.source_node_id, &candidate.target_node_id),
                TransitionDirection::Reverse => (&candidate.target_node_id, &candidate.source_node_id),
            };
            if candidate_source == target && candidate_target == source && !edge_state.contains_key(&hop.edge_index) {
                let action_set_id = match hop.direction {
                    TransitionDirection::Forward => candidate.default_action_set_id.clone(),
                    TransitionDirection::Reverse => candidate
                        .reverse_action_set()
                        .ok_or_else(|| CoreError::ValidationError(format!("edge {}: no non-default action set for reverse traversal", candidate.edge_id)))?
                        .id
                        .clone(),
                };
                visited_edges.insert((hop.edge_index, hop.direction));
                steps.push(Step {
                    source_node_id: target.clone(),
                    target_node_id: source.clone(),
                    action_set_id,
                    transition_direction: hop.direction,
                    step_type: ReturnStrategy::Direct,
                });
                edge_state.insert(hop.edge_index, EdgeState::ReturnDone);
                edge_state.insert(edge_index, EdgeState::ReturnDone);
                return Ok(());
            }
        }
    }

    // Strategy 2: Bidirectional — the same edge carries a reverse action set.
    let edge = &tree.edges[edge_index];
    if edge.is_bidirectional() {
        let reverse_set = edge.reverse_action_set().expect("is_bidirectional implies a second action set");
        steps.push(Step {
            source_node_id: target.clone(),
            target_node_id: source.clone(),
            action_set_id: reverse_set.id.clone(),
            transition_direction: TransitionDirection::Reverse,
            step_type: ReturnStrategy::Bidirectional,
        });
        edge_state.insert(edge_index, EdgeState::ReturnDone);
        return Ok(());
    }

    // Strategy 3: Transitional — a bounded path of real edges back to source.
    if options.enable_transitional_fallback {
        if let Some(path) = shortest_forward_path(tree, adjacency, target, source, options.max_transitional_steps) {
            let mut cursor = target.clone();
            for hop in path {
                let candidate = &tree.edges[hop.edge_index];
                let (hop_source, hop_target) = match hop.direction {
                    TransitionDirection::Forward => (candidate.source_node_id.clone(), candidate.target_node_id.clone()),
                    TransitionDirection::Reverse => (candidate.target_node_id.clone(), candidate.source_node_id.clone()),
                };
                let action_set_id = match hop.direction {
                    TransitionDirection::Forward => candidate.default_action_set_id.clone(),
                    TransitionDirection::Reverse => candidate.reverse_action_set().expect("transitional hop only uses edges with a reverse set").id.clone(),
                };
                steps.push(Step {
                    source_node_id: hop_source,
                    target_node_id: hop_target,
                    action_set_id,
                    transition_direction: hop.direction,
                    step_type: ReturnStrategy::Transitional,
                });
                cursor = candidate.target_node_id.clone();
            }
            let _ = cursor;
            edge_state.insert(edge_index, EdgeState::ReturnDone);
            return Ok(());
        }
    }

    // Strategy 4: Skip — record as unreachable, never fail the sequence.
    steps.push(Step {
        source_node_id: target.clone(),
        target_node_id: source.clone(),
        action_set_id: edge.default_action_set_id.clone(),
        transition_direction: TransitionDirection::Forward,
        step_type: ReturnStrategy::Skipped,
    });
    edge_state.insert(edge_index, EdgeState::ReturnSkipped);
    Ok(())
}

/// Bounded BFS for the transitional-return fallback; returns the hop
/// sequence of the first path found within `max_steps` edges.
fn shortest_forward_path(
    tree: &Tree,
    adjacency: &HashMap<NodeId, Vec<DirectedHop>>,
    from: &NodeId,
    to: &NodeId,
    max_steps: u32,
) -> Option<Vec<DirectedHop>> {
    let _ = tree;
    let mut queue = VecDeque::new();
    let mut visited = HashSet::new();
    queue.push_back((from.clone(), Vec::<DirectedHop>::new()));
    visited.insert(from.clone());

    while let Some((node, path)) = queue.pop_front() {
        if path.len() as u32 > max_steps {
            continue;
        }
        if &node == to && !path.is_empty() {
            return Some(path);
        }
        if path.len() as u32 == max_steps {
            continue;
        }
        let Some(hops) = adjacency.get(&node) else {
            continue;
        };
        for hop in hops {
            let edge = &tree.edges[hop.edge_index];
            let next = match hop.direction {
                TransitionDirection::Forward => edge.target_node_id.clone(),
                TransitionDirection::Reverse => edge.source_node_id.clone(),
            };
            if visited.insert(next.clone()) {
                let mut next_path = path.clone();
                next_path.push(hop.clone());
                queue.push_back((next, next_path));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::EdgeId;
    use crate::core::ids::TeamId;
    use crate::core::ids::TreeId;
    use crate::core::tree::Action;
    use crate::core::tree::ActionSet;
    use crate::core::tree::Edge;
    use crate::core::tree::Node;
    use crate::core::tree::NodeType;

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

    fn action_set(id: &str, command: &str) -> ActionSet {
        ActionSet {
            id: ActionSetId::new(id),
            label: id.to_string(),
            priority: 0,
            timer: None,
            conditions: None,
            actions: vec![Action {
                command: command.to_string(),
                params: serde_json::json!({}),
            }],
            retry_actions: vec![],
            failure_actions: vec![],
        }
    }

    /// Scenario 1 from §8: bidirectional `live -> live_fullscreen`.
    #[test]
    fn bidirectional_return_produces_forward_then_reverse() {
        let tree = Tree {
            tree_id: TreeId::new("t1"),
            team_id: TeamId::new("team1"),
            name: "horizon".to_string(),
            tree_depth: 0,
            is_root_tree: true,
            parent_tree_id: None,
            parent_node_id: None,
            nodes: vec![node("live", true), node("live_fullscreen", false)],
            edges: vec![Edge {
                edge_id: EdgeId::new("e1"),
                source_node_id: NodeId::new("live"),
                target_node_id: NodeId::new("live_fullscreen"),
                action_sets: vec![action_set("open", "press_key:OK"), action_set("close", "press_key:BACK")],
                default_action_set_id: ActionSetId::new("open"),
                final_wait_time: 0,
                priority: 0,
                threshold: 0.0,
            }],
        };

        let steps = validation_sequence(&tree, ValidationOptions::default()).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].source_node_id, NodeId::new("live"));
        assert_eq!(steps[0].target_node_id, NodeId::new("live_fullscreen"));
        assert_eq!(steps[0].action_set_id, ActionSetId::new("open"));
        assert_eq!(steps[0].transition_direction, TransitionDirection::Forward);
        assert_eq!(steps[1].source_node_id, NodeId::new("live_fullscreen"));
        assert_eq!(steps[1].target_node_id, NodeId::new("live"));
        assert_eq!(steps[1].action_set_id, ActionSetId::new("close"));
        assert_eq!(steps[1].transition_direction, TransitionDirection::Reverse);
    }

    #[test]
    fn unreachable_return_is_skipped_not_failed() {
        let tree = Tree {
            tree_id: TreeId::new("t1"),
            team_id: TeamId::new("team1"),
            name: "horizon".to_string(),
            tree_depth: 0,
            is_root_tree: true,
            parent_tree_id: None,
            parent_node_id: None,
            nodes: vec![node("a", true), node("b", false)],
            edges: vec![Edge {
                edge_id: EdgeId::new("e1"),
                source_node_id: NodeId::new("a"),
                target_node_id: NodeId::new("b"),
                action_sets: vec![action_set("open", "press_key:OK")],
                default_action_set_id: ActionSetId::new("open"),
                final_wait_time: 0,
                priority: 0,
                threshold: 0.0,
            }],
        };

        let steps = validation_sequence(
            &tree,
            ValidationOptions {
                enable_transitional_fallback: false,
                max_transitional_steps: 3,
            },
        )
        .unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].step_type, ReturnStrategy::Skipped);
    }
}
