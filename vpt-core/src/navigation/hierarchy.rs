// vpt-core/src/navigation/hierarchy.rs
// ============================================================================
// Module: Hierarchy Loading
// Description: LoadHierarchy — walks parent_tree_id/parent_node_id links to
//              produce an ordered tree list for one root (§4.1).
// Purpose: The first stage of navigation-cache population; everything
//          downstream (unified graph, pathfinding, validation) operates on
//          the Hierarchy this produces.
// Dependencies: crate::{core, interfaces}
// ============================================================================

use crate::core::error::CoreError;
use crate::core::ids::TeamId;
use crate::core::ids::TreeId;
use crate::core::tree::MAX_TREE_DEPTH;
use crate::core::tree::Tree;
use crate::interfaces::PersistenceStore;

/// A root tree plus all nested trees reachable via `parent_tree_id`
/// (GLOSSARY "Hierarchy"), ordered from depth 0 to deepest.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    pub root_tree_id: TreeId,
    pub trees: Vec<Tree>,
}

impl Hierarchy {
    #[must_use]
    pub fn tree(&self, tree_id: &TreeId) -> Option<&Tree> {
        self.trees.iter().find(|tree| &tree.tree_id == tree_id)
    }
}

/// `LoadHierarchy(root_tree_id, team_id) → Hierarchy` (§4.1).
///
/// # Errors
/// - [`CoreError::NotFound`] when the root tree is missing.
/// - [`CoreError::ValidationError`] tagged `HierarchyDepthExceeded` when a
///   subtree's depth exceeds [`MAX_TREE_DEPTH`].
/// - [`CoreError::ValidationError`] tagged `BrokenParentLink` when a
///   subtree's `parent_node_id` does not exist in its declared parent tree.
pub fn load_hierarchy<S: PersistenceStore>(
    store: &S,
    team_id: &TeamId,
    root_tree_id: &TreeId,
) -> Result<Hierarchy, CoreError> {
    let root = store.get_tree(team_id, root_tree_id)?;
    if !root.is_root_tree {
        return Err(CoreError::ValidationError(format!(
            "tree {root_tree_id} is not a root tree"
        )));
    }

    let mut trees = vec![root];
    let mut frontier = vec![0usize];

    while !frontier.is_empty() {
        let mut next_frontier = Vec::new();
        for &index in &frontier {
            let parent_tree_id = trees[index].tree_id.clone();
            let subtree_node_ids: Vec<_> = trees[index]
                .nodes
                .iter()
                .filter(|node| node.has_subtree)
                .map(|node| node.node_id.clone())
                .collect();

            for node_id in subtree_node_ids {
                let parent_has_node = trees[index].nodes.iter().any(|node| node.node_id == node_id);
                if !parent_has_node {
                    return Err(CoreError::ValidationError(format!(
                        "BrokenParentLink: tree {parent_tree_id} has no node {node_id} for its declared subtree"
                    )));
                }

                let children = store.child_trees(team_id, &parent_tree_id, &node_id)?;
                for child in children {
                    if child.tree_depth > MAX_TREE_DEPTH {
                        return Err(CoreError::ValidationError(format!(
                            "HierarchyDepthExceeded: tree {} at depth {} exceeds {MAX_TREE_DEPTH}",
                            child.tree_id, child.tree_depth
                        )));
                    }
                    if child.parent_tree_id.as_ref() != Some(&parent_tree_id)
                        || child.parent_node_id.as_ref() != Some(&node_id)
                    {
                        return Err(CoreError::ValidationError(format!(
                            "BrokenParentLink: tree {} does not declare ({parent_tree_id}, {node_id}) as its parent",
                            child.tree_id
                        )));
                    }
                    next_frontier.push(trees.len());
                    trees.push(child);
                }
            }
        }
        frontier = next_frontier;
    }

    trees.sort_by_key(|tree| tree.tree_depth);

    Ok(Hierarchy {
        root_tree_id: root_tree_id.clone(),
        trees,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::NodeId;
    use crate::core::tree::Node;
    use crate::core::tree::NodeType;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeStore {
        trees: RefCell<HashMap<TreeId, Tree>>,
    }

    impl FakeStore {
        fn new(trees: Vec<Tree>) -> Self {
            let mut map = HashMap::new();
            for tree in trees {
                map.insert(tree.tree_id.clone(), tree);
            }
            Self {
                trees: RefCell::new(map),
            }
        }
    }

    fn blank_node(id: &str, has_subtree: bool) -> Node {
        Node {
            node_id: NodeId::new(id),
            label: id.to_string(),
            node_type: NodeType::Screen,
            position_x: 0.0,
            position_y: 0.0,
            is_root: id == "root",
            verifications: vec![],
            has_subtree,
            subtree_count: u32::from(has_subtree),
            screenshot: None,
        }
    }

    fn blank_tree(id: &str, depth: u32, parent: Option<(&str, &str)>, nodes: Vec<Node>) -> Tree {
        Tree {
            tree_id: TreeId::new(id),
            team_id: TeamId::new("team1"),
            name: id.to_string(),
            tree_depth: depth,
            is_root_tree: parent.is_none(),
            parent_tree_id: parent.map(|(t, _)| TreeId::new(t)),
            parent_node_id: parent.map(|(_, n)| NodeId::new(n)),
            nodes,
            edges: vec![],
        }
    }

    impl crate::interfaces::PersistenceStore for FakeStore {
        fn get_tree(&self, _team_id: &TeamId, tree_id: &TreeId) -> Result<Tree, CoreError> {
            self.trees
                .borrow()
                .get(tree_id)
                .cloned()
                .ok_or_else(|| CoreError::NotFound(tree_id.to_string()))
        }
        fn save_tree(&self, _tree: &Tree) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn delete_tree(&self, _team_id: &TeamId, _tree_id: &TreeId) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn child_trees(&self, _team_id: &TeamId, tree_id: &TreeId, node_id: &NodeId) -> Result<Vec<Tree>, CoreError> {
            Ok(self
                .trees
                .borrow()
                .values()
                .filter(|tree| tree.parent_tree_id.as_ref() == Some(tree_id) && tree.parent_node_id.as_ref() == Some(node_id))
                .cloned()
                .collect())
        }
        fn list_nodes(&self, _: &TeamId, _: &TreeId, _: u32, _: u32) -> Result<crate::interfaces::NodePage, CoreError> {
            unimplemented!()
        }
        fn save_node(&self, _: &TeamId, _: &TreeId, _: &Node) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn delete_node(&self, _: &TeamId, _: &TreeId, _: &NodeId) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn list_edges(&self, _: &TeamId, _: &TreeId, _: &[NodeId]) -> Result<Vec<crate::core::tree::Edge>, CoreError> {
            unimplemented!()
        }
        fn save_edge(&self, _: &TeamId, _: &TreeId, _: &crate::core::tree::Edge) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn delete_edge(&self, _: &TeamId, _: &TreeId, _: &crate::core::ids::EdgeId) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn save_testcase(&self, _: &crate::core::testcase::Testcase) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn list_testcases(&self, _: &TeamId) -> Result<Vec<crate::core::testcase::Testcase>, CoreError> {
            unimplemented!()
        }
        fn get_testcase(&self, _: &TeamId, _: &crate::core::ids::TestcaseId) -> Result<crate::core::testcase::Testcase, CoreError> {
            unimplemented!()
        }
        fn delete_testcase(&self, _: &TeamId, _: &crate::core::ids::TestcaseId) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn list_executions(&self, _: &TeamId, _: &crate::core::ids::TestcaseId) -> Result<Vec<crate::core::execution::ExecutionResult>, CoreError> {
            unimplemented!()
        }
        fn get_or_create_folder(&self, _: &TeamId, _: &str) -> Result<crate::core::ids::FolderId, CoreError> {
            unimplemented!()
        }
        fn get_or_create_tag(&self, _: &TeamId, _: &str) -> Result<crate::core::folder_tag::Tag, CoreError> {
            unimplemented!()
        }
        fn list_folders(&self, _: &TeamId) -> Result<Vec<crate::core::folder_tag::Folder>, CoreError> {
            unimplemented!()
        }
        fn list_tags(&self, _: &TeamId) -> Result<Vec<crate::core::folder_tag::Tag>, CoreError> {
            unimplemented!()
        }
        fn set_executable_tags(&self, _: &TeamId, _: &str, _: &str, _: &[String]) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn get_plan_by_fingerprint(&self, _: &TeamId, _: &crate::core::ids::FingerprintId) -> Result<Option<crate::core::plan_cache::CachedPlan>, CoreError> {
            unimplemented!()
        }
        fn find_compatible_plans(&self, _: &TeamId, _: &crate::interfaces::PlanCandidateFilter) -> Result<Vec<crate::core::plan_cache::CachedPlan>, CoreError> {
            unimplemented!()
        }
        fn upsert_plan(&self, _: &TeamId, _: &crate::core::plan_cache::CachedPlan) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn update_plan_metrics(&self, _: &TeamId, _: &crate::core::ids::FingerprintId, _: crate::interfaces::PlanMetricUpdate, _: Option<&str>) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn invalidate_plan(&self, _: &TeamId, _: &crate::core::ids::FingerprintId) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn maintenance_evict_plans(&self, _: &TeamId) -> Result<u64, CoreError> {
            unimplemented!()
        }
        fn insert_script_result(&self, _: &TeamId, _: &crate::core::execution::ExecutionResult) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn update_script_result(&self, _: &TeamId, _: &crate::core::execution::ExecutionResult) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn list_script_results(&self, _: &TeamId, _: &str, _: &str) -> Result<Vec<crate::core::execution::ExecutionResult>, CoreError> {
            unimplemented!()
        }
        fn insert_alert(&self, _: &TeamId, _: &str, _: &str) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn update_alert(&self, _: &TeamId, _: i64, _: bool) -> Result<(), CoreError> {
            unimplemented!()
        }
    }

    #[test]
    fn loads_a_two_level_hierarchy_in_depth_order() {
        let root = blank_tree("root", 0, None, vec![blank_node("root", false), blank_node("n1", true)]);
        let child = blank_tree("child", 1, Some(("root", "n1")), vec![blank_node("entry", false)]);
        let store = FakeStore::new(vec![root, child]);

        let hierarchy = load_hierarchy(&store, &TeamId::new("team1"), &TreeId::new("root")).unwrap();
        assert_eq!(hierarchy.trees.len(), 2);
        assert_eq!(hierarchy.trees[0].tree_id, TreeId::new("root"));
        assert_eq!(hierarchy.trees[1].tree_id, TreeId::new("child"));
    }

    #[test]
    fn rejects_depth_exceeding_subtree() {
        let root = blank_tree("root", 0, None, vec![blank_node("n1", true)]);
        let child = blank_tree("child", 6, Some(("root", "n1")), vec![]);
        let store = FakeStore::new(vec![root, child]);

        let err = load_hierarchy(&store, &TeamId::new("team1"), &TreeId::new("root")).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(msg) if msg.contains("HierarchyDepthExceeded")));
    }
}
