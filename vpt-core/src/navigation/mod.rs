// vpt-core/src/navigation/mod.rs
// ============================================================================
// Module: Navigation Engine
// Description: Hierarchy loading, unified-graph assembly, pathfinding, and
//              validation-sequence generation over tree hierarchies (§4.1,
//              §4.2b).
// Purpose: The only component allowed to build or read the unified graph;
//          everything else asks it for paths.
// Dependencies: crate::{core, interfaces}, petgraph
// ============================================================================

//! ## Overview
//! [`NavigationEngine`] ties together [`hierarchy::load_hierarchy`],
//! [`unified::build_unified`], [`pathfind::find_path`], and
//! [`validation::validation_sequence`] behind the single cache described in
//! §4.1: keyed by `(root_tree_id, team_id)`, invalidated (not expired) on any
//! write to a node, edge, or tree in the hierarchy.

pub mod cache;
pub mod hierarchy;
pub mod pathfind;
pub mod unified;
pub mod validation;

pub use cache::NavigationCache;
pub use hierarchy::Hierarchy;
pub use pathfind::find_path;
pub use unified::EdgeKind;
pub use unified::EdgeMeta;
pub use unified::UnifiedGraph;
pub use validation::validation_sequence;
pub use validation::Step;
pub use validation::ValidationOptions;

use crate::core::error::CoreError;
use crate::core::ids::NodeId;
use crate::core::ids::TeamId;
use crate::core::ids::TreeId;
use crate::core::execution::Transition;
use crate::interfaces::ActionSetPreference;
use crate::interfaces::PersistenceStore;

/// The navigation engine: loads hierarchies, builds and caches unified
/// graphs, and answers pathfinding and validation-sequence queries.
pub struct NavigationEngine {
    cache: NavigationCache,
}

impl Default for NavigationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: NavigationCache::new(),
        }
    }

    /// `LoadHierarchy` + `BuildUnified`, populating the cache on success.
    ///
    /// # Errors
    /// Returns [`CoreError::NotFound`] when the root tree is missing,
    /// [`CoreError::ValidationError`] for `HierarchyDepthExceeded` or
    /// `BrokenParentLink`, or a structural validation failure from
    /// `BuildUnified`.
    pub fn load_and_build<S: PersistenceStore>(
        &self,
        store: &S,
        team_id: &TeamId,
        root_tree_id: &TreeId,
    ) -> Result<(), CoreError> {
        let hierarchy = hierarchy::load_hierarchy(store, team_id, root_tree_id)?;
        let unified = unified::build_unified(&hierarchy)?;
        self.cache.insert(team_id.clone(), root_tree_id.clone(), hierarchy, unified);
        Ok(())
    }

    /// `FindPath`: unified pathfinding only, no single-tree fallback (§4.1,
    /// §9 open questions). `preference` overrides the default action set on
    /// each hop when the caller supplies one; `None` keeps the
    /// `default_action_set_id` behavior.
    ///
    /// # Errors
    /// Returns [`CoreError::UnifiedCacheMissing`] when no unified graph is
    /// cached for `(root_tree_id, team_id)`.
    pub fn find_path(
        &self,
        team_id: &TeamId,
        root_tree_id: &TreeId,
        start_node_id: Option<&NodeId>,
        target_node_id: &NodeId,
        preference: Option<&ActionSetPreference>,
    ) -> Result<Vec<Transition>, CoreError> {
        let entry = self.cache.get(team_id, root_tree_id).ok_or(CoreError::UnifiedCacheMissing)?;
        pathfind::find_path(&entry.unified, start_node_id, target_node_id, preference)
    }

    /// `ValidationSequence` over an already-cached hierarchy.
    ///
    /// # Errors
    /// Returns [`CoreError::UnifiedCacheMissing`] when the tree's hierarchy
    /// has not been loaded, or [`CoreError::NotFound`] when `tree_id` is not
    /// part of the cached hierarchy.
    pub fn validation_sequence(
        &self,
        team_id: &TeamId,
        root_tree_id: &TreeId,
        tree_id: &TreeId,
        options: ValidationOptions,
    ) -> Result<Vec<Step>, CoreError> {
        let entry = self.cache.get(team_id, root_tree_id).ok_or(CoreError::UnifiedCacheMissing)?;
        let tree = entry
            .hierarchy
            .trees
            .iter()
            .find(|tree| &tree.tree_id == tree_id)
            .ok_or_else(|| CoreError::NotFound(format!("tree {tree_id} not in cached hierarchy")))?;
        validation::validation_sequence(tree, options)
    }

    /// Invalidates the cache entry for `(root_tree_id, team_id)`. Call this
    /// after any write to a node, edge, or tree within the hierarchy.
    pub fn invalidate(&self, team_id: &TeamId, root_tree_id: &TreeId) {
        self.cache.invalidate(team_id, root_tree_id);
    }
}
