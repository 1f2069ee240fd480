// vpt-core/src/navigation/cache.rs
// ============================================================================
// Module: Navigation Cache
// Description: The single process-local cache of built hierarchies and
//              unified graphs, keyed by (team_id, root_tree_id) (§4.1, §5).
// Purpose: Avoid rebuilding the unified graph on every FindPath/
//          ValidationSequence call; invalidated explicitly on writes, never
//          time-based.
// Dependencies: crate::navigation::{hierarchy, unified}, std::sync
// ============================================================================

//! ## Overview
//! Single writer, many readers (§5): a [`std::sync::RwLock`] around a
//! [`std::collections::HashMap`]. Entries are stored behind an [`Arc`] so a
//! reader can hold its snapshot after releasing the lock, which keeps
//! [`FindPath`](crate::navigation::find_path) and
//! [`ValidationSequence`](crate::navigation::validation_sequence) calls from
//! serializing against concurrent cache writes for unrelated hierarchies.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use crate::core::ids::TeamId;
use crate::core::ids::TreeId;
use crate::navigation::hierarchy::Hierarchy;
use crate::navigation::unified::UnifiedGraph;

/// One cached hierarchy plus its assembled unified graph.
pub struct CacheEntry {
    pub hierarchy: Hierarchy,
    pub unified: UnifiedGraph,
}

type CacheKey = (TeamId, TreeId);

/// The navigation cache: `(team_id, root_tree_id) -> CacheEntry`.
pub struct NavigationCache {
    entries: RwLock<HashMap<CacheKey, Arc<CacheEntry>>>,
}

impl Default for NavigationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached entry for `(team_id, root_tree_id)`, if present.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panic while held.
    #[must_use]
    pub fn get(&self, team_id: &TeamId, root_tree_id: &TreeId) -> Option<Arc<CacheEntry>> {
        let key = (team_id.clone(), root_tree_id.clone());
        self.entries.read().expect("navigation cache lock poisoned").get(&key).cloned()
    }

    /// Inserts or replaces the cache entry for `(team_id, root_tree_id)`.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panic while held.
    pub fn insert(&self, team_id: TeamId, root_tree_id: TreeId, hierarchy: Hierarchy, unified: UnifiedGraph) {
        let key = (team_id, root_tree_id);
        self.entries
            .write()
            .expect("navigation cache lock poisoned")
            .insert(key, Arc::new(CacheEntry { hierarchy, unified }));
    }

    /// Drops the cache entry for `(team_id, root_tree_id)`, forcing the next
    /// lookup to rebuild from the persistence store.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panic while held.
    pub fn invalidate(&self, team_id: &TeamId, root_tree_id: &TreeId) {
        let key = (team_id.clone(), root_tree_id.clone());
        self.entries.write().expect("navigation cache lock poisoned").remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::unified::UnifiedGraph;
    use petgraph::graph::DiGraph;
    use std::collections::HashMap as StdHashMap;

    fn empty_unified() -> UnifiedGraph {
        UnifiedGraph {
            graph: DiGraph::new(),
            index: StdHashMap::new(),
            location: StdHashMap::new(),
        }
    }

    #[test]
    fn insert_then_get_then_invalidate() {
        let cache = NavigationCache::new();
        let team = TeamId::new("team1");
        let root = TreeId::new("root");

        assert!(cache.get(&team, &root).is_none());

        cache.insert(
            team.clone(),
            root.clone(),
            Hierarchy {
                root_tree_id: root.clone(),
                trees: vec![],
            },
            empty_unified(),
        );
        assert!(cache.get(&team, &root).is_some());

        cache.invalidate(&team, &root);
        assert!(cache.get(&team, &root).is_none());
    }
}
