// vpt-core/src/interfaces/mod.rs
// ============================================================================
// Module: Core Interfaces
// Description: Backend-agnostic interfaces for persistence and controller
//              dispatch.
// Purpose: Define the contract surfaces the navigation engine, executor, and
//          AI plan cache depend on without embedding a storage or transport
//          backend (§6.3, §6.4, §4.4).
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! `vpt-store-sqlite` implements [`PersistenceStore`]; `vpt-controllers`
//! implements [`CommandDispatcher`]. Everything in [`crate::navigation`],
//! [`crate::executor`], and [`crate::ai_cache`] is generic over these traits
//! so they can be exercised against an in-memory double in tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::core::ids::DeviceId;
use crate::core::ids::EdgeId;
use crate::core::ids::FingerprintId;
use crate::core::ids::FolderId;
use crate::core::ids::NodeId;
use crate::core::ids::TagId;
use crate::core::ids::TeamId;
use crate::core::ids::TestcaseId;
use crate::core::ids::TreeId;
use crate::core::CoreError;
use crate::core::Edge;
use crate::core::ExecutionResult;
use crate::core::Folder;
use crate::core::Node;
use crate::core::Tag;
use crate::core::Testcase;
use crate::core::Tree;
use crate::core::CachedPlan;

// ============================================================================
// SECTION: Persistence Store
// ============================================================================

/// A page of nodes, for `tree.nodes.listPaginated` (§6.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePage {
    pub nodes: Vec<Node>,
    /// `true` when more pages remain after this one.
    pub has_more: bool,
}

/// Candidate filter for `ai_plan.findCompatible` (§4.3 Lookup step 2).
#[derive(Debug, Clone, PartialEq)]
pub struct PlanCandidateFilter {
    pub normalized_prompt: String,
    pub device_model: String,
    pub ui_name: String,
}

/// Metric update applied to a cached plan after an execution completes
/// (§4.3 Storage rule).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanMetricUpdate {
    pub succeeded: bool,
    pub execution_time_ms: u64,
}

/// Backend-agnostic persistence contract (§6.3). Every method maps to one
/// of the entity operations the spec enumerates; none of them perform
/// cross-entity orchestration (that belongs to the navigation engine,
/// executor, or the HTTP layer calling these in sequence).
pub trait PersistenceStore {
    // -- tree.metadata ------------------------------------------------------

    /// # Errors
    /// Returns [`CoreError::NotFound`] when no tree with this id exists.
    fn get_tree(&self, team_id: &TeamId, tree_id: &TreeId) -> Result<Tree, CoreError>;

    /// Inserts or replaces a tree's metadata. Invalidates any navigation
    /// cache entry keyed by this tree's hierarchy root.
    fn save_tree(&self, tree: &Tree) -> Result<(), CoreError>;

    /// Deletes a tree. Callers needing cascade-delete semantics (§3, §6.5)
    /// must resolve descendants first; this call is single-entity only.
    fn delete_tree(&self, team_id: &TeamId, tree_id: &TreeId) -> Result<(), CoreError>;

    /// Returns the direct child trees anchored at `(tree_id, node_id)`.
    fn child_trees(&self, team_id: &TeamId, tree_id: &TreeId, node_id: &NodeId) -> Result<Vec<Tree>, CoreError>;

    // -- tree.nodes -----------------------------------------------------------

    fn list_nodes(&self, team_id: &TeamId, tree_id: &TreeId, page: u32, limit: u32) -> Result<NodePage, CoreError>;

    fn save_node(&self, team_id: &TeamId, tree_id: &TreeId, node: &Node) -> Result<(), CoreError>;

    fn delete_node(&self, team_id: &TeamId, tree_id: &TreeId, node_id: &NodeId) -> Result<(), CoreError>;

    // -- tree.edges -----------------------------------------------------------

    /// `node_ids`, when non-empty, restricts the result to edges touching
    /// one of those nodes (§6.1 `edges?node_ids=csv`).
    fn list_edges(&self, team_id: &TeamId, tree_id: &TreeId, node_ids: &[NodeId]) -> Result<Vec<Edge>, CoreError>;

    fn save_edge(&self, team_id: &TeamId, tree_id: &TreeId, edge: &Edge) -> Result<(), CoreError>;

    fn delete_edge(&self, team_id: &TeamId, tree_id: &TreeId, edge_id: &EdgeId) -> Result<(), CoreError>;

    // -- testcase ---------------------------------------------------------

    fn save_testcase(&self, testcase: &Testcase) -> Result<(), CoreError>;

    fn list_testcases(&self, team_id: &TeamId) -> Result<Vec<Testcase>, CoreError>;

    fn get_testcase(&self, team_id: &TeamId, testcase_id: &TestcaseId) -> Result<Testcase, CoreError>;

    fn delete_testcase(&self, team_id: &TeamId, testcase_id: &TestcaseId) -> Result<(), CoreError>;

    fn list_executions(&self, team_id: &TeamId, testcase_id: &TestcaseId) -> Result<Vec<ExecutionResult>, CoreError>;

    // -- folder / tag -------------------------------------------------------

    fn get_or_create_folder(&self, team_id: &TeamId, name: &str) -> Result<FolderId, CoreError>;

    fn get_or_create_tag(&self, team_id: &TeamId, name: &str) -> Result<Tag, CoreError>;

    fn list_folders(&self, team_id: &TeamId) -> Result<Vec<Folder>, CoreError>;

    fn list_tags(&self, team_id: &TeamId) -> Result<Vec<Tag>, CoreError>;

    /// Sets the full tag set for one executable (a testcase or a script),
    /// replacing whatever was previously assigned.
    fn set_executable_tags(&self, team_id: &TeamId, executable_type: &str, executable_id: &str, tag_names: &[String]) -> Result<(), CoreError>;

    // -- ai_plan --------------------------------------------------------------

    fn get_plan_by_fingerprint(&self, team_id: &TeamId, fingerprint: &FingerprintId) -> Result<Option<CachedPlan>, CoreError>;

    fn find_compatible_plans(&self, team_id: &TeamId, filter: &PlanCandidateFilter) -> Result<Vec<CachedPlan>, CoreError>;

    /// Upserts by fingerprint (§4.3 Storage rule). Callers are responsible
    /// for only invoking this when the strict storage rule holds.
    fn upsert_plan(&self, team_id: &TeamId, plan: &CachedPlan) -> Result<(), CoreError>;

    fn update_plan_metrics(&self, team_id: &TeamId, fingerprint: &FingerprintId, update: PlanMetricUpdate, failure_reason: Option<&str>) -> Result<(), CoreError>;

    fn invalidate_plan(&self, team_id: &TeamId, fingerprint: &FingerprintId) -> Result<(), CoreError>;

    /// Daily maintenance: applies the §4.3 Eviction rules. Returns the
    /// number of entries removed.
    fn maintenance_evict_plans(&self, team_id: &TeamId) -> Result<u64, CoreError>;

    // -- script_result / alert ----------------------------------------------

    fn insert_script_result(&self, team_id: &TeamId, result: &ExecutionResult) -> Result<(), CoreError>;

    fn update_script_result(&self, team_id: &TeamId, result: &ExecutionResult) -> Result<(), CoreError>;

    fn list_script_results(&self, team_id: &TeamId, executable_type: &str, executable_id: &str) -> Result<Vec<ExecutionResult>, CoreError>;

    fn insert_alert(&self, team_id: &TeamId, message: &str, severity: &str) -> Result<(), CoreError>;

    fn update_alert(&self, team_id: &TeamId, alert_id: i64, resolved: bool) -> Result<(), CoreError>;
}

// ============================================================================
// SECTION: Command Dispatcher (Controller Registry client view)
// ============================================================================

/// The Executor's view of the Controller Registry (§4.4): dispatch one
/// opaque command to whichever controller owns its category, for a given
/// device. Implemented by `vpt-controllers`; the Host process owns the
/// concrete registry and is the only caller allowed to invoke it (GLOSSARY
/// "Host").
pub trait CommandDispatcher {
    /// # Errors
    /// Returns [`CoreError::DeviceUnavailable`] when the device's model
    /// declares no driver for the command's category, or the device is
    /// offline. Returns [`CoreError::StepFailed`] for a controller-reported
    /// failure, and [`CoreError::Transient`] for a timeout or retryable
    /// dependency error.
    fn execute_command(
        &self,
        device_id: &DeviceId,
        command: &str,
        params: &Value,
    ) -> Result<CommandOutcome, CoreError>;
}

/// The result of one dispatched command, with optional evidence URIs
/// attached by the owning controller (§4.2 Evidence, §6.4).
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub success: bool,
    pub evidence_uris: Vec<String>,
}

/// Caller-supplied tie-break preferences for action-set selection at
/// execution time (§9 open questions: the default is
/// `default_action_set_id` unless these are supplied).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ActionSetPreference {
    #[serde(default)]
    pub prefer_timer_actions: bool,
    #[serde(default)]
    pub preferred_commands: Vec<String>,
}

impl ActionSetPreference {
    /// No preference: use the edge's `default_action_set_id`.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }
}
