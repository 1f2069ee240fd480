// vpt-core/src/core/mod.rs
// ============================================================================
// Module: Core Types
// Description: Canonical data model shared by the navigation engine, executor,
//              AI plan cache, and every persistence/HTTP boundary.
// Purpose: Provide stable, serializable types that are the single source of
//          truth for derived API surfaces (Server/Host HTTP, sqlite rows).
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types carry no behavior beyond what their own invariants require.
//! Graph traversal lives in [`crate::navigation`] and [`crate::executor`];
//! fingerprinting and reuse scoring live in [`crate::ai_cache`].

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod error;
pub mod execution;
pub mod folder_tag;
pub mod hashing;
pub mod ids;
pub mod plan_cache;
pub mod testcase;
pub mod tree;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::CoreError;
pub use error::CoreResult;
pub use execution::ExecGraph;
pub use execution::ExecNode;
pub use execution::ExecNodeKind;
pub use execution::ExecutionContext;
pub use execution::ExecutionResult;
pub use execution::ScriptType;
pub use execution::StepRecord;
pub use folder_tag::Folder;
pub use folder_tag::Tag;
pub use folder_tag::TAG_COLOR_PALETTE;
pub use ids::ActionSetId;
pub use ids::DeviceId;
pub use ids::EdgeId;
pub use ids::FingerprintId;
pub use ids::FolderId;
pub use ids::HostId;
pub use ids::NodeId;
pub use ids::TagId;
pub use ids::TaskId;
pub use ids::TeamId;
pub use ids::TestcaseId;
pub use ids::TreeId;
pub use plan_cache::CachedPlan;
pub use plan_cache::ReuseDecision;
pub use testcase::CreationMethod;
pub use testcase::Testcase;
pub use tree::Action;
pub use tree::ActionSet;
pub use tree::Edge;
pub use tree::Node;
pub use tree::NodeType;
pub use tree::Tree;
pub use tree::Verification;
