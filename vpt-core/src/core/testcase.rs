// vpt-core/src/core/testcase.rs
// ============================================================================
// Module: Testcase Data Model
// Description: Stored testcase rows, independent of AI-generated plan caching.
// Purpose: Carry the execution-ready graph alongside organizational metadata.
// Dependencies: crate::core::{ids, folder_tag}, serde, serde_json
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::ids::FolderId;
use crate::core::ids::TagId;
use crate::core::ids::TeamId;
use crate::core::ids::TestcaseId;

/// How a testcase came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationMethod {
    Visual,
    Ai,
}

/// A stored testcase. `graph_json` uses the execution-time graph shape the
/// executor consumes directly (§4.2); it is opaque to everything except the
/// executor and navigation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Testcase {
    pub testcase_id: TestcaseId,
    pub team_id: TeamId,
    /// Unique per team.
    pub name: String,
    pub ui_name: String,
    pub graph_json: Value,
    pub creation_method: CreationMethod,
    pub ai_prompt: Option<String>,
    pub ai_analysis: Option<Value>,
    pub folder_id: FolderId,
    pub tags: Vec<TagId>,
}
