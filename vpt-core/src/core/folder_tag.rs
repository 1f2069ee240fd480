// vpt-core/src/core/folder_tag.rs
// ============================================================================
// Module: Folder and Tag Data Model
// Description: Flat organizational structures for testcases and scripts.
// Purpose: Back the folder/tag CRUD surface and the executable listing
//          aggregation (§6.1, §6.3, §6.5).
// Dependencies: crate::core::ids, serde
// ============================================================================

//! ## Overview
//! Folders and tags are flat (no nested folders); `folder_id = 0` is the
//! reserved root. Tags are assigned a color from a fixed 12-entry palette at
//! creation time, picked deterministically from the tag's insertion order so
//! `getOrCreate` stays idempotent without needing a read-modify-write on a
//! "next color" counter.

use serde::Deserialize;
use serde::Serialize;

use crate::core::ids::FolderId;
use crate::core::ids::TagId;
use crate::core::ids::TeamId;

/// Fixed palette tags are assigned from on creation, by `id % 12`.
pub const TAG_COLOR_PALETTE: [&str; 12] = [
    "#F44336", "#E91E63", "#9C27B0", "#673AB7", "#3F51B5", "#2196F3", "#009688", "#4CAF50",
    "#8BC34A", "#FF9800", "#FF5722", "#795548",
];

/// Picks a palette color for a newly created tag from its assigned id.
#[must_use]
pub fn color_for_tag(id: TagId) -> &'static str {
    let index = (id.value().rem_euclid(TAG_COLOR_PALETTE.len() as i64)) as usize;
    TAG_COLOR_PALETTE[index]
}

/// A flat folder for organizing testcases and scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub folder_id: FolderId,
    pub team_id: TeamId,
    pub name: String,
}

/// A flat tag applied to testcases and scripts via `executable_tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag_id: TagId,
    pub team_id: TeamId,
    /// Unique lowercase within the team.
    pub name: String,
    pub color: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_assignment_wraps_at_palette_length() {
        assert_eq!(color_for_tag(TagId::new(0)), TAG_COLOR_PALETTE[0]);
        assert_eq!(color_for_tag(TagId::new(12)), TAG_COLOR_PALETTE[0]);
        assert_eq!(color_for_tag(TagId::new(13)), TAG_COLOR_PALETTE[1]);
    }
}
