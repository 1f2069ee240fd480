// vpt-core/src/core/plan_cache.rs
// ============================================================================
// Module: AI Plan Cache Data Model
// Description: The CachedPlan row and the reuse-decision classification.
// Purpose: Carry everything the AI plan cache (crate::ai_cache) needs to
//          score and store execution graphs by fingerprint.
// Dependencies: crate::core::ids, serde, serde_json, chrono
// ============================================================================

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::ids::FingerprintId;

/// A successful execution graph, keyed by `fingerprint`, kept for reuse
/// (§4.3). `success_rate` is derived, not stored independently, to keep the
/// row from drifting out of sync with its own counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPlan {
    pub fingerprint: FingerprintId,
    pub normalized_prompt: String,
    pub intent: String,
    pub target: String,
    pub device_model: String,
    pub ui_name: String,
    pub available_nodes: Vec<String>,
    /// Opaque, used for the jaccard-similarity compatibility check, not
    /// compared by equality.
    pub context_signature: String,
    pub graph: Value,
    pub success_count: u64,
    pub failure_count: u64,
    pub execution_count: u64,
    pub avg_execution_time_ms: f64,
    pub last_used: DateTime<Utc>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub failure_reasons: Vec<String>,
}

impl CachedPlan {
    /// `success_count / execution_count`; `0.0` when never executed.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.execution_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.execution_count as f64
        }
    }
}

/// The §4.3 reuse-decision classification for a candidate cached plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReuseDecision {
    /// `success_rate >= 0.8 && execution_count >= 2`.
    HighConfidence,
    /// `success_rate >= 0.6`.
    ReuseWithMonitoring,
    /// `success_rate < 0.5`, or the cached graph failed to parse.
    Discard,
    /// Neither threshold matched; treated the same as a miss by the caller.
    Indeterminate,
}

impl ReuseDecision {
    /// True for `HighConfidence` and `ReuseWithMonitoring`.
    #[must_use]
    pub fn should_reuse(self) -> bool {
        matches!(self, Self::HighConfidence | Self::ReuseWithMonitoring)
    }
}

/// Classifies a plan's reuse decision from its recorded counters (§4.3).
/// Graph-format validity is checked by the caller before invoking this, since
/// that check needs the executor's graph parser, not just these counters.
#[must_use]
pub fn classify_reuse(plan: &CachedPlan) -> ReuseDecision {
    let rate = plan.success_rate();
    if rate >= 0.8 && plan.execution_count >= 2 {
        ReuseDecision::HighConfidence
    } else if rate >= 0.6 {
        ReuseDecision::ReuseWithMonitoring
    } else if rate < 0.5 {
        ReuseDecision::Discard
    } else {
        ReuseDecision::Indeterminate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with(success: u64, executions: u64) -> CachedPlan {
        CachedPlan {
            fingerprint: FingerprintId::new("f"),
            normalized_prompt: "navigation_live".to_string(),
            intent: "navigation".to_string(),
            target: "live".to_string(),
            device_model: "android_mobile".to_string(),
            ui_name: "horizon_android_mobile".to_string(),
            available_nodes: vec!["home".to_string(), "live".to_string()],
            context_signature: "sig".to_string(),
            graph: serde_json::json!({"nodes": [], "edges": []}),
            success_count: success,
            failure_count: executions - success,
            execution_count: executions,
            avg_execution_time_ms: 1200.0,
            last_used: Utc::now(),
            last_success: None,
            last_failure: None,
            failure_reasons: vec![],
        }
    }

    #[test]
    fn high_confidence_needs_two_executions() {
        let plan = plan_with(1, 1);
        assert_eq!(classify_reuse(&plan), ReuseDecision::ReuseWithMonitoring);
        let plan = plan_with(2, 2);
        assert_eq!(classify_reuse(&plan), ReuseDecision::HighConfidence);
    }

    #[test]
    fn low_success_rate_discards() {
        let plan = plan_with(1, 3);
        assert_eq!(classify_reuse(&plan), ReuseDecision::Discard);
    }
}
