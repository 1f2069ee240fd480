// vpt-core/src/ai_cache/mod.rs
// ============================================================================
// Module: AI Plan Cache
// Description: Prompt normalization, fingerprinting, lookup, and storage for
//              successful execution graphs (§4.3).
// Purpose: Let the executor reuse a previously successful AI-generated plan
//          instead of re-invoking the AI provider, scored by success rate.
// Dependencies: crate::{core, interfaces}, tracing
// ============================================================================

//! ## Overview
//! [`AiPlanCache`] wraps a [`PersistenceStore`] and implements the §4.3
//! lookup/storage/eviction contract. Cache misses are logged at `info`, not
//! `error` (§4.3 Logging contract, §7 `CacheMiss`) — a miss means "generate a
//! plan", not "something went wrong".

mod normalize;

pub use normalize::normalize_prompt;
pub use normalize::NormalizedPrompt;

use chrono::Utc;
use serde_json::Value;

use crate::core::error::CoreError;
use crate::core::hashing::md5_hex;
use crate::core::ids::FingerprintId;
use crate::core::ids::TeamId;
use crate::core::plan_cache::classify_reuse;
use crate::core::plan_cache::CachedPlan;
use crate::core::plan_cache::ReuseDecision;
use crate::interfaces::PersistenceStore;
use crate::interfaces::PlanCandidateFilter;
use crate::interfaces::PlanMetricUpdate;

/// EWMA smoothing factor for `avg_execution_time_ms` (§4.3 Storage rule).
const EWMA_ALPHA: f64 = 0.2;

/// Minimum jaccard similarity between `available_nodes` sets for a candidate
/// plan to be considered compatible (§4.3 Lookup step 2).
const JACCARD_COMPATIBLE_THRESHOLD: f64 = 0.8;

/// The execution context a lookup or store call is performed against.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanContext {
    pub device_model: String,
    pub ui_name: String,
    pub available_nodes: Vec<String>,
}

/// Computes the §3/§4.3 fingerprint: `md5(normalized_prompt ∥ device_model ∥
/// ui_name ∥ sorted(available_nodes))`.
#[must_use]
pub fn fingerprint(normalized_prompt: &str, ctx: &PlanContext) -> FingerprintId {
    let mut nodes = ctx.available_nodes.clone();
    nodes.sort();
    let joined = format!(
        "{normalized_prompt}\x1f{}\x1f{}\x1f{}",
        ctx.device_model,
        ctx.ui_name,
        nodes.join(",")
    );
    FingerprintId::new(md5_hex(joined.as_bytes()))
}

/// Outcome of a [`AiPlanCache::lookup`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    /// A candidate was found and its reuse decision allows reuse.
    Reuse { plan: CachedPlan, decision: ReuseDecision },
    /// A candidate exists but its success rate or graph validity rules it
    /// out; callers should discard it and generate fresh.
    Discard { plan: CachedPlan },
    /// No fingerprint or compatible candidate exists (§7 `CacheMiss`, not an
    /// error).
    Miss,
}

/// Fingerprinting, lookup, conditional storage, and metric updates for the
/// AI plan cache (§4.3). Stateless beyond the store it wraps: every call
/// reads/writes through `S` so there is nothing here to keep a
/// reader-writer lock around.
pub struct AiPlanCache;

impl AiPlanCache {
    /// §4.3 Lookup: exact fingerprint hit first, then `normalized_prompt` +
    /// device/UI match + jaccard-compatible `available_nodes`, ranked by
    /// `success_rate DESC, execution_count DESC, last_used DESC`.
    ///
    /// # Errors
    /// Propagates persistence errors from `store`.
    pub fn lookup<S: PersistenceStore>(
        store: &S,
        team_id: &TeamId,
        prompt: &str,
        ctx: &PlanContext,
    ) -> Result<LookupOutcome, CoreError> {
        let normalized = normalize_prompt(prompt);
        let fp = fingerprint(&normalized.text, ctx);

        if let Some(plan) = store.get_plan_by_fingerprint(team_id, &fp)? {
            return Ok(Self::classify(plan));
        }

        let filter = PlanCandidateFilter {
            normalized_prompt: normalized.text.clone(),
            device_model: ctx.device_model.clone(),
            ui_name: ctx.ui_name.clone(),
        };
        let mut candidates: Vec<CachedPlan> = store
            .find_compatible_plans(team_id, &filter)?
            .into_iter()
            .filter(|candidate| jaccard(&candidate.available_nodes, &ctx.available_nodes) >= JACCARD_COMPATIBLE_THRESHOLD)
            .collect();

        if candidates.is_empty() {
            tracing::info!(prompt = %prompt, normalized = %normalized.text, "MISS (normal) — will generate");
            return Ok(LookupOutcome::Miss);
        }

        candidates.sort_by(|a, b| {
            b.success_rate()
                .partial_cmp(&a.success_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.execution_count.cmp(&a.execution_count))
                .then(b.last_used.cmp(&a.last_used))
        });
        let best = candidates.into_iter().next().expect("non-empty, checked above");
        Ok(Self::classify(best))
    }

    fn classify(plan: CachedPlan) -> LookupOutcome {
        let decision = classify_reuse(&plan);
        if decision.should_reuse() {
            return LookupOutcome::Reuse { plan, decision };
        }
        match decision {
            ReuseDecision::Discard => LookupOutcome::Discard { plan },
            // §4.3 names only the >=0.8, >=0.6, and <0.5 buckets; the
            // [0.5, 0.6) gap is `Indeterminate` and is treated as a miss,
            // not a reuse, per `ReuseDecision::should_reuse`.
            ReuseDecision::Indeterminate | ReuseDecision::HighConfidence | ReuseDecision::ReuseWithMonitoring => LookupOutcome::Miss,
        }
    }

    /// §4.3 Storage rule: store only if the overall execution succeeded,
    /// every step succeeded, `use_cache = true`, and `debug_mode = false`.
    /// Returns `true` when the plan was stored, `false` with the reason
    /// logged otherwise. Never errors on a deliberate non-store — that is
    /// the normal case for debug runs and disabled caching.
    ///
    /// # Errors
    /// Propagates persistence errors from `store` when storage is attempted.
    #[allow(clippy::too_many_arguments)]
    pub fn maybe_store<S: PersistenceStore>(
        store: &S,
        team_id: &TeamId,
        prompt: &str,
        ctx: &PlanContext,
        graph: Value,
        overall_succeeded: bool,
        all_steps_succeeded: bool,
        use_cache: bool,
        debug_mode: bool,
        execution_time_ms: u64,
    ) -> Result<bool, CoreError> {
        let mut reasons = Vec::new();
        if !overall_succeeded {
            reasons.push("execution did not succeed overall");
        }
        if !all_steps_succeeded {
            reasons.push("not every step succeeded");
        }
        if !use_cache {
            reasons.push("use_cache=false");
        }
        if debug_mode {
            reasons.push("debug_mode=true");
        }
        if !reasons.is_empty() {
            tracing::info!(prompt = %prompt, "NOT STORED: {}", reasons.join(", "));
            return Ok(false);
        }

        let normalized = normalize_prompt(prompt);
        let fp = fingerprint(&normalized.text, ctx);
        let now = Utc::now();

        let plan = match store.get_plan_by_fingerprint(team_id, &fp)? {
            Some(mut existing) => {
                existing.execution_count += 1;
                existing.success_count += 1;
                existing.last_used = now;
                existing.last_success = Some(now);
                existing.avg_execution_time_ms = ewma(existing.avg_execution_time_ms, execution_time_ms as f64);
                existing
            }
            None => CachedPlan {
                fingerprint: fp.clone(),
                normalized_prompt: normalized.text.clone(),
                intent: normalized.intent.clone(),
                target: normalized.target.clone(),
                device_model: ctx.device_model.clone(),
                ui_name: ctx.ui_name.clone(),
                available_nodes: ctx.available_nodes.clone(),
                context_signature: context_signature(ctx),
                graph,
                success_count: 1,
                failure_count: 0,
                execution_count: 1,
                avg_execution_time_ms: execution_time_ms as f64,
                last_used: now,
                last_success: Some(now),
                last_failure: None,
                failure_reasons: Vec::new(),
            },
        };

        store.upsert_plan(team_id, &plan)?;
        tracing::info!(prompt = %prompt, fingerprint = %fp, "STORED");
        Ok(true)
    }

    /// Records a failed execution of a *cached* plan (§4.3 Storage rule, "On
    /// failure path"): increments `failure_count`, updates `last_failure`,
    /// and appends a failure reason.
    ///
    /// # Errors
    /// Propagates persistence errors from `store`.
    pub fn record_failure<S: PersistenceStore>(
        store: &S,
        team_id: &TeamId,
        fingerprint: &FingerprintId,
        reason: &str,
        execution_time_ms: u64,
    ) -> Result<(), CoreError> {
        store.update_plan_metrics(
            team_id,
            fingerprint,
            PlanMetricUpdate {
                succeeded: false,
                execution_time_ms,
            },
            Some(reason),
        )
    }

    /// Manual invalidation by fingerprint (§4.3 Eviction).
    ///
    /// # Errors
    /// Propagates persistence errors from `store`.
    pub fn invalidate<S: PersistenceStore>(store: &S, team_id: &TeamId, fingerprint: &FingerprintId) -> Result<(), CoreError> {
        store.invalidate_plan(team_id, fingerprint)
    }

    /// Daily maintenance sweep (§4.3 Eviction): delegates the actual removal
    /// rules to the store, since they require aggregate queries the
    /// in-memory types here can't express efficiently. Returns the number of
    /// entries removed.
    ///
    /// # Errors
    /// Propagates persistence errors from `store`.
    pub fn run_maintenance<S: PersistenceStore>(store: &S, team_id: &TeamId) -> Result<u64, CoreError> {
        store.maintenance_evict_plans(team_id)
    }
}

/// EWMA update with `alpha = 0.2` (§4.3 Storage rule).
fn ewma(previous: f64, sample: f64) -> f64 {
    EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * previous
}

/// A stable signature for `available_nodes`, used only as an opaque
/// compatibility marker (§3 `context_signature`); the jaccard check above is
/// what actually gates compatibility.
fn context_signature(ctx: &PlanContext) -> String {
    let mut nodes = ctx.available_nodes.clone();
    nodes.sort();
    md5_hex(format!("{}\x1f{}\x1f{}", ctx.device_model, ctx.ui_name, nodes.join(",")).as_bytes())
}

/// Jaccard similarity between two string sets, treated as unordered.
fn jaccard(a: &[String], b: &[String]) -> f64 {
    use std::collections::HashSet;
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PlanContext {
        PlanContext {
            device_model: "android_mobile".to_string(),
            ui_name: "horizon_android_mobile".to_string(),
            available_nodes: vec!["home".to_string(), "live".to_string(), "live_fullscreen".to_string()],
        }
    }

    #[test]
    fn fingerprint_is_order_independent_over_available_nodes() {
        let a = fingerprint("navigation_live", &ctx());
        let reordered = PlanContext {
            available_nodes: vec!["live_fullscreen".to_string(), "home".to_string(), "live".to_string()],
            ..ctx()
        };
        let b = fingerprint("navigation_live", &reordered);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_device_model() {
        let a = fingerprint("navigation_live", &ctx());
        let other = PlanContext { device_model: "android_tv".to_string(), ..ctx() };
        let b = fingerprint("navigation_live", &other);
        assert_ne!(a, b);
    }

    #[test]
    fn jaccard_identical_sets_is_one() {
        let nodes = vec!["a".to_string(), "b".to_string()];
        assert!((jaccard(&nodes, &nodes) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn jaccard_disjoint_sets_is_zero() {
        let a = vec!["a".to_string()];
        let b = vec!["b".to_string()];
        assert_eq!(jaccard(&a, &b), 0.0);
    }

    #[test]
    fn ewma_moves_toward_new_sample() {
        let updated = ewma(1000.0, 2000.0);
        assert!((updated - 1200.0).abs() < 1e-9);
    }

    fn plan_with_rate(success_count: u64, execution_count: u64) -> CachedPlan {
        CachedPlan {
            fingerprint: FingerprintId::new("f1"),
            normalized_prompt: "navigation_live".to_string(),
            intent: "navigation".to_string(),
            target: "live".to_string(),
            device_model: "android_mobile".to_string(),
            ui_name: "horizon_android_mobile".to_string(),
            available_nodes: vec!["home".to_string(), "live".to_string()],
            context_signature: "sig".to_string(),
            graph: serde_json::json!({"nodes": [], "edges": []}),
            success_count,
            failure_count: execution_count - success_count,
            execution_count,
            avg_execution_time_ms: 1000.0,
            last_used: Utc::now(),
            last_success: None,
            last_failure: None,
            failure_reasons: vec![],
        }
    }

    #[test]
    fn indeterminate_success_rate_is_a_miss_not_a_reuse() {
        // 11/20 = 0.55, inside the [0.5, 0.6) gap that `classify_reuse`
        // reports as `Indeterminate`.
        let plan = plan_with_rate(11, 20);
        assert_eq!(classify_reuse(&plan), ReuseDecision::Indeterminate);
        assert!(matches!(AiPlanCache::classify(plan), LookupOutcome::Miss));
    }

    #[test]
    fn high_confidence_and_monitoring_rates_are_reused() {
        let high = plan_with_rate(9, 10);
        assert!(matches!(AiPlanCache::classify(high), LookupOutcome::Reuse { decision: ReuseDecision::HighConfidence, .. }));

        let monitoring = plan_with_rate(65, 100);
        assert!(matches!(AiPlanCache::classify(monitoring), LookupOutcome::Reuse { decision: ReuseDecision::ReuseWithMonitoring, .. }));
    }

    #[test]
    fn low_success_rate_is_discarded() {
        let plan = plan_with_rate(2, 10);
        assert!(matches!(AiPlanCache::classify(plan), LookupOutcome::Discard { .. }));
    }
}
