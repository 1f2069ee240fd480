// vpt-host/src/execution.rs
// ============================================================================
// Module: Execution Worker
// Description: Resolves an executeTask request into an `ExecGraph`, runs it
//              on a worker thread, and records the outcome (§4.2, §4.3,
//              §4.5, §9 "Coroutine-style orchestration").
// Purpose: The one place `POST /host/{kind}/executeTask` hands off to —
//          everything from here down is `vpt-core` plus the sqlite store.
// Dependencies: vpt-core, vpt-controllers, vpt-store-sqlite
// ============================================================================

//! ## Overview
//! §5's scheduling model is "parallel threads with cooperative suspension
//! points at I/O"; one execution runs sequentially on its own
//! [`std::thread`], update its [`crate::tasks::TaskTable`] entry as it goes,
//! and persists a `script_results` row when it finishes. The async
//! `executeTask`/`status` HTTP pattern (§4.5) is this thread plus the table,
//! nothing more elaborate.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use vpt_core::ai_cache::AiPlanCache;
use vpt_core::ai_cache::LookupOutcome;
use vpt_core::ai_cache::PlanContext;
use vpt_core::core::execution::ExecGraph;
use vpt_core::core::execution::ExecutionContext;
use vpt_core::core::ids::DeviceId;
use vpt_core::core::ids::TaskId;
use vpt_core::core::ids::TeamId;
use vpt_core::core::ids::TestcaseId;
use vpt_core::core::ids::TreeId;
use vpt_core::core::ScriptType;
use vpt_core::interfaces::PersistenceStore;

use crate::plan_generator::PlanGenerator;
use crate::state::HostState;

/// Body of `POST /host/{kind}/executeTask` (§4.5, §6.2). The `kind` path
/// segment selects [`ExecutionKind`]; everything else is common across the
/// three kinds.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteTaskRequest {
    pub team_id: TeamId,
    pub device_id: DeviceId,
    pub script_name: String,
    /// Root tree backing `navigation` nodes that carry no pre-baked
    /// transitions; required whenever the graph contains one.
    pub root_tree_id: Option<TreeId>,
    /// `kind == "testcase"`: which stored testcase to run.
    pub testcase_id: Option<TestcaseId>,
    /// `kind == "script"`, or `kind == "ai"` with a plan already resolved by
    /// the caller: the execution-ready graph directly.
    pub graph: Option<ExecGraph>,
    /// `kind == "ai"`: the natural-language prompt to resolve via the plan
    /// cache (§4.3).
    pub ai_prompt: Option<String>,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default)]
    pub debug_mode: bool,
    pub device_model: Option<String>,
    pub ui_name: Option<String>,
    #[serde(default)]
    pub available_nodes: Vec<String>,
    /// Tie-break for action-set selection on `navigation` nodes resolved at
    /// traversal time (§9 "action-set selection priority"); `None` keeps the
    /// edge's `default_action_set_id`.
    #[serde(default)]
    pub action_set_preference: Option<vpt_core::ActionSetPreference>,
}

fn default_true() -> bool {
    true
}

/// The `kind` path segment of `/host/{kind}/executeTask` (§6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    Script,
    Testcase,
    Ai,
}

impl ExecutionKind {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "script" => Some(Self::Script),
            "testcase" => Some(Self::Testcase),
            "ai" => Some(Self::Ai),
            _ => None,
        }
    }

    #[must_use]
    fn script_type(self) -> ScriptType {
        match self {
            Self::Script => ScriptType::Script,
            Self::Testcase => ScriptType::Testcase,
            Self::Ai => ScriptType::Ai,
        }
    }
}

/// Error returned synchronously when a request can't even be scheduled
/// (missing required fields, unknown testcase) — distinct from a `StepFailed`
/// recorded once the worker thread is running.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{0}")]
    Core(#[from] vpt_core::core::CoreError),
    #[error("kind '{0}' requires a testcase_id")]
    MissingTestcaseId(String),
    #[error("kind 'ai' requires ai_prompt")]
    MissingPrompt,
}

/// Submits an execution: resolves the graph synchronously (cheap — a
/// sqlite/cache read, not the execution itself), then spawns the worker
/// thread and returns its `task_id` immediately (§4.5).
///
/// # Errors
/// Returns [`SubmitError`] when the request is missing a field its `kind`
/// requires, or when a named testcase cannot be found.
pub fn submit(
    state: &HostState,
    kind: ExecutionKind,
    generator: Arc<dyn PlanGenerator>,
    request: ExecuteTaskRequest,
) -> Result<TaskId, SubmitError> {
    let mut ctx = ExecutionContext::new(request.device_id.clone(), state.host_config.host_id.clone());
    if let Some(preference) = request.action_set_preference.clone() {
        ctx = ctx.with_action_set_preference(preference);
    }
    let task_id = state.tasks.create(ctx.cancel_handle());

    let state = state.clone();
    std::thread::spawn(move || {
        run(&state, kind, generator.as_ref(), request, ctx, &task_id);
    });

    Ok(task_id)
}

fn run(
    state: &HostState,
    kind: ExecutionKind,
    generator: &dyn PlanGenerator,
    request: ExecuteTaskRequest,
    mut ctx: ExecutionContext,
    task_id: &TaskId,
) {
    let team_id = request.team_id.clone();
    state.tasks.record_step(task_id, format!("resolving graph for {}", request.script_name));

    let resolution = resolve_graph(state, kind, generator, &request);
    let (graph, cache_fingerprint, plan_context) = match resolution {
        Ok(resolved) => resolved,
        Err(error) => {
            state.tasks.record_step(task_id, format!("failed to resolve graph: {error}"));
            state.tasks.finish(task_id, false);
            return;
        }
    };

    let root_tree_id = request.root_tree_id.clone().unwrap_or_else(|| TreeId::new(""));
    let start = Instant::now();

    let result = vpt_core::executor::execute(
        state.registry.as_ref(),
        state.store.as_ref(),
        state.navigation.as_ref(),
        &team_id,
        &root_tree_id,
        kind.script_type(),
        &request.script_name,
        &graph,
        &mut ctx,
    );

    let elapsed_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(outcome) => {
            for step in &outcome.step_results {
                state.tasks.record_step(task_id, format!("{}: {}", step.command, if step.success { "ok" } else { "failed" }));
                state.tasks.record_position(task_id, step.node_id.as_str());
            }
            let _ = state.store.insert_script_result(&team_id, &outcome);

            if kind == ExecutionKind::Ai {
                record_ai_outcome(state, &team_id, &request, plan_context.as_ref(), cache_fingerprint.as_ref(), &graph, &outcome, elapsed_ms);
            }

            state.tasks.finish(task_id, outcome.success && !outcome.canceled);
        }
        Err(error) => {
            state.tasks.record_step(task_id, format!("execution aborted: {error}"));
            state.tasks.finish(task_id, false);
        }
    }
}

fn resolve_graph(
    state: &HostState,
    kind: ExecutionKind,
    generator: &dyn PlanGenerator,
    request: &ExecuteTaskRequest,
) -> Result<(ExecGraph, Option<vpt_core::core::ids::FingerprintId>, Option<PlanContext>), SubmitError> {
    match kind {
        ExecutionKind::Script => {
            let graph = request.graph.clone().ok_or_else(|| SubmitError::MissingTestcaseId("script".to_string()))?;
            Ok((graph, None, None))
        }
        ExecutionKind::Testcase => {
            if let Some(graph) = request.graph.clone() {
                return Ok((graph, None, None));
            }
            let testcase_id = request.testcase_id.clone().ok_or_else(|| SubmitError::MissingTestcaseId("testcase".to_string()))?;
            let testcase = state.store.get_testcase(&request.team_id, &testcase_id)?;
            let graph: ExecGraph = serde_json::from_value(testcase.graph_json)
                .map_err(|error| SubmitError::Core(vpt_core::core::CoreError::ValidationError(format!("stored graph_json is not a valid ExecGraph: {error}"))))?;
            Ok((graph, None, None))
        }
        ExecutionKind::Ai => {
            let prompt = request.ai_prompt.clone().ok_or(SubmitError::MissingPrompt)?;
            let plan_ctx = PlanContext {
                device_model: request.device_model.clone().unwrap_or_default(),
                ui_name: request.ui_name.clone().unwrap_or_default(),
                available_nodes: request.available_nodes.clone(),
            };

            if let Some(graph) = request.graph.clone() {
                return Ok((graph, None, Some(plan_ctx)));
            }

            if !request.use_cache {
                let graph = generator.generate(&prompt, &plan_ctx)?;
                return Ok((graph, None, Some(plan_ctx)));
            }

            match AiPlanCache::lookup(state.store.as_ref(), &request.team_id, &prompt, &plan_ctx)? {
                LookupOutcome::Reuse { plan, .. } => {
                    let graph: ExecGraph = serde_json::from_value(plan.graph)
                        .map_err(|error| SubmitError::Core(vpt_core::core::CoreError::ValidationError(format!("cached graph is not a valid ExecGraph: {error}"))))?;
                    Ok((graph, Some(plan.fingerprint), Some(plan_ctx)))
                }
                LookupOutcome::Discard { plan } => {
                    let _ = AiPlanCache::invalidate(state.store.as_ref(), &request.team_id, &plan.fingerprint);
                    let graph = generator.generate(&prompt, &plan_ctx)?;
                    Ok((graph, None, Some(plan_ctx)))
                }
                LookupOutcome::Miss => {
                    let graph = generator.generate(&prompt, &plan_ctx)?;
                    Ok((graph, None, Some(plan_ctx)))
                }
            }
        }
    }
}

fn record_ai_outcome(
    state: &HostState,
    team_id: &TeamId,
    request: &ExecuteTaskRequest,
    plan_context: Option<&PlanContext>,
    cached_fingerprint: Option<&vpt_core::core::ids::FingerprintId>,
    graph: &ExecGraph,
    outcome: &vpt_core::core::ExecutionResult,
    elapsed_ms: u64,
) {
    let Some(plan_ctx) = plan_context else { return };
    let Some(prompt) = request.ai_prompt.as_deref() else { return };

    let all_steps_succeeded = outcome.step_results.iter().all(|step| step.success);
    if outcome.success && all_steps_succeeded {
        let graph_value = serde_json::to_value(graph).unwrap_or(Value::Null);
        let _ = AiPlanCache::maybe_store(
            state.store.as_ref(),
            team_id,
            prompt,
            plan_ctx,
            graph_value,
            outcome.success,
            all_steps_succeeded,
            request.use_cache,
            request.debug_mode,
            elapsed_ms,
        );
    } else if let Some(fingerprint) = cached_fingerprint {
        let reason = outcome
            .step_results
            .iter()
            .find(|step| !step.success)
            .and_then(|step| step.error.clone())
            .unwrap_or_else(|| "execution did not succeed".to_string());
        let _ = AiPlanCache::record_failure(state.store.as_ref(), team_id, fingerprint, &reason, elapsed_ms);
    }
}

/// Response body for `executeTask` (§4.5).
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteTaskResponse {
    pub task_id: TaskId,
}
