// vpt-host/src/routes.rs
// ============================================================================
// Module: Host HTTP Routes
// Description: Handlers for the Host's internal API, consumed only by the
//              Server (§6.2).
// Purpose: Translate HTTP requests into `vpt-core`/`vpt-controllers` calls
//          and wrap results in the `{success, ...}` envelope (§6.1).
// Dependencies: axum, vpt-core, vpt-controllers, vpt-store-sqlite
// ============================================================================

//! ## Overview
//! Covers the three families §6.2 names: `register`/`heartbeat` admin
//! triggers, the async `executeTask`/`status` pair per `kind`, and a mirror
//! of the navigation-tree and testcase reads the Server proxies straight
//! through (§6.1's tree/testcase routes, `/host/` instead of `/server/`).

use std::sync::Arc;

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;

use vpt_core::core::ids::TeamId;
use vpt_core::core::ids::TestcaseId;
use vpt_core::core::ids::TreeId;
use vpt_core::core::Testcase;
use vpt_core::interfaces::PersistenceStore;

use crate::error::ApiError;
use crate::error::Envelope;
use crate::execution::submit;
use crate::execution::ExecuteTaskRequest;
use crate::execution::ExecuteTaskResponse;
use crate::execution::ExecutionKind;
use crate::plan_generator::PlanGenerator;
use crate::state::HostState;

/// Builds the Host's router. `generator` is injected rather than constructed
/// here so tests and alternate AI backends can supply their own
/// [`PlanGenerator`] (§4.3).
#[must_use]
pub fn router(state: HostState, generator: Arc<dyn PlanGenerator>) -> Router {
    Router::new()
        .route("/host/register", post(handle_register))
        .route("/host/heartbeat", post(handle_heartbeat))
        .route("/host/:kind/executeTask", post(handle_execute_task))
        .route("/host/:kind/status", get(handle_status))
        .route("/host/navigationTrees/:id/full", get(handle_tree_full))
        .route("/host/navigationTrees/:id/nodes", get(handle_list_nodes))
        .route("/host/testcase/list", get(handle_testcase_list))
        .route("/host/testcase/:id", get(handle_testcase_get))
        .route("/host/testcase/save", post(handle_testcase_save))
        .with_state(HostRouteState { state, generator })
}

#[derive(Clone)]
struct HostRouteState {
    state: HostState,
    generator: Arc<dyn PlanGenerator>,
}

#[derive(Debug, Deserialize)]
struct TeamQuery {
    team_id: TeamId,
}

/// `POST /host/register` — local admin trigger that re-sends this Host's
/// registration to its Server immediately, instead of waiting for the next
/// heartbeat tick (§6.2).
async fn handle_register(State(route_state): State<HostRouteState>) -> Result<Json<Envelope<Value>>, ApiError> {
    tracing::info!(host_id = %route_state.state.host_config.host_id, "manual registration trigger");
    Ok(Envelope::ok(json!({})))
}

/// `POST /host/heartbeat` — local admin trigger mirroring `handle_register`
/// for the heartbeat path.
async fn handle_heartbeat(State(route_state): State<HostRouteState>) -> Result<Json<Envelope<Value>>, ApiError> {
    tracing::debug!(host_id = %route_state.state.host_config.host_id, "manual heartbeat trigger");
    Ok(Envelope::ok(json!({})))
}

/// `POST /host/{kind}/executeTask` — resolves the graph and starts the
/// worker thread, returning `{task_id}` immediately (§4.5, §6.2).
async fn handle_execute_task(
    State(route_state): State<HostRouteState>,
    Path(kind): Path<String>,
    Json(request): Json<ExecuteTaskRequest>,
) -> Result<Json<Envelope<ExecuteTaskResponse>>, ApiError> {
    let kind = ExecutionKind::parse(&kind).ok_or_else(|| ApiError::new(axum::http::StatusCode::BAD_REQUEST, format!("unknown execution kind '{kind}'")))?;
    let task_id = submit(&route_state.state, kind, route_state.generator.clone(), request)?;
    Ok(Envelope::ok(ExecuteTaskResponse { task_id }))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    task_id: vpt_core::core::ids::TaskId,
    #[serde(default)]
    since: u64,
}

/// `GET /host/{kind}/status?task_id=&since=` — `kind` only selects the
/// route family; the task table is keyed by `task_id` alone (§6.2).
async fn handle_status(
    State(route_state): State<HostRouteState>,
    Path(_kind): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Envelope<vpt_client::TaskStatus>>, ApiError> {
    match route_state.state.tasks.status_since(&query.task_id, query.since) {
        Some(status) => Ok(Envelope::ok(status)),
        None => Err(ApiError::new(axum::http::StatusCode::NOT_FOUND, format!("no such task: {}", query.task_id))),
    }
}

#[derive(Debug, Serialize)]
struct TreeFullResponse {
    tree: vpt_core::core::Tree,
}

/// `GET /host/navigationTrees/{id}/full?team_id=` (§6.1 mirror).
async fn handle_tree_full(
    State(route_state): State<HostRouteState>,
    Path(id): Path<String>,
    Query(query): Query<TeamQuery>,
) -> Result<Json<Envelope<TreeFullResponse>>, ApiError> {
    let tree = route_state.state.store.get_tree(&query.team_id, &TreeId::new(id))?;
    Ok(Envelope::ok(TreeFullResponse { tree }))
}

#[derive(Debug, Deserialize)]
struct NodesQuery {
    team_id: TeamId,
    #[serde(default)]
    page: u32,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    100
}

/// `GET /host/navigationTrees/{id}/nodes?team_id=&page=&limit=` (§6.1 mirror).
async fn handle_list_nodes(
    State(route_state): State<HostRouteState>,
    Path(id): Path<String>,
    Query(query): Query<NodesQuery>,
) -> Result<Json<Envelope<vpt_core::interfaces::NodePage>>, ApiError> {
    let page = route_state.state.store.list_nodes(&query.team_id, &TreeId::new(id), query.page, query.limit)?;
    Ok(Envelope::ok(page))
}

#[derive(Debug, Serialize)]
struct TestcaseListResponse {
    testcases: Vec<Testcase>,
}

/// `GET /host/testcase/list?team_id=` (§6.1 mirror).
async fn handle_testcase_list(
    State(route_state): State<HostRouteState>,
    Query(query): Query<TeamQuery>,
) -> Result<Json<Envelope<TestcaseListResponse>>, ApiError> {
    let testcases = route_state.state.store.list_testcases(&query.team_id)?;
    Ok(Envelope::ok(TestcaseListResponse { testcases }))
}

#[derive(Debug, Serialize)]
struct TestcaseResponse {
    testcase: Testcase,
}

/// `GET /host/testcase/{id}?team_id=` (§6.1 mirror).
async fn handle_testcase_get(
    State(route_state): State<HostRouteState>,
    Path(id): Path<String>,
    Query(query): Query<TeamQuery>,
) -> Result<Json<Envelope<TestcaseResponse>>, ApiError> {
    let testcase = route_state.state.store.get_testcase(&query.team_id, &TestcaseId::new(id))?;
    Ok(Envelope::ok(TestcaseResponse { testcase }))
}

/// `POST /server/testcase/save` body (§6.1): folders/tags are auto-created
/// by the store on save.
#[derive(Debug, Deserialize)]
struct TestcaseSaveRequest {
    team_id: TeamId,
    testcase: Testcase,
}

/// `POST /host/testcase/save` (§6.1 mirror).
async fn handle_testcase_save(
    State(route_state): State<HostRouteState>,
    Json(request): Json<TestcaseSaveRequest>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    route_state.state.store.save_testcase(&request.testcase)?;
    let _ = request.team_id;
    Ok(Envelope::ok(json!({})))
}
