// vpt-server/src/routes.rs
// ============================================================================
// Module: Server HTTP Routes
// Description: Handlers for the Server's public API (§6.1): authorization and
//              team scoping, direct CRUD on trees/testcases/folders/tags, and
//              a proxy to whichever Host owns a targeted device.
// Purpose: Translate HTTP requests into `vpt-core`/`vpt-client` calls and
//          wrap results in the `{success, ...}` envelope (§6.1).
// Dependencies: axum, vpt-core, vpt-client, vpt-store-sqlite
// ============================================================================

//! ## Overview
//! Every route is team-scoped by a required `team_id` (query or header,
//! §6.1). Tree/testcase/folder/tag routes read and write this process's own
//! [`vpt_store_sqlite::SqliteStore`] directly; execution routes (`aiagent`,
//! `script`, `testcase/{id}/execute`) resolve the owning Host from
//! [`crate::hosts::HostRegistry`] and proxy through [`vpt_client::ProxyClient`]
//! (§4.5 "Server never executes device work itself").

use std::time::Duration;

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;

use vpt_client::HostRegistration;
use vpt_core::core::ids::DeviceId;
use vpt_core::core::ids::FolderId;
use vpt_core::core::ids::NodeId;
use vpt_core::core::ids::TaskId;
use vpt_core::core::ids::TeamId;
use vpt_core::core::ids::TestcaseId;
use vpt_core::core::ids::TreeId;
use vpt_core::core::tree::MAX_TREE_DEPTH;
use vpt_core::core::CreationMethod;
use vpt_core::core::Edge;
use vpt_core::core::ExecutionResult;
use vpt_core::core::Node;
use vpt_core::core::Testcase;
use vpt_core::core::Tree;
use vpt_core::interfaces::NodePage;
use vpt_core::interfaces::PersistenceStore;

use crate::error::ApiError;
use crate::error::Envelope;
use crate::state::ServerState;

/// Builds the Server's public router (§6.1).
#[must_use]
pub fn router(state: ServerState) -> Router {
    Router::new()
        // -- host admin ------------------------------------------------------
        .route("/server/hosts/register", post(handle_host_register))
        .route("/server/hosts/heartbeat", post(handle_host_heartbeat))
        // -- trees -------------------------------------------------------------
        .route("/server/navigationTrees/:id/metadata", get(handle_tree_metadata).post(handle_tree_save))
        .route("/server/navigationTrees/:id/nodes", get(handle_list_nodes).post(handle_save_node))
        .route("/server/navigationTrees/:id/edges", get(handle_list_edges).post(handle_save_edge))
        .route("/server/navigationTrees/:id/full", get(handle_tree_full))
        .route("/server/navigationTrees/:id", delete(handle_tree_delete))
        .route("/server/navigationTrees/:id/cascade", delete(handle_tree_cascade_delete))
        .route("/server/navigationTrees/:id/hierarchy", get(handle_hierarchy))
        .route("/server/navigationTrees/:id/breadcrumb", get(handle_breadcrumb))
        .route("/server/navigationTrees/getNodeSubTrees/:tree/:node", get(handle_get_node_subtrees))
        .route("/server/navigationTrees/:tree/nodes/:node/subtrees", post(handle_create_subtree))
        .route("/server/navigationTrees/:subtree/move", put(handle_move_subtree))
        // -- testcases ---------------------------------------------------------
        .route("/server/testcase/save", post(handle_testcase_save))
        .route("/server/testcase/list", get(handle_testcase_list))
        .route("/server/testcase/folders-tags", get(handle_folders_tags))
        .route("/server/testcase/:id", get(handle_testcase_get).delete(handle_testcase_delete))
        .route("/server/testcase/:id/execute", post(handle_testcase_execute))
        .route("/server/testcase/:id/history", get(handle_testcase_history))
        // -- executables ---------------------------------------------------------
        .route("/server/executable/list", get(handle_executable_list))
        // -- AI --------------------------------------------------------------
        .route("/server/aiagent/executeTask", post(handle_ai_execute_task))
        .route("/server/aiagent/getStatus", get(handle_ai_get_status))
        .route("/server/aitestcase/analyzeTestCase", post(handle_analyze_testcase))
        .route("/server/aitestcase/generateTestCases", post(handle_generate_testcases))
        .route("/server/aitestcase/executeTestCase", post(handle_execute_ai_testcase))
        // -- scripts -----------------------------------------------------------
        .route("/server/script/execute", post(handle_script_execute))
        .with_state(state)
}

// ============================================================================
// SECTION: Common query shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct TeamQuery {
    team_id: TeamId,
}

fn default_limit() -> u32 {
    100
}

fn default_poll_timeout_secs() -> u64 {
    60
}

// ============================================================================
// SECTION: Host admin (§4.5 Model, §6.1 register/heartbeat)
// ============================================================================

/// `POST /server/hosts/register`: a Host declaring itself and its device
/// inventory (§4.5 Model).
async fn handle_host_register(State(state): State<ServerState>, Json(registration): Json<HostRegistration>) -> Json<Envelope<Value>> {
    state.hosts.register(&registration, chrono::Utc::now());
    Envelope::ok(json!({}))
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    host_id: vpt_core::core::ids::HostId,
}

/// `POST /server/hosts/heartbeat`: resets a Host's missed-beat clock (§4.5).
async fn handle_host_heartbeat(State(state): State<ServerState>, Json(request): Json<HeartbeatRequest>) -> Result<Json<Envelope<Value>>, ApiError> {
    if state.hosts.heartbeat(&request.host_id, chrono::Utc::now()) {
        Ok(Envelope::ok(json!({})))
    } else {
        Err(ApiError::new(StatusCode::NOT_FOUND, format!("host {} never registered", request.host_id)))
    }
}

// ============================================================================
// SECTION: Trees (§6.1, §6.3, §6.5)
// ============================================================================

#[derive(Debug, Serialize)]
struct TreeMetadataResponse {
    tree_id: TreeId,
    name: String,
    tree_depth: u32,
    is_root_tree: bool,
    parent_tree_id: Option<TreeId>,
    parent_node_id: Option<NodeId>,
    node_count: usize,
    edge_count: usize,
}

impl From<Tree> for TreeMetadataResponse {
    fn from(tree: Tree) -> Self {
        Self {
            tree_id: tree.tree_id,
            name: tree.name,
            tree_depth: tree.tree_depth,
            is_root_tree: tree.is_root_tree,
            parent_tree_id: tree.parent_tree_id,
            parent_node_id: tree.parent_node_id,
            node_count: tree.nodes.len(),
            edge_count: tree.edges.len(),
        }
    }
}

/// `GET /server/navigationTrees/{id}/metadata?team_id=` (§6.1).
async fn handle_tree_metadata(State(state): State<ServerState>, Path(id): Path<String>, Query(query): Query<TeamQuery>) -> Result<Json<Envelope<TreeMetadataResponse>>, ApiError> {
    let tree = state.store.get_tree(&query.team_id, &TreeId::new(id))?;
    Ok(Envelope::ok(tree.into()))
}

/// `POST /server/navigationTrees/{id}/metadata` (§6.1): the tree body's
/// `tree_id` must match the path segment.
async fn handle_tree_save(State(state): State<ServerState>, Path(id): Path<String>, Json(tree): Json<Tree>) -> Result<Json<Envelope<Value>>, ApiError> {
    if tree.tree_id.as_str() != id {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "tree_id in body must match path"));
    }
    tree.validate()?;
    state.store.save_tree(&tree)?;
    invalidate_root_of(&state, &tree.team_id, &tree.tree_id)?;
    Ok(Envelope::ok(json!({})))
}

/// `DELETE /server/navigationTrees/{id}?team_id=` (§6.1): single-entity
/// delete; does not recurse into subtrees (use `.../cascade` for that).
async fn handle_tree_delete(State(state): State<ServerState>, Path(id): Path<String>, Query(query): Query<TeamQuery>) -> Result<Json<Envelope<Value>>, ApiError> {
    let tree_id = TreeId::new(id);
    invalidate_root_of(&state, &query.team_id, &tree_id)?;
    state.store.delete_tree(&query.team_id, &tree_id)?;
    Ok(Envelope::ok(json!({})))
}

/// `DELETE /server/navigationTrees/{id}/cascade?team_id=` (§6.1): removes
/// `tree_id` and every descendant subtree reachable through its nodes'
/// `has_subtree` flag, deepest first (§3 deletion cascade, §8 scenario 5).
async fn handle_tree_cascade_delete(State(state): State<ServerState>, Path(id): Path<String>, Query(query): Query<TeamQuery>) -> Result<Json<Envelope<Value>>, ApiError> {
    let tree_id = TreeId::new(id);
    invalidate_root_of(&state, &query.team_id, &tree_id)?;
    let removed = cascade_delete(state.store.as_ref(), &query.team_id, &tree_id)?;
    Ok(Envelope::ok(json!({ "removed_tree_count": removed })))
}

/// Recursively deletes `tree_id` and every subtree it parents, deepest
/// first, and returns the total number of trees removed.
fn cascade_delete(store: &vpt_store_sqlite::SqliteStore, team_id: &TeamId, tree_id: &TreeId) -> Result<u64, vpt_core::core::CoreError> {
    let tree = store.get_tree(team_id, tree_id)?;
    let mut removed = 0u64;
    for node in &tree.nodes {
        if node.has_subtree {
            for child in store.child_trees(team_id, tree_id, &node.node_id)? {
                removed += cascade_delete(store, team_id, &child.tree_id)?;
            }
        }
    }
    store.delete_tree(team_id, tree_id)?;
    removed += 1;
    Ok(removed)
}

#[derive(Debug, Deserialize)]
struct NodesQuery {
    team_id: TeamId,
    #[serde(default)]
    page: u32,
    #[serde(default = "default_limit")]
    limit: u32,
}

/// `GET /server/navigationTrees/{id}/nodes?team_id=&page=&limit=` (§6.1,
/// §6.3 `tree.nodes.listPaginated`).
async fn handle_list_nodes(State(state): State<ServerState>, Path(id): Path<String>, Query(query): Query<NodesQuery>) -> Result<Json<Envelope<NodePageResponse>>, ApiError> {
    let page = state.store.list_nodes(&query.team_id, &TreeId::new(id), query.page, query.limit)?;
    Ok(Envelope::ok(page.into()))
}

#[derive(Debug, Serialize)]
struct NodePageResponse {
    nodes: Vec<Node>,
    has_more: bool,
}

impl From<NodePage> for NodePageResponse {
    fn from(page: NodePage) -> Self {
        Self { nodes: page.nodes, has_more: page.has_more }
    }
}

#[derive(Debug, Deserialize)]
struct SaveNodeRequest {
    team_id: TeamId,
    node: Node,
}

/// `POST /server/navigationTrees/{id}/nodes` (§6.1, §6.3 `tree.nodes.save`).
async fn handle_save_node(State(state): State<ServerState>, Path(id): Path<String>, Json(request): Json<SaveNodeRequest>) -> Result<Json<Envelope<Value>>, ApiError> {
    let tree_id = TreeId::new(id);
    state.store.save_node(&request.team_id, &tree_id, &request.node)?;
    invalidate_root_of(&state, &request.team_id, &tree_id)?;
    Ok(Envelope::ok(json!({})))
}

#[derive(Debug, Deserialize)]
struct EdgesQuery {
    team_id: TeamId,
    #[serde(default)]
    node_ids: String,
}

/// `GET /server/navigationTrees/{id}/edges?team_id=&node_ids=csv` (§6.1).
async fn handle_list_edges(State(state): State<ServerState>, Path(id): Path<String>, Query(query): Query<EdgesQuery>) -> Result<Json<Envelope<EdgesResponse>>, ApiError> {
    let node_ids: Vec<NodeId> = query.node_ids.split(',').filter(|segment| !segment.is_empty()).map(NodeId::new).collect();
    let edges = state.store.list_edges(&query.team_id, &TreeId::new(id), &node_ids)?;
    Ok(Envelope::ok(EdgesResponse { edges }))
}

#[derive(Debug, Serialize)]
struct EdgesResponse {
    edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
struct SaveEdgeRequest {
    team_id: TeamId,
    edge: Edge,
}

/// `POST /server/navigationTrees/{id}/edges` (§6.1, §6.3 `tree.edges.save`).
async fn handle_save_edge(State(state): State<ServerState>, Path(id): Path<String>, Json(request): Json<SaveEdgeRequest>) -> Result<Json<Envelope<Value>>, ApiError> {
    request.edge.validate()?;
    let tree_id = TreeId::new(id);
    state.store.save_edge(&request.team_id, &tree_id, &request.edge)?;
    invalidate_root_of(&state, &request.team_id, &tree_id)?;
    Ok(Envelope::ok(json!({})))
}

#[derive(Debug, Serialize)]
struct TreeFullResponse {
    tree: Tree,
}

/// `GET /server/navigationTrees/{id}/full?team_id=` (§6.1): the full tree
/// with its nodes and edges embedded.
async fn handle_tree_full(State(state): State<ServerState>, Path(id): Path<String>, Query(query): Query<TeamQuery>) -> Result<Json<Envelope<TreeFullResponse>>, ApiError> {
    let tree = state.store.get_tree(&query.team_id, &TreeId::new(id))?;
    Ok(Envelope::ok(TreeFullResponse { tree }))
}

/// `GET /server/navigationTrees/getNodeSubTrees/{tree}/{node}?team_id=`
/// (§6.1).
async fn handle_get_node_subtrees(
    State(state): State<ServerState>,
    Path((tree, node)): Path<(String, String)>,
    Query(query): Query<TeamQuery>,
) -> Result<Json<Envelope<SubtreesResponse>>, ApiError> {
    let subtrees = state.store.child_trees(&query.team_id, &TreeId::new(tree), &NodeId::new(node))?;
    Ok(Envelope::ok(SubtreesResponse { subtrees }))
}

#[derive(Debug, Serialize)]
struct SubtreesResponse {
    subtrees: Vec<Tree>,
}

#[derive(Debug, Deserialize)]
struct CreateSubtreeRequest {
    team_id: TeamId,
    tree_id: TreeId,
    name: String,
}

/// `POST /server/navigationTrees/{tree}/nodes/{node}/subtrees` (§6.1):
/// anchors a brand-new tree at `(tree, node)` one level deeper than its
/// parent, rejecting depth > 5 without inserting a row (§8 scenario 6).
async fn handle_create_subtree(
    State(state): State<ServerState>,
    Path((tree, node)): Path<(String, String)>,
    Json(request): Json<CreateSubtreeRequest>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let parent_tree_id = TreeId::new(tree);
    let parent_node_id = NodeId::new(node);
    let parent = state.store.get_tree(&request.team_id, &parent_tree_id)?;
    if parent.tree_depth >= MAX_TREE_DEPTH {
        return Err(vpt_core::core::CoreError::ValidationError(format!("Maximum nesting depth reached ({MAX_TREE_DEPTH} levels)")).into());
    }
    let subtree = Tree {
        tree_id: request.tree_id.clone(),
        team_id: request.team_id.clone(),
        name: request.name,
        tree_depth: parent.tree_depth + 1,
        is_root_tree: false,
        parent_tree_id: Some(parent_tree_id.clone()),
        parent_node_id: Some(parent_node_id),
        nodes: Vec::new(),
        edges: Vec::new(),
    };
    subtree.validate()?;
    state.store.save_tree(&subtree)?;
    invalidate_root_of(&state, &request.team_id, &parent_tree_id)?;
    Ok(Envelope::ok(json!({ "tree_id": request.tree_id })))
}

#[derive(Debug, Deserialize)]
struct MoveSubtreeRequest {
    team_id: TeamId,
    parent_tree_id: TreeId,
    parent_node_id: NodeId,
}

/// `PUT /server/navigationTrees/{subtree}/move` (§6.1): re-anchors an
/// existing non-root tree under a different `(parent_tree_id,
/// parent_node_id)`, recomputing `tree_depth` from the new parent.
async fn handle_move_subtree(State(state): State<ServerState>, Path(subtree): Path<String>, Json(request): Json<MoveSubtreeRequest>) -> Result<Json<Envelope<Value>>, ApiError> {
    let subtree_id = TreeId::new(subtree);
    let mut tree = state.store.get_tree(&request.team_id, &subtree_id)?;
    let old_root = root_of(&state, &request.team_id, &subtree_id)?;
    let new_parent = state.store.get_tree(&request.team_id, &request.parent_tree_id)?;
    if new_parent.tree_depth >= MAX_TREE_DEPTH {
        return Err(vpt_core::core::CoreError::ValidationError(format!("Maximum nesting depth reached ({MAX_TREE_DEPTH} levels)")).into());
    }
    tree.parent_tree_id = Some(request.parent_tree_id.clone());
    tree.parent_node_id = Some(request.parent_node_id);
    tree.tree_depth = new_parent.tree_depth + 1;
    tree.is_root_tree = false;
    tree.validate()?;
    state.store.save_tree(&tree)?;
    state.navigation.invalidate(&request.team_id, &old_root);
    invalidate_root_of(&state, &request.team_id, &request.parent_tree_id)?;
    Ok(Envelope::ok(json!({})))
}

#[derive(Debug, Serialize)]
struct HierarchyResponse {
    root_tree_id: TreeId,
    trees: Vec<TreeMetadataResponse>,
}

/// `GET /server/navigationTrees/{id}/hierarchy?team_id=` (§4.1
/// `LoadHierarchy` + `BuildUnified`, populating the navigation cache as a
/// side effect so a subsequent pathfinding call does not `UnifiedCacheMissing`).
async fn handle_hierarchy(State(state): State<ServerState>, Path(id): Path<String>, Query(query): Query<TeamQuery>) -> Result<Json<Envelope<HierarchyResponse>>, ApiError> {
    let root_tree_id = TreeId::new(id);
    state.navigation.load_and_build(state.store.as_ref(), &query.team_id, &root_tree_id)?;
    let hierarchy = vpt_core::navigation::hierarchy::load_hierarchy(state.store.as_ref(), &query.team_id, &root_tree_id)?;
    Ok(Envelope::ok(HierarchyResponse {
        root_tree_id: hierarchy.root_tree_id,
        trees: hierarchy.trees.into_iter().map(TreeMetadataResponse::from).collect(),
    }))
}

#[derive(Debug, Serialize)]
struct BreadcrumbEntry {
    tree_id: TreeId,
    name: String,
}

/// `GET /server/navigationTrees/{id}/breadcrumb?team_id=` (§6.1): walks
/// `parent_tree_id` up to the root, root first.
async fn handle_breadcrumb(State(state): State<ServerState>, Path(id): Path<String>, Query(query): Query<TeamQuery>) -> Result<Json<Envelope<BreadcrumbResponse>>, ApiError> {
    let mut crumbs = Vec::new();
    let mut current = Some(TreeId::new(id));
    let mut guard = 0;
    while let Some(tree_id) = current {
        guard += 1;
        if guard > (MAX_TREE_DEPTH as usize + 1) {
            return Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "breadcrumb chain exceeds maximum nesting depth"));
        }
        let tree = state.store.get_tree(&query.team_id, &tree_id)?;
        current = tree.parent_tree_id.clone();
        crumbs.push(BreadcrumbEntry { tree_id: tree.tree_id, name: tree.name });
    }
    crumbs.reverse();
    Ok(Envelope::ok(BreadcrumbResponse { breadcrumb: crumbs }))
}

#[derive(Debug, Serialize)]
struct BreadcrumbResponse {
    breadcrumb: Vec<BreadcrumbEntry>,
}

/// Walks `parent_tree_id` up to the hierarchy root, the same traversal the
/// navigation cache key is computed from (§4.1 "compute the root by walking
/// `parent_tree_id`").
fn root_of(state: &ServerState, team_id: &TeamId, tree_id: &TreeId) -> Result<TreeId, vpt_core::core::CoreError> {
    let mut current = state.store.get_tree(team_id, tree_id)?;
    let mut guard = 0;
    while let Some(parent_tree_id) = current.parent_tree_id.clone() {
        guard += 1;
        if guard > MAX_TREE_DEPTH as usize + 1 {
            return Err(vpt_core::core::CoreError::ValidationError("parent_tree_id chain did not terminate".to_string()));
        }
        current = state.store.get_tree(team_id, &parent_tree_id)?;
    }
    Ok(current.tree_id)
}

/// Invalidates the navigation cache entry for the hierarchy root that
/// `tree_id` belongs to (§4.1 "any write ... invalidates the root entry").
fn invalidate_root_of(state: &ServerState, team_id: &TeamId, tree_id: &TreeId) -> Result<(), vpt_core::core::CoreError> {
    let root = root_of(state, team_id, tree_id)?;
    state.navigation.invalidate(team_id, &root);
    Ok(())
}

// ============================================================================
// SECTION: Testcases (§6.1, §6.3)
// ============================================================================

/// `POST /server/testcase/save` (§6.1): folders/tags are auto-created.
#[derive(Debug, Deserialize)]
struct TestcaseSaveRequest {
    team_id: TeamId,
    testcase_id: Option<TestcaseId>,
    testcase_name: String,
    graph_json: Value,
    ui_name: String,
    #[serde(default)]
    folder: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    creation_method: CreationMethod,
    ai_prompt: Option<String>,
    ai_analysis: Option<Value>,
}

async fn handle_testcase_save(State(state): State<ServerState>, Json(request): Json<TestcaseSaveRequest>) -> Result<Json<Envelope<TestcaseSaveResponse>>, ApiError> {
    let folder_id = match &request.folder {
        Some(name) if !name.is_empty() => state.store.get_or_create_folder(&request.team_id, name)?,
        _ => FolderId::new(0),
    };
    let mut tag_ids = Vec::with_capacity(request.tags.len());
    for tag_name in &request.tags {
        tag_ids.push(state.store.get_or_create_tag(&request.team_id, tag_name)?.tag_id);
    }
    let testcase_id = request.testcase_id.unwrap_or_else(|| TestcaseId::new(uuid::Uuid::new_v4().to_string()));
    let testcase = Testcase {
        testcase_id: testcase_id.clone(),
        team_id: request.team_id.clone(),
        name: request.testcase_name,
        ui_name: request.ui_name,
        graph_json: request.graph_json,
        creation_method: request.creation_method,
        ai_prompt: request.ai_prompt,
        ai_analysis: request.ai_analysis,
        folder_id,
        tags: tag_ids,
    };
    state.store.save_testcase(&testcase)?;
    state.store.set_executable_tags(&request.team_id, "testcase", testcase_id.as_str(), &request.tags)?;
    Ok(Envelope::ok(TestcaseSaveResponse { testcase_id }))
}

#[derive(Debug, Serialize)]
struct TestcaseSaveResponse {
    testcase_id: TestcaseId,
}

async fn handle_testcase_list(State(state): State<ServerState>, Query(query): Query<TeamQuery>) -> Result<Json<Envelope<TestcaseListResponse>>, ApiError> {
    let testcases = state.store.list_testcases(&query.team_id)?;
    Ok(Envelope::ok(TestcaseListResponse { testcases }))
}

#[derive(Debug, Serialize)]
struct TestcaseListResponse {
    testcases: Vec<Testcase>,
}

async fn handle_testcase_get(State(state): State<ServerState>, Path(id): Path<String>, Query(query): Query<TeamQuery>) -> Result<Json<Envelope<TestcaseResponse>>, ApiError> {
    let testcase = state.store.get_testcase(&query.team_id, &TestcaseId::new(id))?;
    Ok(Envelope::ok(TestcaseResponse { testcase }))
}

#[derive(Debug, Serialize)]
struct TestcaseResponse {
    testcase: Testcase,
}

async fn handle_testcase_delete(State(state): State<ServerState>, Path(id): Path<String>, Query(query): Query<TeamQuery>) -> Result<Json<Envelope<Value>>, ApiError> {
    state.store.delete_testcase(&query.team_id, &TestcaseId::new(id))?;
    Ok(Envelope::ok(json!({})))
}

async fn handle_testcase_history(State(state): State<ServerState>, Path(id): Path<String>, Query(query): Query<TeamQuery>) -> Result<Json<Envelope<HistoryResponse>>, ApiError> {
    let executions = state.store.list_executions(&query.team_id, &TestcaseId::new(id))?;
    Ok(Envelope::ok(HistoryResponse { executions }))
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    executions: Vec<ExecutionResult>,
}

#[derive(Debug, Deserialize)]
struct TestcaseExecuteRequest {
    team_id: TeamId,
    host: String,
    device_id: DeviceId,
    #[serde(default)]
    user: String,
}

/// `POST /server/testcase/{id}/execute` (§6.1): resolves the testcase by id
/// (so the Host never needs a direct store read for it), proxies the async
/// `executeTask`/`status` pattern to completion, and persists the outcome as
/// a `script_results` row (§4.5).
async fn handle_testcase_execute(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(request): Json<TestcaseExecuteRequest>,
) -> Result<Json<Envelope<TestcaseExecuteResponse>>, ApiError> {
    let testcase_id = TestcaseId::new(id);
    let testcase = state.store.get_testcase(&request.team_id, &testcase_id)?;

    let _device_guard = state.locks.claim_device(request.device_id.clone())?;
    let host_url = resolve_host_url(&state, &request.host, &request.device_id)?;

    let body = execute_task_body(&request.team_id, &request.device_id, &testcase.name, None, Some(&testcase_id), None, true, false, None, None, &[]);

    let task_id = state.client.execute_task(&host_url, "testcase", &request.team_id, &request.user, &body)?;
    state.tasks.record(task_id.task_id.clone(), host_url.clone(), "testcase".to_string());

    let status = poll_to_completion(&state, &host_url, "testcase", &request.team_id, &task_id.task_id, Duration::from_secs(default_poll_timeout_secs())).await?;
    record_script_result(&state, &request.team_id, vpt_core::core::ScriptType::Testcase, &testcase.name, &request.device_id, &status);

    Ok(Envelope::ok(TestcaseExecuteResponse { task_id: task_id.task_id, success: status.success.unwrap_or(false) }))
}

#[derive(Debug, Serialize)]
struct TestcaseExecuteResponse {
    task_id: TaskId,
    success: bool,
}

// ============================================================================
// SECTION: Folders / Tags (§6.1 "folders/tags options", §6.5)
// ============================================================================

async fn handle_folders_tags(State(state): State<ServerState>, Query(query): Query<TeamQuery>) -> Result<Json<Envelope<FoldersTagsResponse>>, ApiError> {
    let folders = state.store.list_folders(&query.team_id)?;
    let tags = state.store.list_tags(&query.team_id)?;
    Ok(Envelope::ok(FoldersTagsResponse { folders, tags }))
}

#[derive(Debug, Serialize)]
struct FoldersTagsResponse {
    folders: Vec<vpt_core::core::Folder>,
    tags: Vec<vpt_core::core::Tag>,
}

// ============================================================================
// SECTION: Executable listing (§6.1 `executable/list`)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ExecutableListQuery {
    team_id: TeamId,
    #[serde(default)]
    folder: Option<String>,
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    search: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExecutableItem {
    #[serde(rename = "type")]
    item_type: &'static str,
    id: TestcaseId,
    name: String,
    tags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ExecutableFolderGroup {
    id: FolderId,
    name: String,
    items: Vec<ExecutableItem>,
}

#[derive(Debug, Serialize)]
struct ExecutableListResponse {
    folders: Vec<ExecutableFolderGroup>,
    all_tags: Vec<String>,
    all_folders: Vec<String>,
}

/// `GET /server/executable/list?folder=&tags=&search=` (§6.1): merges
/// testcases and scripts into one folder-grouped listing. Only testcases are
/// persisted by this core (script files live on a Host's filesystem, out of
/// scope per §1), so this projection only ever yields `"testcase"` items.
async fn handle_executable_list(State(state): State<ServerState>, Query(query): Query<ExecutableListQuery>) -> Result<Json<Envelope<ExecutableListResponse>>, ApiError> {
    let folders = state.store.list_folders(&query.team_id)?;
    let tags = state.store.list_tags(&query.team_id)?;
    let tag_by_id: std::collections::HashMap<_, _> = tags.iter().map(|tag| (tag.tag_id.clone(), tag.name.clone())).collect();
    let testcases = state.store.list_testcases(&query.team_id)?;

    let requested_tags: Vec<String> = query.tags.as_deref().map(|csv| csv.split(',').filter(|s| !s.is_empty()).map(str::to_lowercase).collect()).unwrap_or_default();
    let search_lower = query.search.as_deref().map(str::to_lowercase);

    let mut groups: Vec<ExecutableFolderGroup> = folders
        .iter()
        .filter(|folder| query.folder.as_deref().is_none_or(|name| folder.name == name))
        .map(|folder| ExecutableFolderGroup { id: folder.folder_id, name: folder.name.clone(), items: Vec::new() })
        .collect();

    for testcase in testcases {
        let names: Vec<String> = testcase.tags.iter().filter_map(|tag_id| tag_by_id.get(tag_id).cloned()).collect();
        if !requested_tags.is_empty() && !requested_tags.iter().all(|wanted| names.iter().any(|name| name.to_lowercase() == *wanted)) {
            continue;
        }
        if let Some(search) = &search_lower {
            if !testcase.name.to_lowercase().contains(search.as_str()) {
                continue;
            }
        }
        if let Some(group) = groups.iter_mut().find(|group| group.id == testcase.folder_id) {
            group.items.push(ExecutableItem { item_type: "testcase", id: testcase.testcase_id, name: testcase.name, tags: names });
        }
    }

    Ok(Envelope::ok(ExecutableListResponse {
        folders: groups,
        all_tags: tags.into_iter().map(|tag| tag.name).collect(),
        all_folders: folders.into_iter().map(|folder| folder.name).collect(),
    }))
}

// ============================================================================
// SECTION: AI agent (§6.1, §4.3, §4.5)
// ============================================================================

#[derive(Debug, Deserialize)]
struct AiExecuteTaskRequest {
    team_id: TeamId,
    task_description: String,
    host: String,
    device_id: DeviceId,
    #[serde(default = "default_true")]
    use_cache: bool,
    #[serde(default)]
    debug_mode: bool,
    #[serde(default)]
    user: String,
    device_model: Option<String>,
    ui_name: Option<String>,
    #[serde(default)]
    available_nodes: Vec<String>,
    root_tree_id: Option<TreeId>,
}

fn default_true() -> bool {
    true
}

/// `POST /server/aiagent/executeTask` (§6.1): submits to the Host and returns
/// `task_id` immediately; the client polls `getStatus` (§4.5).
async fn handle_ai_execute_task(State(state): State<ServerState>, Json(request): Json<AiExecuteTaskRequest>) -> Result<Json<Envelope<Value>>, ApiError> {
    let _device_guard = state.locks.claim_device(request.device_id.clone())?;
    let host_url = resolve_host_url(&state, &request.host, &request.device_id)?;
    let body = execute_task_body(
        &request.team_id,
        &request.device_id,
        &request.task_description,
        request.root_tree_id.as_ref(),
        None,
        Some(&request.task_description),
        request.use_cache,
        request.debug_mode,
        request.device_model.as_deref(),
        request.ui_name.as_deref(),
        &request.available_nodes,
    );
    let response = state.client.execute_task(&host_url, "ai", &request.team_id, &request.user, &body)?;
    state.tasks.record(response.task_id.clone(), host_url, "ai".to_string());
    Ok(Envelope::ok(json!({ "task_id": response.task_id })))
}

#[derive(Debug, Deserialize)]
struct AiStatusQuery {
    team_id: TeamId,
    task_id: TaskId,
    #[serde(default)]
    since: u64,
}

/// `GET /server/aiagent/getStatus?task_id=&since=` (§6.1): proxies to the
/// Host this `task_id` was submitted to, forwarding `since` so the client
/// only ever sees log entries past its last observed index (§5).
async fn handle_ai_get_status(State(state): State<ServerState>, Query(query): Query<AiStatusQuery>) -> Result<Json<Envelope<Value>>, ApiError> {
    let route = state.tasks.resolve(&query.task_id).ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("no such task: {}", query.task_id)))?;
    let status = state.client.task_status(&route.host_url, &route.kind, &query.team_id, &query.task_id, query.since)?;
    if status.done {
        state.tasks.forget(&query.task_id);
    }
    Ok(Envelope::ok(json!({
        "is_executing": status.is_executing,
        "current_step": status.current_step,
        "current_position": status.current_position,
        "execution_log": status.execution_log_delta,
    })))
}

// ============================================================================
// SECTION: AI testcase pipeline (§6.1; AI analysis itself is an external
// collaborator per §1 — this projects existing tree/testcase metadata into
// the shapes the pipeline's HTTP contract promises, without calling a model)
// ============================================================================

#[derive(Debug, Deserialize)]
struct AnalyzeTestcaseRequest {
    team_id: TeamId,
    #[serde(default)]
    prompt: String,
}

#[derive(Debug, Serialize)]
struct AnalyzeTestcaseResponse {
    analysis_id: String,
    compatibility: std::collections::BTreeMap<String, bool>,
}

/// `POST /server/aitestcase/analyzeTestCase {prompt}` (§6.1): a real
/// deployment asks an AI model to match `prompt` against each known UI; the
/// model call is out of scope (§1), so this returns every UI name already
/// known from stored testcases marked compatible, and nothing else.
async fn handle_analyze_testcase(State(state): State<ServerState>, Json(request): Json<AnalyzeTestcaseRequest>) -> Result<Json<Envelope<AnalyzeTestcaseResponse>>, ApiError> {
    let testcases = state.store.list_testcases(&request.team_id)?;
    let mut compatibility = std::collections::BTreeMap::new();
    for testcase in testcases {
        compatibility.entry(testcase.ui_name).or_insert(true);
    }
    let _ = request.prompt;
    Ok(Envelope::ok(AnalyzeTestcaseResponse { analysis_id: uuid::Uuid::new_v4().to_string(), compatibility }))
}

#[derive(Debug, Deserialize)]
struct GenerateTestcasesRequest {
    team_id: TeamId,
    analysis_id: String,
    confirmed_userinterfaces: Vec<String>,
}

/// `POST /server/aitestcase/generateTestCases {analysis_id,
/// confirmed_userinterfaces[]}` (§6.1): persists one `creation_method: ai`
/// placeholder testcase per confirmed UI. Populating `graph_json` with an
/// actually-useful graph requires the AI provider (§1 out of scope); callers
/// are expected to fill it in via `testcase/save` once a plan exists.
async fn handle_generate_testcases(State(state): State<ServerState>, Json(request): Json<GenerateTestcasesRequest>) -> Result<Json<Envelope<GenerateTestcasesResponse>>, ApiError> {
    let mut generated = Vec::with_capacity(request.confirmed_userinterfaces.len());
    for ui_name in request.confirmed_userinterfaces {
        let testcase_id = TestcaseId::new(uuid::Uuid::new_v4().to_string());
        let testcase = Testcase {
            testcase_id: testcase_id.clone(),
            team_id: request.team_id.clone(),
            name: format!("ai-generated-{ui_name}"),
            ui_name,
            graph_json: json!({ "nodes": [], "edges": [] }),
            creation_method: CreationMethod::Ai,
            ai_prompt: None,
            ai_analysis: Some(json!({ "analysis_id": request.analysis_id })),
            folder_id: FolderId::new(0),
            tags: Vec::new(),
        };
        state.store.save_testcase(&testcase)?;
        generated.push(testcase_id);
    }
    Ok(Envelope::ok(GenerateTestcasesResponse { testcase_ids: generated }))
}

#[derive(Debug, Serialize)]
struct GenerateTestcasesResponse {
    testcase_ids: Vec<TestcaseId>,
}

#[derive(Debug, Deserialize)]
struct ExecuteAiTestcaseRequest {
    team_id: TeamId,
    test_case_id: TestcaseId,
    device_id: DeviceId,
    host: String,
    #[serde(default)]
    user: String,
}

/// `POST /server/aitestcase/executeTestCase` (§6.1): the same proxy/poll
/// pattern as `testcase/{id}/execute`, addressed by body instead of path.
async fn handle_execute_ai_testcase(State(state): State<ServerState>, Json(request): Json<ExecuteAiTestcaseRequest>) -> Result<Json<Envelope<TestcaseExecuteResponse>>, ApiError> {
    let testcase = state.store.get_testcase(&request.team_id, &request.test_case_id)?;
    let _device_guard = state.locks.claim_device(request.device_id.clone())?;
    let host_url = resolve_host_url(&state, &request.host, &request.device_id)?;
    let body = execute_task_body(&request.team_id, &request.device_id, &testcase.name, None, Some(&request.test_case_id), None, true, false, None, None, &[]);
    let task_id = state.client.execute_task(&host_url, "testcase", &request.team_id, &request.user, &body)?;
    state.tasks.record(task_id.task_id.clone(), host_url.clone(), "testcase".to_string());
    let status = poll_to_completion(&state, &host_url, "testcase", &request.team_id, &task_id.task_id, Duration::from_secs(default_poll_timeout_secs())).await?;
    record_script_result(&state, &request.team_id, vpt_core::core::ScriptType::Ai, &testcase.name, &request.device_id, &status);
    Ok(Envelope::ok(TestcaseExecuteResponse { task_id: task_id.task_id, success: status.success.unwrap_or(false) }))
}

// ============================================================================
// SECTION: Script execution / multi-device fan-out (§4.5, §5, §8 scenario 4)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct ScriptTarget {
    host: String,
    device_id: DeviceId,
}

#[derive(Debug, Deserialize)]
struct ScriptExecuteRequest {
    team_id: TeamId,
    script_name: String,
    targets: Vec<ScriptTarget>,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    user: String,
}

#[derive(Debug, Serialize)]
struct ScriptTargetResult {
    host: String,
    device_id: DeviceId,
    task_id: Option<TaskId>,
    success: bool,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ScriptExecuteResponse {
    results: Vec<ScriptTargetResult>,
}

/// `POST /server/script/execute {script_name, targets:[{host,device_id}],
/// params}` (§6.1, §4.5 "Multi-device script execution", §8 scenario 4): one
/// proxied execution per target; per-device failure does not cancel others;
/// a second fan-out for the same team is rejected with `DeviceBusy` while any
/// target from the first is still outstanding.
async fn handle_script_execute(State(state): State<ServerState>, Json(request): Json<ScriptExecuteRequest>) -> Result<Json<Envelope<ScriptExecuteResponse>>, ApiError> {
    state.locks.begin_team_fanout(&request.team_id, request.targets.len())?;

    let mut handles = Vec::with_capacity(request.targets.len());
    for target in request.targets {
        let state = state.clone();
        let team_id = request.team_id.clone();
        let script_name = request.script_name.clone();
        let params = request.params.clone();
        let user = request.user.clone();
        handles.push(tokio::spawn(async move { run_one_target(&state, &team_id, &script_name, &params, &user, target).await }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap_or_else(|join_error| ScriptTargetResult {
            host: String::new(),
            device_id: DeviceId::new(""),
            task_id: None,
            success: false,
            error: Some(format!("execution task panicked: {join_error}")),
        }));
    }

    Ok(Envelope::ok(ScriptExecuteResponse { results }))
}

async fn run_one_target(state: &ServerState, team_id: &TeamId, script_name: &str, params: &Value, user: &str, target: ScriptTarget) -> ScriptTargetResult {
    let outcome = run_one_target_inner(state, team_id, script_name, params, user, &target).await;
    state.locks.complete_team_target(team_id);
    match outcome {
        Ok((task_id, success)) => ScriptTargetResult { host: target.host, device_id: target.device_id, task_id: Some(task_id), success, error: None },
        Err(error) => ScriptTargetResult { host: target.host, device_id: target.device_id, task_id: None, success: false, error: Some(error.message().to_string()) },
    }
}

/// Resolves `script_name` against the team's stored testcases: this core
/// does not persist standalone script files (§1 Non-goals), so a "script" is
/// whichever testcase carries that name, and `params` rides along in the
/// proxied body for a Host implementation that chooses to honor it, but the
/// execute contract itself (`vpt-host`'s `ExecuteTaskRequest`) has no generic
/// params slot today.
async fn run_one_target_inner(
    state: &ServerState,
    team_id: &TeamId,
    script_name: &str,
    params: &Value,
    user: &str,
    target: &ScriptTarget,
) -> Result<(TaskId, bool), ApiError> {
    let testcase = state
        .store
        .list_testcases(team_id)?
        .into_iter()
        .find(|testcase| testcase.name == script_name)
        .ok_or_else(|| vpt_core::core::CoreError::NotFound(format!("script '{script_name}'")))?;

    let _device_guard = state.locks.claim_device(target.device_id.clone())?;
    let host_url = resolve_host_url(state, &target.host, &target.device_id)?;
    let mut body = execute_task_body(team_id, &target.device_id, script_name, None, Some(&testcase.testcase_id), None, true, false, None, None, &[]);
    if let Some(object) = body.as_object_mut() {
        object.insert("params".to_string(), params.clone());
    }
    let task_id = state.client.execute_task(&host_url, "testcase", team_id, user, &body)?;
    state.tasks.record(task_id.task_id.clone(), host_url.clone(), "testcase".to_string());
    let status = poll_to_completion(state, &host_url, "testcase", team_id, &task_id.task_id, Duration::from_secs(default_poll_timeout_secs())).await?;
    record_script_result(state, team_id, vpt_core::core::ScriptType::Script, script_name, &target.device_id, &status);
    Ok((task_id.task_id, status.success.unwrap_or(false)))
}

// ============================================================================
// SECTION: Shared proxy helpers
// ============================================================================

/// Resolves `device_id`'s owning host URL from the registry, falling back to
/// the caller-supplied `host` field only when the registry has no record yet
/// (e.g. in tests that talk to a Host directly without it having registered).
fn resolve_host_url(state: &ServerState, host_hint: &str, device_id: &DeviceId) -> Result<String, ApiError> {
    if let Some(url) = state.hosts.resolve_device(device_id, chrono::Utc::now(), state.unavailable_after()) {
        return Ok(url);
    }
    if host_hint.starts_with("http://") || host_hint.starts_with("https://") {
        return Ok(host_hint.to_string());
    }
    Err(vpt_core::core::CoreError::DeviceUnavailable(format!("no host registered for device {device_id}")).into())
}

/// Builds an `executeTask` request body. `vpt-host`'s `ExecuteTaskRequest`
/// leaves most of its `Option` fields without a `#[serde(default)]`, so a
/// key that's merely absent (as opposed to present with a `null` value)
/// fails deserialization there; every call site goes through this helper so
/// none of them rediscover that the hard way.
#[allow(clippy::too_many_arguments)]
fn execute_task_body(
    team_id: &TeamId,
    device_id: &DeviceId,
    script_name: &str,
    root_tree_id: Option<&TreeId>,
    testcase_id: Option<&TestcaseId>,
    ai_prompt: Option<&str>,
    use_cache: bool,
    debug_mode: bool,
    device_model: Option<&str>,
    ui_name: Option<&str>,
    available_nodes: &[String],
) -> Value {
    json!({
        "team_id": team_id,
        "device_id": device_id,
        "script_name": script_name,
        "root_tree_id": root_tree_id,
        "testcase_id": testcase_id,
        "graph": Value::Null,
        "ai_prompt": ai_prompt,
        "use_cache": use_cache,
        "debug_mode": debug_mode,
        "device_model": device_model,
        "ui_name": ui_name,
        "available_nodes": available_nodes,
    })
}

/// Polls `GET /host/{kind}/status` on `host_url` every
/// `status_poll_interval_ms` until the task reaches a terminal state or
/// `timeout` elapses (§4.5 "Server polls ... every ~1 s").
async fn poll_to_completion(
    state: &ServerState,
    host_url: &str,
    kind: &str,
    team_id: &TeamId,
    task_id: &TaskId,
    timeout: Duration,
) -> Result<vpt_client::TaskStatus, ApiError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut since = 0u64;
    loop {
        let client = state.client.clone();
        let host_url = host_url.to_string();
        let kind = kind.to_string();
        let team_id = team_id.clone();
        let task_id = task_id.clone();
        let status = tokio::task::spawn_blocking(move || client.task_status(&host_url, &kind, &team_id, &task_id, since))
            .await
            .map_err(|join_error| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("status poll task panicked: {join_error}")))??;
        since += status.execution_log_delta.len() as u64;
        if status.done {
            return Ok(status);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ApiError::new(StatusCode::GATEWAY_TIMEOUT, format!("task {task_id} did not complete within {}s", timeout.as_secs())));
        }
        tokio::time::sleep(state.config.status_poll_interval()).await;
    }
}

/// Persists a `script_results` row on the Server's own store reflecting a
/// completed proxied execution, so `/testcase/{id}/history` and review
/// tooling have something to read even though the execution itself ran on a
/// Host with its own separate store (§6.3 `script_result.insert`).
fn record_script_result(state: &ServerState, team_id: &TeamId, script_type: vpt_core::core::ScriptType, script_name: &str, device_id: &DeviceId, status: &vpt_client::TaskStatus) {
    let result = ExecutionResult {
        script_type,
        script_name: script_name.to_string(),
        host: vpt_core::core::ids::HostId::new(""),
        device_id: device_id.clone(),
        success: status.success.unwrap_or(false),
        canceled: false,
        started_at: chrono::Utc::now(),
        execution_time_ms: 0,
        report_url: None,
        step_results: Vec::new(),
        checked: None,
        check_type: None,
        discard: None,
        discard_type: None,
        discard_comment: None,
    };
    if let Err(error) = state.store.insert_script_result(team_id, &result) {
        tracing::warn!(%error, "failed to record proxied script result");
    }
}
