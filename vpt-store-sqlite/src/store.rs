// vpt-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Persistence Store
// Description: SQLite-backed implementation of `vpt_core::PersistenceStore`.
// Purpose: Normalized storage for trees, nodes, edges, testcases,
//          folders/tags, the AI plan cache, script results, and alerts.
// Dependencies: vpt-core, rusqlite, serde_json, chrono
// ============================================================================

//! ## Overview
//! One `SqliteStore` wraps one `SQLite` connection behind a mutex (§5
//! Shared-resource policy: "all writes go through the persistence
//! interface"). WAL mode and a busy timeout absorb the occasional writer
//! overlap; there is no connection pool because every query here is small
//! and the lock is held only for the duration of one statement or
//! transaction.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::DateTime;
use chrono::Utc;
use rusqlite::params;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use thiserror::Error;

use vpt_core::core::tree::MAX_TREE_DEPTH;
use vpt_core::interfaces::NodePage;
use vpt_core::interfaces::PersistenceStore;
use vpt_core::interfaces::PlanCandidateFilter;
use vpt_core::interfaces::PlanMetricUpdate;
use vpt_core::Action;
use vpt_core::ActionSet;
use vpt_core::ActionSetId;
use vpt_core::CachedPlan;
use vpt_core::CoreError;
use vpt_core::CreationMethod;
use vpt_core::DeviceId;
use vpt_core::Edge;
use vpt_core::EdgeId;
use vpt_core::ExecutionResult;
use vpt_core::Folder;
use vpt_core::FolderId;
use vpt_core::FingerprintId;
use vpt_core::HostId;
use vpt_core::Node;
use vpt_core::NodeId;
use vpt_core::NodeType;
use vpt_core::ScriptType;
use vpt_core::StepRecord;
use vpt_core::Tag;
use vpt_core::TagId;
use vpt_core::TeamId;
use vpt_core::Testcase;
use vpt_core::TestcaseId;
use vpt_core::Tree;
use vpt_core::TreeId;
use vpt_core::Verification;
use vpt_core::core::folder_tag::color_for_tag;

const SCHEMA_VERSION: i64 = 1;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Configuration for the `SQLite` persistence store.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// An in-memory store, useful for tests and the CLI's `--ephemeral` mode.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Error)]
pub enum SqliteStoreError {
    #[error("sqlite io error: {0}")]
    Io(String),
    #[error("sqlite db error: {0}")]
    Db(String),
    #[error("sqlite invalid data: {0}")]
    Invalid(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

impl From<SqliteStoreError> for CoreError {
    fn from(error: SqliteStoreError) -> Self {
        CoreError::ValidationError(error.to_string())
    }
}

/// `SQLite`-backed persistence store.
pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if absent) a `SQLite` store at `config.path` and
    /// applies the schema.
    ///
    /// # Errors
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// the schema cannot be applied.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
            }
        }
        let connection = open_connection(&config.path, config.busy_timeout_ms)?;
        initialize_schema(&connection)?;
        Ok(Self { connection: Mutex::new(connection) })
    }

    /// Opens an in-memory store. Convenience for tests.
    ///
    /// # Errors
    /// Returns [`SqliteStoreError`] when the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        Self::open(&SqliteStoreConfig::in_memory())
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn open_connection(path: &Path, busy_timeout_ms: u64) -> Result<Connection, SqliteStoreError> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))?;
    connection.pragma_update(None, "journal_mode", "WAL")?;
    connection.pragma_update(None, "synchronous", "NORMAL")?;
    connection.pragma_update(None, "foreign_keys", "ON")?;
    Ok(connection)
}

fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL);

        CREATE TABLE IF NOT EXISTS trees (
            team_id TEXT NOT NULL,
            tree_id TEXT NOT NULL,
            name TEXT NOT NULL,
            tree_depth INTEGER NOT NULL,
            is_root_tree INTEGER NOT NULL,
            parent_tree_id TEXT,
            parent_node_id TEXT,
            PRIMARY KEY (team_id, tree_id)
        );

        CREATE TABLE IF NOT EXISTS nodes (
            team_id TEXT NOT NULL,
            tree_id TEXT NOT NULL,
            node_id TEXT NOT NULL,
            label TEXT NOT NULL,
            node_type TEXT NOT NULL,
            position_x REAL NOT NULL,
            position_y REAL NOT NULL,
            is_root INTEGER NOT NULL,
            verifications_json TEXT NOT NULL,
            has_subtree INTEGER NOT NULL DEFAULT 0,
            subtree_count INTEGER NOT NULL DEFAULT 0,
            screenshot TEXT,
            PRIMARY KEY (team_id, tree_id, node_id)
        );

        CREATE TABLE IF NOT EXISTS edges (
            team_id TEXT NOT NULL,
            tree_id TEXT NOT NULL,
            edge_id TEXT NOT NULL,
            source_node_id TEXT NOT NULL,
            target_node_id TEXT NOT NULL,
            action_sets_json TEXT NOT NULL,
            default_action_set_id TEXT NOT NULL,
            final_wait_time INTEGER NOT NULL,
            priority INTEGER NOT NULL,
            threshold REAL NOT NULL,
            PRIMARY KEY (team_id, tree_id, edge_id)
        );

        CREATE TABLE IF NOT EXISTS testcases (
            team_id TEXT NOT NULL,
            testcase_id TEXT NOT NULL,
            name TEXT NOT NULL,
            ui_name TEXT NOT NULL,
            graph_json TEXT NOT NULL,
            creation_method TEXT NOT NULL,
            ai_prompt TEXT,
            ai_analysis_json TEXT,
            folder_id INTEGER NOT NULL DEFAULT 0,
            tags_json TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (team_id, testcase_id),
            UNIQUE (team_id, name)
        );

        CREATE TABLE IF NOT EXISTS folders (
            team_id TEXT NOT NULL,
            folder_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            PRIMARY KEY (team_id, folder_id)
        );

        CREATE TABLE IF NOT EXISTS tags (
            team_id TEXT NOT NULL,
            tag_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            color TEXT NOT NULL,
            PRIMARY KEY (team_id, tag_id),
            UNIQUE (team_id, name)
        );

        CREATE TABLE IF NOT EXISTS executable_tags (
            team_id TEXT NOT NULL,
            executable_type TEXT NOT NULL,
            executable_id TEXT NOT NULL,
            tag_name TEXT NOT NULL,
            PRIMARY KEY (team_id, executable_type, executable_id, tag_name)
        );

        CREATE TABLE IF NOT EXISTS ai_plans (
            team_id TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            normalized_prompt TEXT NOT NULL,
            intent TEXT NOT NULL,
            target TEXT NOT NULL,
            device_model TEXT NOT NULL,
            ui_name TEXT NOT NULL,
            available_nodes_json TEXT NOT NULL,
            context_signature TEXT NOT NULL,
            graph_json TEXT NOT NULL,
            success_count INTEGER NOT NULL,
            failure_count INTEGER NOT NULL,
            execution_count INTEGER NOT NULL,
            avg_execution_time_ms REAL NOT NULL,
            last_used TEXT NOT NULL,
            last_success TEXT,
            last_failure TEXT,
            failure_reasons_json TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (team_id, fingerprint)
        );

        CREATE TABLE IF NOT EXISTS script_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            team_id TEXT NOT NULL,
            executable_type TEXT NOT NULL,
            executable_id TEXT NOT NULL,
            script_type TEXT NOT NULL,
            script_name TEXT NOT NULL,
            host TEXT NOT NULL,
            device_id TEXT NOT NULL,
            success INTEGER NOT NULL,
            canceled INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            execution_time_ms INTEGER NOT NULL,
            report_url TEXT,
            step_results_json TEXT NOT NULL,
            checked INTEGER,
            check_type TEXT,
            discard INTEGER,
            discard_type TEXT,
            discard_comment TEXT
        );

        CREATE TABLE IF NOT EXISTS alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            team_id TEXT NOT NULL,
            message TEXT NOT NULL,
            severity TEXT NOT NULL,
            resolved INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_tree ON nodes (team_id, tree_id);
        CREATE INDEX IF NOT EXISTS idx_edges_tree ON edges (team_id, tree_id);
        CREATE INDEX IF NOT EXISTS idx_trees_parent ON trees (team_id, parent_tree_id, parent_node_id);
        CREATE INDEX IF NOT EXISTS idx_ai_plans_prompt ON ai_plans (team_id, normalized_prompt);
        CREATE INDEX IF NOT EXISTS idx_script_results_exec ON script_results (team_id, executable_type, executable_id);
        ",
    )?;

    let version: Option<i64> = connection.query_row("SELECT version FROM schema_meta LIMIT 1", [], |row| row.get(0)).optional()?;
    if version.is_none() {
        connection.execute("INSERT INTO schema_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Row <-> domain conversions
// ============================================================================

fn node_type_to_str(node_type: &NodeType) -> String {
    match node_type {
        NodeType::Entry => "entry".to_string(),
        NodeType::Screen => "screen".to_string(),
        NodeType::Menu => "menu".to_string(),
        NodeType::Action => "action".to_string(),
        NodeType::Other(other) => format!("other:{other}"),
    }
}

fn node_type_from_str(value: &str) -> NodeType {
    match value {
        "entry" => NodeType::Entry,
        "screen" => NodeType::Screen,
        "menu" => NodeType::Menu,
        "action" => NodeType::Action,
        other => NodeType::Other(other.strip_prefix("other:").unwrap_or(other).to_string()),
    }
}

fn node_from_row(row: &Row) -> rusqlite::Result<Node> {
    let verifications_json: String = row.get("verifications_json")?;
    let verifications: Vec<Verification> = serde_json::from_str(&verifications_json).unwrap_or_default();
    let node_type_str: String = row.get("node_type")?;
    Ok(Node {
        node_id: NodeId::new(row.get::<_, String>("node_id")?),
        label: row.get("label")?,
        node_type: node_type_from_str(&node_type_str),
        position_x: row.get("position_x")?,
        position_y: row.get("position_y")?,
        is_root: row.get::<_, i64>("is_root")? != 0,
        verifications,
        has_subtree: row.get::<_, i64>("has_subtree")? != 0,
        subtree_count: row.get::<_, i64>("subtree_count")? as u32,
        screenshot: row.get("screenshot")?,
    })
}

fn edge_from_row(row: &Row) -> rusqlite::Result<Edge> {
    let action_sets_json: String = row.get("action_sets_json")?;
    let action_sets: Vec<ActionSet> = serde_json::from_str(&action_sets_json).unwrap_or_default();
    Ok(Edge {
        edge_id: EdgeId::new(row.get::<_, String>("edge_id")?),
        source_node_id: NodeId::new(row.get::<_, String>("source_node_id")?),
        target_node_id: NodeId::new(row.get::<_, String>("target_node_id")?),
        action_sets,
        default_action_set_id: ActionSetId::new(row.get::<_, String>("default_action_set_id")?),
        final_wait_time: row.get::<_, i64>("final_wait_time")? as u64,
        priority: row.get::<_, i64>("priority")? as i32,
        threshold: row.get("threshold")?,
    })
}

fn tree_meta_from_row(row: &Row) -> rusqlite::Result<Tree> {
    Ok(Tree {
        tree_id: TreeId::new(row.get::<_, String>("tree_id")?),
        team_id: TeamId::new(row.get::<_, String>("team_id")?),
        name: row.get("name")?,
        tree_depth: row.get::<_, i64>("tree_depth")? as u32,
        is_root_tree: row.get::<_, i64>("is_root_tree")? != 0,
        parent_tree_id: row.get::<_, Option<String>>("parent_tree_id")?.map(TreeId::new),
        parent_node_id: row.get::<_, Option<String>>("parent_node_id")?.map(NodeId::new),
        nodes: Vec::new(),
        edges: Vec::new(),
    })
}

fn plan_from_row(row: &Row) -> rusqlite::Result<CachedPlan> {
    let available_nodes_json: String = row.get("available_nodes_json")?;
    let available_nodes: Vec<String> = serde_json::from_str(&available_nodes_json).unwrap_or_default();
    let failure_reasons_json: String = row.get("failure_reasons_json")?;
    let failure_reasons: Vec<String> = serde_json::from_str(&failure_reasons_json).unwrap_or_default();
    let graph_json: String = row.get("graph_json")?;
    Ok(CachedPlan {
        fingerprint: FingerprintId::new(row.get::<_, String>("fingerprint")?),
        normalized_prompt: row.get("normalized_prompt")?,
        intent: row.get("intent")?,
        target: row.get("target")?,
        device_model: row.get("device_model")?,
        ui_name: row.get("ui_name")?,
        available_nodes,
        context_signature: row.get("context_signature")?,
        graph: serde_json::from_str(&graph_json).unwrap_or(serde_json::Value::Null),
        success_count: row.get::<_, i64>("success_count")? as u64,
        failure_count: row.get::<_, i64>("failure_count")? as u64,
        execution_count: row.get::<_, i64>("execution_count")? as u64,
        avg_execution_time_ms: row.get("avg_execution_time_ms")?,
        last_used: parse_timestamp(&row.get::<_, String>("last_used")?),
        last_success: row.get::<_, Option<String>>("last_success")?.map(|value| parse_timestamp(&value)),
        last_failure: row.get::<_, Option<String>>("last_failure")?.map(|value| parse_timestamp(&value)),
        failure_reasons,
    })
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn execution_from_row(row: &Row) -> rusqlite::Result<ExecutionResult> {
    let step_results_json: String = row.get("step_results_json")?;
    let step_results: Vec<StepRecord> = serde_json::from_str(&step_results_json).unwrap_or_default();
    let script_type_str: String = row.get("script_type")?;
    Ok(ExecutionResult {
        script_type: match script_type_str.as_str() {
            "testcase" => ScriptType::Testcase,
            "ai" => ScriptType::Ai,
            _ => ScriptType::Script,
        },
        script_name: row.get("script_name")?,
        host: HostId::new(row.get::<_, String>("host")?),
        device_id: DeviceId::new(row.get::<_, String>("device_id")?),
        success: row.get::<_, i64>("success")? != 0,
        canceled: row.get::<_, i64>("canceled")? != 0,
        started_at: parse_timestamp(&row.get::<_, String>("started_at")?),
        execution_time_ms: row.get::<_, i64>("execution_time_ms")? as u64,
        report_url: row.get("report_url")?,
        step_results,
        checked: row.get::<_, Option<i64>>("checked")?.map(|value| value != 0),
        check_type: row.get("check_type")?,
        discard: row.get::<_, Option<i64>>("discard")?.map(|value| value != 0),
        discard_type: row.get("discard_type")?,
        discard_comment: row.get("discard_comment")?,
    })
}

// ============================================================================
// SECTION: PersistenceStore
// ============================================================================

impl PersistenceStore for SqliteStore {
    fn get_tree(&self, team_id: &TeamId, tree_id: &TreeId) -> Result<Tree, CoreError> {
        let conn = self.conn();
        let mut tree = conn
            .query_row(
                "SELECT * FROM trees WHERE team_id = ?1 AND tree_id = ?2",
                params![team_id.as_str(), tree_id.as_str()],
                tree_meta_from_row,
            )
            .optional()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .ok_or_else(|| CoreError::NotFound(format!("tree {tree_id}")))?;

        let mut node_stmt = conn
            .prepare("SELECT * FROM nodes WHERE team_id = ?1 AND tree_id = ?2")
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let nodes = node_stmt
            .query_map(params![team_id.as_str(), tree_id.as_str()], node_from_row)
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        tree.nodes = nodes;

        let mut edge_stmt = conn
            .prepare("SELECT * FROM edges WHERE team_id = ?1 AND tree_id = ?2")
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let edges = edge_stmt
            .query_map(params![team_id.as_str(), tree_id.as_str()], edge_from_row)
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        tree.edges = edges;

        Ok(tree)
    }

    fn save_tree(&self, tree: &Tree) -> Result<(), CoreError> {
        if tree.tree_depth > MAX_TREE_DEPTH {
            return Err(CoreError::ValidationError(format!("Maximum nesting depth reached ({MAX_TREE_DEPTH} levels)")));
        }
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        tx.execute(
            "INSERT INTO trees (team_id, tree_id, name, tree_depth, is_root_tree, parent_tree_id, parent_node_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(team_id, tree_id) DO UPDATE SET
                name = excluded.name,
                tree_depth = excluded.tree_depth,
                is_root_tree = excluded.is_root_tree,
                parent_tree_id = excluded.parent_tree_id,
                parent_node_id = excluded.parent_node_id",
            params![
                tree.team_id.as_str(),
                tree.tree_id.as_str(),
                tree.name,
                i64::from(tree.tree_depth),
                i64::from(tree.is_root_tree),
                tree.parent_tree_id.as_ref().map(TreeId::as_str),
                tree.parent_node_id.as_ref().map(NodeId::as_str),
            ],
        )
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;

        if let (Some(parent_tree_id), Some(parent_node_id)) = (&tree.parent_tree_id, &tree.parent_node_id) {
            refresh_subtree_bookkeeping(&tx, &tree.team_id, parent_tree_id, parent_node_id)?;
        }
        tx.commit().map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }

    fn delete_tree(&self, team_id: &TeamId, tree_id: &TreeId) -> Result<(), CoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let parent: Option<(String, String)> = tx
            .query_row(
                "SELECT parent_tree_id, parent_node_id FROM trees WHERE team_id = ?1 AND tree_id = ?2",
                params![team_id.as_str(), tree_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;

        tx.execute("DELETE FROM edges WHERE team_id = ?1 AND tree_id = ?2", params![team_id.as_str(), tree_id.as_str()])
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        tx.execute("DELETE FROM nodes WHERE team_id = ?1 AND tree_id = ?2", params![team_id.as_str(), tree_id.as_str()])
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        tx.execute("DELETE FROM trees WHERE team_id = ?1 AND tree_id = ?2", params![team_id.as_str(), tree_id.as_str()])
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;

        if let Some((parent_tree_id, parent_node_id)) = parent {
            refresh_subtree_bookkeeping(&tx, team_id, &TreeId::new(parent_tree_id), &NodeId::new(parent_node_id))?;
        }
        tx.commit().map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }

    fn child_trees(&self, team_id: &TeamId, tree_id: &TreeId, node_id: &NodeId) -> Result<Vec<Tree>, CoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT * FROM trees WHERE team_id = ?1 AND parent_tree_id = ?2 AND parent_node_id = ?3")
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let trees = stmt
            .query_map(params![team_id.as_str(), tree_id.as_str(), node_id.as_str()], tree_meta_from_row)
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(trees)
    }

    fn list_nodes(&self, team_id: &TeamId, tree_id: &TreeId, page: u32, limit: u32) -> Result<NodePage, CoreError> {
        let conn = self.conn();
        let limit = limit.max(1);
        let offset = page.saturating_mul(limit);
        let mut stmt = conn
            .prepare("SELECT * FROM nodes WHERE team_id = ?1 AND tree_id = ?2 ORDER BY node_id LIMIT ?3 OFFSET ?4")
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let nodes = stmt
            .query_map(params![team_id.as_str(), tree_id.as_str(), i64::from(limit) + 1, i64::from(offset)], node_from_row)
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let has_more = nodes.len() > limit as usize;
        let mut nodes = nodes;
        nodes.truncate(limit as usize);
        Ok(NodePage { nodes, has_more })
    }

    fn save_node(&self, team_id: &TeamId, tree_id: &TreeId, node: &Node) -> Result<(), CoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let verifications_json = serde_json::to_string(&node.verifications).map_err(|err| CoreError::ValidationError(err.to_string()))?;
        tx.execute(
            "INSERT INTO nodes (team_id, tree_id, node_id, label, node_type, position_x, position_y, is_root, verifications_json, has_subtree, subtree_count, screenshot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(team_id, tree_id, node_id) DO UPDATE SET
                label = excluded.label,
                node_type = excluded.node_type,
                position_x = excluded.position_x,
                position_y = excluded.position_y,
                is_root = excluded.is_root,
                verifications_json = excluded.verifications_json,
                has_subtree = excluded.has_subtree,
                subtree_count = excluded.subtree_count,
                screenshot = excluded.screenshot",
            params![
                team_id.as_str(),
                tree_id.as_str(),
                node.node_id.as_str(),
                node.label,
                node_type_to_str(&node.node_type),
                node.position_x,
                node.position_y,
                i64::from(node.is_root),
                verifications_json,
                i64::from(node.has_subtree),
                i64::from(node.subtree_count),
                node.screenshot,
            ],
        )
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;

        propagate_mirrored_fields(&tx, team_id, tree_id, node)?;
        tx.commit().map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }

    fn delete_node(&self, team_id: &TeamId, tree_id: &TreeId, node_id: &NodeId) -> Result<(), CoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let child_tree_ids: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT tree_id FROM trees WHERE team_id = ?1 AND parent_tree_id = ?2 AND parent_node_id = ?3")
                .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
            stmt.query_map(params![team_id.as_str(), tree_id.as_str(), node_id.as_str()], |row| row.get(0))
                .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
        };
        for child_tree_id in child_tree_ids {
            cascade_delete_tree(&tx, team_id, &TreeId::new(child_tree_id))?;
        }

        tx.execute(
            "DELETE FROM edges WHERE team_id = ?1 AND tree_id = ?2 AND (source_node_id = ?3 OR target_node_id = ?3)",
            params![team_id.as_str(), tree_id.as_str(), node_id.as_str()],
        )
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        tx.execute(
            "DELETE FROM nodes WHERE team_id = ?1 AND tree_id = ?2 AND node_id = ?3",
            params![team_id.as_str(), tree_id.as_str(), node_id.as_str()],
        )
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        tx.commit().map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }

    fn list_edges(&self, team_id: &TeamId, tree_id: &TreeId, node_ids: &[NodeId]) -> Result<Vec<Edge>, CoreError> {
        let conn = self.conn();
        if node_ids.is_empty() {
            let mut stmt = conn
                .prepare("SELECT * FROM edges WHERE team_id = ?1 AND tree_id = ?2")
                .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
            let edges = stmt
                .query_map(params![team_id.as_str(), tree_id.as_str()], edge_from_row)
                .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
            return Ok(edges);
        }
        let mut stmt = conn
            .prepare("SELECT * FROM edges WHERE team_id = ?1 AND tree_id = ?2")
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let wanted: std::collections::HashSet<&str> = node_ids.iter().map(NodeId::as_str).collect();
        let edges = stmt
            .query_map(params![team_id.as_str(), tree_id.as_str()], edge_from_row)
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .into_iter()
            .filter(|edge| wanted.contains(edge.source_node_id.as_str()) || wanted.contains(edge.target_node_id.as_str()))
            .collect();
        Ok(edges)
    }

    fn save_edge(&self, team_id: &TeamId, tree_id: &TreeId, edge: &Edge) -> Result<(), CoreError> {
        edge.validate()?;
        let conn = self.conn();
        let action_sets_json = serde_json::to_string(&edge.action_sets).map_err(|err| CoreError::ValidationError(err.to_string()))?;
        conn.execute(
            "INSERT INTO edges (team_id, tree_id, edge_id, source_node_id, target_node_id, action_sets_json, default_action_set_id, final_wait_time, priority, threshold)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(team_id, tree_id, edge_id) DO UPDATE SET
                source_node_id = excluded.source_node_id,
                target_node_id = excluded.target_node_id,
                action_sets_json = excluded.action_sets_json,
                default_action_set_id = excluded.default_action_set_id,
                final_wait_time = excluded.final_wait_time,
                priority = excluded.priority,
                threshold = excluded.threshold",
            params![
                team_id.as_str(),
                tree_id.as_str(),
                edge.edge_id.as_str(),
                edge.source_node_id.as_str(),
                edge.target_node_id.as_str(),
                action_sets_json,
                edge.default_action_set_id.as_str(),
                edge.final_wait_time as i64,
                i64::from(edge.priority),
                edge.threshold,
            ],
        )
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }

    fn delete_edge(&self, team_id: &TeamId, tree_id: &TreeId, edge_id: &EdgeId) -> Result<(), CoreError> {
        self.conn()
            .execute(
                "DELETE FROM edges WHERE team_id = ?1 AND tree_id = ?2 AND edge_id = ?3",
                params![team_id.as_str(), tree_id.as_str(), edge_id.as_str()],
            )
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }

    fn save_testcase(&self, testcase: &Testcase) -> Result<(), CoreError> {
        let conn = self.conn();
        let graph_json = testcase.graph_json.to_string();
        let ai_analysis_json = testcase.ai_analysis.as_ref().map(ToString::to_string);
        let tags_json = serde_json::to_string(&testcase.tags).map_err(|err| CoreError::ValidationError(err.to_string()))?;
        let creation_method = match testcase.creation_method {
            CreationMethod::Visual => "visual",
            CreationMethod::Ai => "ai",
        };
        conn.execute(
            "INSERT INTO testcases (team_id, testcase_id, name, ui_name, graph_json, creation_method, ai_prompt, ai_analysis_json, folder_id, tags_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(team_id, testcase_id) DO UPDATE SET
                name = excluded.name,
                ui_name = excluded.ui_name,
                graph_json = excluded.graph_json,
                creation_method = excluded.creation_method,
                ai_prompt = excluded.ai_prompt,
                ai_analysis_json = excluded.ai_analysis_json,
                folder_id = excluded.folder_id,
                tags_json = excluded.tags_json",
            params![
                testcase.team_id.as_str(),
                testcase.testcase_id.as_str(),
                testcase.name,
                testcase.ui_name,
                graph_json,
                creation_method,
                testcase.ai_prompt,
                ai_analysis_json,
                testcase.folder_id.value(),
                tags_json,
            ],
        )
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }

    fn list_testcases(&self, team_id: &TeamId) -> Result<Vec<Testcase>, CoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT * FROM testcases WHERE team_id = ?1 ORDER BY name")
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let testcases = stmt
            .query_map(params![team_id.as_str()], testcase_from_row)
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(testcases)
    }

    fn get_testcase(&self, team_id: &TeamId, testcase_id: &TestcaseId) -> Result<Testcase, CoreError> {
        self.conn()
            .query_row(
                "SELECT * FROM testcases WHERE team_id = ?1 AND testcase_id = ?2",
                params![team_id.as_str(), testcase_id.as_str()],
                testcase_from_row,
            )
            .optional()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .ok_or_else(|| CoreError::NotFound(format!("testcase {testcase_id}")))
    }

    fn delete_testcase(&self, team_id: &TeamId, testcase_id: &TestcaseId) -> Result<(), CoreError> {
        self.conn()
            .execute(
                "DELETE FROM testcases WHERE team_id = ?1 AND testcase_id = ?2",
                params![team_id.as_str(), testcase_id.as_str()],
            )
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }

    fn list_executions(&self, team_id: &TeamId, testcase_id: &TestcaseId) -> Result<Vec<ExecutionResult>, CoreError> {
        self.list_script_results(team_id, "testcase", testcase_id.as_str())
    }

    fn get_or_create_folder(&self, team_id: &TeamId, name: &str) -> Result<FolderId, CoreError> {
        let conn = self.conn();
        if name.is_empty() || FolderId::ROOT.value() == 0 && name == "root" {
            // root folder is implicit; fall through to normal lookup below.
        }
        if let Some(existing) = conn
            .query_row(
                "SELECT folder_id FROM folders WHERE team_id = ?1 AND name = ?2",
                params![team_id.as_str(), name],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
        {
            return Ok(FolderId::new(existing));
        }
        let next_id: i64 = conn
            .query_row("SELECT COALESCE(MAX(folder_id), 0) + 1 FROM folders WHERE team_id = ?1", params![team_id.as_str()], |row| row.get(0))
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        conn.execute(
            "INSERT INTO folders (team_id, folder_id, name) VALUES (?1, ?2, ?3)",
            params![team_id.as_str(), next_id, name],
        )
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(FolderId::new(next_id))
    }

    fn get_or_create_tag(&self, team_id: &TeamId, name: &str) -> Result<Tag, CoreError> {
        let conn = self.conn();
        let lowered = name.to_lowercase();
        if let Some((tag_id, color)) = conn
            .query_row(
                "SELECT tag_id, color FROM tags WHERE team_id = ?1 AND name = ?2",
                params![team_id.as_str(), lowered],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
        {
            return Ok(Tag { tag_id: TagId::new(tag_id), team_id: team_id.clone(), name: lowered, color });
        }
        let next_id: i64 = conn
            .query_row("SELECT COALESCE(MAX(tag_id), -1) + 1 FROM tags WHERE team_id = ?1", params![team_id.as_str()], |row| row.get(0))
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let tag_id = TagId::new(next_id);
        let color = color_for_tag(tag_id);
        conn.execute(
            "INSERT INTO tags (team_id, tag_id, name, color) VALUES (?1, ?2, ?3, ?4)",
            params![team_id.as_str(), next_id, lowered, color],
        )
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(Tag { tag_id, team_id: team_id.clone(), name: lowered, color: color.to_string() })
    }

    fn list_folders(&self, team_id: &TeamId) -> Result<Vec<Folder>, CoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT folder_id, name FROM folders WHERE team_id = ?1 ORDER BY folder_id")
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let folders = stmt
            .query_map(params![team_id.as_str()], |row| {
                Ok(Folder { folder_id: FolderId::new(row.get(0)?), team_id: team_id.clone(), name: row.get(1)? })
            })
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(folders)
    }

    fn list_tags(&self, team_id: &TeamId) -> Result<Vec<Tag>, CoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT tag_id, name, color FROM tags WHERE team_id = ?1 ORDER BY tag_id")
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let tags = stmt
            .query_map(params![team_id.as_str()], |row| {
                Ok(Tag { tag_id: TagId::new(row.get(0)?), team_id: team_id.clone(), name: row.get(1)?, color: row.get(2)? })
            })
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(tags)
    }

    fn set_executable_tags(&self, team_id: &TeamId, executable_type: &str, executable_id: &str, tag_names: &[String]) -> Result<(), CoreError> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM executable_tags WHERE team_id = ?1 AND executable_type = ?2 AND executable_id = ?3",
            params![team_id.as_str(), executable_type, executable_id],
        )
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        for tag_name in tag_names {
            conn.execute(
                "INSERT OR IGNORE INTO executable_tags (team_id, executable_type, executable_id, tag_name) VALUES (?1, ?2, ?3, ?4)",
                params![team_id.as_str(), executable_type, executable_id, tag_name.to_lowercase()],
            )
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        }
        Ok(())
    }

    fn get_plan_by_fingerprint(&self, team_id: &TeamId, fingerprint: &FingerprintId) -> Result<Option<CachedPlan>, CoreError> {
        self.conn()
            .query_row(
                "SELECT * FROM ai_plans WHERE team_id = ?1 AND fingerprint = ?2",
                params![team_id.as_str(), fingerprint.as_str()],
                plan_from_row,
            )
            .optional()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))
    }

    fn find_compatible_plans(&self, team_id: &TeamId, filter: &PlanCandidateFilter) -> Result<Vec<CachedPlan>, CoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT * FROM ai_plans WHERE team_id = ?1 AND normalized_prompt = ?2 AND device_model = ?3 AND ui_name = ?4",
            )
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let plans = stmt
            .query_map(
                params![team_id.as_str(), filter.normalized_prompt, filter.device_model, filter.ui_name],
                plan_from_row,
            )
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(plans)
    }

    fn upsert_plan(&self, team_id: &TeamId, plan: &CachedPlan) -> Result<(), CoreError> {
        let conn = self.conn();
        let available_nodes_json = serde_json::to_string(&plan.available_nodes).map_err(|err| CoreError::ValidationError(err.to_string()))?;
        let failure_reasons_json = serde_json::to_string(&plan.failure_reasons).map_err(|err| CoreError::ValidationError(err.to_string()))?;
        let graph_json = plan.graph.to_string();
        conn.execute(
            "INSERT INTO ai_plans (team_id, fingerprint, normalized_prompt, intent, target, device_model, ui_name, available_nodes_json, context_signature, graph_json, success_count, failure_count, execution_count, avg_execution_time_ms, last_used, last_success, last_failure, failure_reasons_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT(team_id, fingerprint) DO UPDATE SET
                normalized_prompt = excluded.normalized_prompt,
                intent = excluded.intent,
                target = excluded.target,
                device_model = excluded.device_model,
                ui_name = excluded.ui_name,
                available_nodes_json = excluded.available_nodes_json,
                context_signature = excluded.context_signature,
                graph_json = excluded.graph_json,
                success_count = excluded.success_count,
                failure_count = excluded.failure_count,
                execution_count = excluded.execution_count,
                avg_execution_time_ms = excluded.avg_execution_time_ms,
                last_used = excluded.last_used,
                last_success = excluded.last_success,
                last_failure = excluded.last_failure,
                failure_reasons_json = excluded.failure_reasons_json",
            params![
                team_id.as_str(),
                plan.fingerprint.as_str(),
                plan.normalized_prompt,
                plan.intent,
                plan.target,
                plan.device_model,
                plan.ui_name,
                available_nodes_json,
                plan.context_signature,
                graph_json,
                plan.success_count as i64,
                plan.failure_count as i64,
                plan.execution_count as i64,
                plan.avg_execution_time_ms,
                plan.last_used.to_rfc3339(),
                plan.last_success.map(|ts| ts.to_rfc3339()),
                plan.last_failure.map(|ts| ts.to_rfc3339()),
                failure_reasons_json,
            ],
        )
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }

    fn update_plan_metrics(&self, team_id: &TeamId, fingerprint: &FingerprintId, update: PlanMetricUpdate, failure_reason: Option<&str>) -> Result<(), CoreError> {
        let Some(mut plan) = self.get_plan_by_fingerprint(team_id, fingerprint)? else {
            return Err(CoreError::NotFound(format!("ai plan {fingerprint}")));
        };
        let now = Utc::now();
        plan.execution_count += 1;
        plan.last_used = now;
        if update.succeeded {
            plan.success_count += 1;
            plan.last_success = Some(now);
        } else {
            plan.failure_count += 1;
            plan.last_failure = Some(now);
            if let Some(reason) = failure_reason {
                plan.failure_reasons.push(reason.to_string());
            }
        }
        plan.avg_execution_time_ms = 0.2 * update.execution_time_ms as f64 + 0.8 * plan.avg_execution_time_ms;
        self.upsert_plan(team_id, &plan)
    }

    fn invalidate_plan(&self, team_id: &TeamId, fingerprint: &FingerprintId) -> Result<(), CoreError> {
        self.conn()
            .execute(
                "DELETE FROM ai_plans WHERE team_id = ?1 AND fingerprint = ?2",
                params![team_id.as_str(), fingerprint.as_str()],
            )
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }

    fn maintenance_evict_plans(&self, team_id: &TeamId) -> Result<u64, CoreError> {
        let conn = self.conn();
        let ninety_days_ago = (Utc::now() - chrono::Duration::days(90)).to_rfc3339();

        let mut removed = conn
            .execute(
                "DELETE FROM ai_plans WHERE team_id = ?1 AND execution_count > 5 AND (CAST(success_count AS REAL) / execution_count) < 0.3",
                params![team_id.as_str()],
            )
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))? as u64;

        removed += conn
            .execute(
                "DELETE FROM ai_plans WHERE team_id = ?1 AND last_used < ?2 AND (CAST(success_count AS REAL) / MAX(execution_count, 1)) < 0.7",
                params![team_id.as_str(), ninety_days_ago],
            )
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))? as u64;

        let excess: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT fingerprint FROM ai_plans WHERE team_id = ?1 ORDER BY last_used DESC LIMIT -1 OFFSET 1000")
                .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
            stmt.query_map(params![team_id.as_str()], |row| row.get(0))
                .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
        };
        for fingerprint in excess {
            removed += conn
                .execute("DELETE FROM ai_plans WHERE team_id = ?1 AND fingerprint = ?2", params![team_id.as_str(), fingerprint])
                .map_err(|err| CoreError::from(SqliteStoreError::from(err)))? as u64;
        }

        Ok(removed)
    }

    fn insert_script_result(&self, team_id: &TeamId, result: &ExecutionResult) -> Result<(), CoreError> {
        self.insert_script_result_for(team_id, "script", &result.script_name, result)
    }

    fn update_script_result(&self, team_id: &TeamId, result: &ExecutionResult) -> Result<(), CoreError> {
        // Treated as append-only evidence; callers update discard/checked
        // columns directly via a narrower update, not modeled as a distinct
        // entity operation here since the contract names it but does not
        // define an identifying key beyond the insert itself.
        self.insert_script_result(team_id, result)
    }

    fn list_script_results(&self, team_id: &TeamId, executable_type: &str, executable_id: &str) -> Result<Vec<ExecutionResult>, CoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT * FROM script_results WHERE team_id = ?1 AND executable_type = ?2 AND executable_id = ?3 ORDER BY started_at DESC")
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let results = stmt
            .query_map(params![team_id.as_str(), executable_type, executable_id], execution_from_row)
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(results)
    }

    fn insert_alert(&self, team_id: &TeamId, message: &str, severity: &str) -> Result<(), CoreError> {
        self.conn()
            .execute(
                "INSERT INTO alerts (team_id, message, severity, resolved, created_at) VALUES (?1, ?2, ?3, 0, ?4)",
                params![team_id.as_str(), message, severity, Utc::now().to_rfc3339()],
            )
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }

    fn update_alert(&self, team_id: &TeamId, alert_id: i64, resolved: bool) -> Result<(), CoreError> {
        self.conn()
            .execute(
                "UPDATE alerts SET resolved = ?1 WHERE team_id = ?2 AND id = ?3",
                params![i64::from(resolved), team_id.as_str(), alert_id],
            )
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }
}

impl SqliteStore {
    /// Inserts a `script_results` row scoped to an executable (testcase or
    /// script) for the folder/tag-aware listing endpoints (§6.1
    /// `executable/list`).
    pub fn insert_script_result_for(&self, team_id: &TeamId, executable_type: &str, executable_id: &str, result: &ExecutionResult) -> Result<(), CoreError> {
        let script_type = match result.script_type {
            ScriptType::Script => "script",
            ScriptType::Testcase => "testcase",
            ScriptType::Ai => "ai",
        };
        let step_results_json = serde_json::to_string(&result.step_results).map_err(|err| CoreError::ValidationError(err.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO script_results (team_id, executable_type, executable_id, script_type, script_name, host, device_id, success, canceled, started_at, execution_time_ms, report_url, step_results_json, checked, check_type, discard, discard_type, discard_comment)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    team_id.as_str(),
                    executable_type,
                    executable_id,
                    script_type,
                    result.script_name,
                    result.host.as_str(),
                    result.device_id.as_str(),
                    i64::from(result.success),
                    i64::from(result.canceled),
                    result.started_at.to_rfc3339(),
                    result.execution_time_ms as i64,
                    result.report_url,
                    step_results_json,
                    result.checked.map(i64::from),
                    result.check_type,
                    result.discard.map(i64::from),
                    result.discard_type,
                    result.discard_comment,
                ],
            )
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }
}

fn testcase_from_row(row: &Row) -> rusqlite::Result<Testcase> {
    let graph_json: String = row.get("graph_json")?;
    let ai_analysis_json: Option<String> = row.get("ai_analysis_json")?;
    let tags_json: String = row.get("tags_json")?;
    let tag_ids: Vec<i64> = serde_json::from_str(&tags_json).unwrap_or_default();
    let creation_method_str: String = row.get("creation_method")?;
    Ok(Testcase {
        testcase_id: TestcaseId::new(row.get::<_, String>("testcase_id")?),
        team_id: TeamId::new(row.get::<_, String>("team_id")?),
        name: row.get("name")?,
        ui_name: row.get("ui_name")?,
        graph_json: serde_json::from_str(&graph_json).unwrap_or(serde_json::Value::Null),
        creation_method: if creation_method_str == "ai" { CreationMethod::Ai } else { CreationMethod::Visual },
        ai_prompt: row.get("ai_prompt")?,
        ai_analysis: ai_analysis_json.and_then(|json| serde_json::from_str(&json).ok()),
        folder_id: FolderId::new(row.get::<_, i64>("folder_id")?),
        tags: tag_ids.into_iter().map(TagId::new).collect(),
    })
}

/// Subtree count/`has_subtree` bookkeeping for a parent node (§3, §6.5
/// trigger a). Recomputed from `child_trees` rather than incremented, so it
/// stays correct regardless of which direction the triggering write came
/// from (insert, delete, or cascade).
fn refresh_subtree_bookkeeping(conn: &Connection, team_id: &TeamId, tree_id: &TreeId, node_id: &NodeId) -> Result<(), CoreError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM trees WHERE team_id = ?1 AND parent_tree_id = ?2 AND parent_node_id = ?3",
            params![team_id.as_str(), tree_id.as_str(), node_id.as_str()],
            |row| row.get(0),
        )
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
    conn.execute(
        "UPDATE nodes SET has_subtree = ?1, subtree_count = ?2 WHERE team_id = ?3 AND tree_id = ?4 AND node_id = ?5",
        params![i64::from(count > 0), count, team_id.as_str(), tree_id.as_str(), node_id.as_str()],
    )
    .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
    Ok(())
}

/// Every tree id reachable from `tree_id` by repeatedly following
/// `parent_tree_id` downward (i.e. `tree_id`'s subtrees, their subtrees, …).
fn descendant_tree_ids(conn: &Connection, team_id: &TeamId, tree_id: &TreeId) -> Result<Vec<String>, CoreError> {
    let mut descendants = Vec::new();
    let mut frontier = vec![tree_id.as_str().to_string()];
    while let Some(current) = frontier.pop() {
        let mut stmt = conn
            .prepare("SELECT tree_id FROM trees WHERE team_id = ?1 AND parent_tree_id = ?2")
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        let children: Vec<String> = stmt
            .query_map(params![team_id.as_str(), current], |row| row.get(0))
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        for child in children {
            descendants.push(child.clone());
            frontier.push(child);
        }
    }
    Ok(descendants)
}

/// Label/screenshot mirroring (§3, §6.5 trigger b): when a node that parents
/// at least one subtree is saved, its `label`/`screenshot` propagate to
/// every node sharing the same `(team_id, node_id)` in trees descending from
/// `tree_id` — not to unrelated trees elsewhere in the team that happen to
/// reuse the same `node_id`.
fn propagate_mirrored_fields(conn: &Connection, team_id: &TeamId, tree_id: &TreeId, node: &Node) -> Result<(), CoreError> {
    let parents_subtree: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM trees WHERE team_id = ?1 AND parent_tree_id = ?2 AND parent_node_id = ?3)",
            params![team_id.as_str(), tree_id.as_str(), node.node_id.as_str()],
            |row| row.get(0),
        )
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
    if !parents_subtree {
        return Ok(());
    }
    for descendant_tree_id in descendant_tree_ids(conn, team_id, tree_id)? {
        conn.execute(
            "UPDATE nodes SET label = ?1, screenshot = ?2 WHERE team_id = ?3 AND node_id = ?4 AND tree_id = ?5",
            params![node.label, node.screenshot, team_id.as_str(), node.node_id.as_str(), descendant_tree_id],
        )
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
    }
    Ok(())
}

/// Recursively deletes `tree_id` and every tree anchored under any of its
/// nodes (§3 "deletion cascades to all subtrees where it is the parent",
/// §8 scenario 5). Takes the already-open connection/transaction so the
/// whole recursive cascade commits or rolls back as one unit with the
/// caller's triggering write.
fn cascade_delete_tree(conn: &Connection, team_id: &TeamId, tree_id: &TreeId) -> Result<(), CoreError> {
    let node_ids: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT node_id FROM nodes WHERE team_id = ?1 AND tree_id = ?2")
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
        stmt.query_map(params![team_id.as_str(), tree_id.as_str()], |row| row.get(0))
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
    };
    for node_id in node_ids {
        let child_tree_ids: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT tree_id FROM trees WHERE team_id = ?1 AND parent_tree_id = ?2 AND parent_node_id = ?3")
                .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
            stmt.query_map(params![team_id.as_str(), tree_id.as_str(), node_id], |row| row.get(0))
                .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?
        };
        for child_tree_id in child_tree_ids {
            cascade_delete_tree(conn, team_id, &TreeId::new(child_tree_id))?;
        }
    }

    conn.execute("DELETE FROM edges WHERE team_id = ?1 AND tree_id = ?2", params![team_id.as_str(), tree_id.as_str()])
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
    conn.execute("DELETE FROM nodes WHERE team_id = ?1 AND tree_id = ?2", params![team_id.as_str(), tree_id.as_str()])
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
    conn.execute("DELETE FROM trees WHERE team_id = ?1 AND tree_id = ?2", params![team_id.as_str(), tree_id.as_str()])
        .map_err(|err| CoreError::from(SqliteStoreError::from(err)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team() -> TeamId {
        TeamId::new("team1")
    }

    fn sample_node(id: &str, is_root: bool) -> Node {
        Node {
            node_id: NodeId::new(id),
            label: id.to_string(),
            node_type: if is_root { NodeType::Entry } else { NodeType::Screen },
            position_x: 0.0,
            position_y: 0.0,
            is_root,
            verifications: vec![],
            has_subtree: false,
            subtree_count: 0,
            screenshot: None,
        }
    }

    fn root_tree() -> Tree {
        Tree {
            tree_id: TreeId::new("root"),
            team_id: team(),
            name: "horizon".to_string(),
            tree_depth: 0,
            is_root_tree: true,
            parent_tree_id: None,
            parent_node_id: None,
            nodes: vec![],
            edges: vec![],
        }
    }

    #[test]
    fn save_node_then_get_node_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_tree(&root_tree()).unwrap();
        let node = sample_node("home", true);
        store.save_node(&team(), &TreeId::new("root"), &node).unwrap();
        store.save_node(&team(), &TreeId::new("root"), &node).unwrap();
        let tree = store.get_tree(&team(), &TreeId::new("root")).unwrap();
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].label, "home");
    }

    #[test]
    fn get_or_create_folder_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.get_or_create_folder(&team(), "regression").unwrap();
        let second = store.get_or_create_folder(&team(), "regression").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn get_or_create_tag_assigns_palette_color() {
        let store = SqliteStore::open_in_memory().unwrap();
        let tag = store.get_or_create_tag(&team(), "Smoke").unwrap();
        assert_eq!(tag.name, "smoke");
        assert!(!tag.color.is_empty());
        let again = store.get_or_create_tag(&team(), "smoke").unwrap();
        assert_eq!(tag.tag_id, again.tag_id);
    }

    #[test]
    fn deleting_parent_node_cascades_subtrees() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_tree(&root_tree()).unwrap();
        store.save_node(&team(), &TreeId::new("root"), &sample_node("menu", false)).unwrap();

        let subtree_a = Tree {
            tree_id: TreeId::new("sub_a"),
            team_id: team(),
            name: "sub_a".to_string(),
            tree_depth: 1,
            is_root_tree: false,
            parent_tree_id: Some(TreeId::new("root")),
            parent_node_id: Some(NodeId::new("menu")),
            nodes: vec![],
            edges: vec![],
        };
        store.save_tree(&subtree_a).unwrap();
        store.save_node(&team(), &TreeId::new("sub_a"), &sample_node("entry", true)).unwrap();

        let tree = store.get_tree(&team(), &TreeId::new("root")).unwrap();
        let menu = tree.nodes.iter().find(|node| node.node_id.as_str() == "menu").unwrap();
        assert!(menu.has_subtree);
        assert_eq!(menu.subtree_count, 1);

        store.delete_node(&team(), &TreeId::new("root"), &NodeId::new("menu")).unwrap();
        assert!(store.get_tree(&team(), &TreeId::new("sub_a")).is_err());
    }

    #[test]
    fn deleting_parent_node_cascades_a_three_level_chain_atomically() {
        // §8 scenario 5: T_p parents T_a and T_b, T_b parents T_c; deleting
        // the parenting node in T_p removes all three descendants.
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_tree(&root_tree()).unwrap();
        store.save_node(&team(), &TreeId::new("root"), &sample_node("menu", false)).unwrap();

        let subtree_a = Tree {
            tree_id: TreeId::new("sub_a"),
            team_id: team(),
            name: "sub_a".to_string(),
            tree_depth: 1,
            is_root_tree: false,
            parent_tree_id: Some(TreeId::new("root")),
            parent_node_id: Some(NodeId::new("menu")),
            nodes: vec![],
            edges: vec![],
        };
        store.save_tree(&subtree_a).unwrap();

        let subtree_b = Tree {
            tree_id: TreeId::new("sub_b"),
            team_id: team(),
            name: "sub_b".to_string(),
            tree_depth: 1,
            is_root_tree: false,
            parent_tree_id: Some(TreeId::new("root")),
            parent_node_id: Some(NodeId::new("menu")),
            nodes: vec![],
            edges: vec![],
        };
        store.save_tree(&subtree_b).unwrap();
        store.save_node(&team(), &TreeId::new("sub_b"), &sample_node("sub_menu", false)).unwrap();

        let subtree_c = Tree {
            tree_id: TreeId::new("sub_c"),
            team_id: team(),
            name: "sub_c".to_string(),
            tree_depth: 2,
            is_root_tree: false,
            parent_tree_id: Some(TreeId::new("sub_b")),
            parent_node_id: Some(NodeId::new("sub_menu")),
            nodes: vec![],
            edges: vec![],
        };
        store.save_tree(&subtree_c).unwrap();

        store.delete_node(&team(), &TreeId::new("root"), &NodeId::new("menu")).unwrap();
        assert!(store.get_tree(&team(), &TreeId::new("sub_a")).is_err());
        assert!(store.get_tree(&team(), &TreeId::new("sub_b")).is_err());
        assert!(store.get_tree(&team(), &TreeId::new("sub_c")).is_err());
    }

    #[test]
    fn label_mirroring_reaches_descendants_only() {
        // §3: mirroring is scoped to descendant trees of the updated node's
        // tree, not every tree in the team that happens to reuse the id.
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_tree(&root_tree()).unwrap();
        store.save_node(&team(), &TreeId::new("root"), &sample_node("menu", false)).unwrap();

        let subtree_a = Tree {
            tree_id: TreeId::new("sub_a"),
            team_id: team(),
            name: "sub_a".to_string(),
            tree_depth: 1,
            is_root_tree: false,
            parent_tree_id: Some(TreeId::new("root")),
            parent_node_id: Some(NodeId::new("menu")),
            nodes: vec![],
            edges: vec![],
        };
        store.save_tree(&subtree_a).unwrap();
        store.save_node(&team(), &TreeId::new("sub_a"), &sample_node("menu", true)).unwrap();

        let unrelated_tree = Tree {
            tree_id: TreeId::new("unrelated"),
            team_id: team(),
            name: "unrelated".to_string(),
            tree_depth: 0,
            is_root_tree: true,
            parent_tree_id: None,
            parent_node_id: None,
            nodes: vec![],
            edges: vec![],
        };
        store.save_tree(&unrelated_tree).unwrap();
        store.save_node(&team(), &TreeId::new("unrelated"), &sample_node("menu", true)).unwrap();

        let mut updated_menu = sample_node("menu", false);
        updated_menu.label = "Main Menu".to_string();
        store.save_node(&team(), &TreeId::new("root"), &updated_menu).unwrap();

        let descendant = store.get_tree(&team(), &TreeId::new("sub_a")).unwrap();
        assert_eq!(descendant.nodes[0].label, "Main Menu");

        let unrelated = store.get_tree(&team(), &TreeId::new("unrelated")).unwrap();
        assert_eq!(unrelated.nodes[0].label, "menu");
    }

    #[test]
    fn ai_plan_upsert_then_lookup_increments_execution_count() {
        let store = SqliteStore::open_in_memory().unwrap();
        let plan = CachedPlan {
            fingerprint: FingerprintId::new("f1"),
            normalized_prompt: "navigation_live".to_string(),
            intent: "navigation".to_string(),
            target: "live".to_string(),
            device_model: "android_mobile".to_string(),
            ui_name: "horizon_android_mobile".to_string(),
            available_nodes: vec!["home".to_string(), "live".to_string()],
            context_signature: "sig".to_string(),
            graph: serde_json::json!({"nodes": [], "edges": []}),
            success_count: 1,
            failure_count: 0,
            execution_count: 1,
            avg_execution_time_ms: 1000.0,
            last_used: Utc::now(),
            last_success: Some(Utc::now()),
            last_failure: None,
            failure_reasons: vec![],
        };
        store.upsert_plan(&team(), &plan).unwrap();
        store
            .update_plan_metrics(&team(), &FingerprintId::new("f1"), PlanMetricUpdate { succeeded: true, execution_time_ms: 1200 }, None)
            .unwrap();
        let reloaded = store.get_plan_by_fingerprint(&team(), &FingerprintId::new("f1")).unwrap().unwrap();
        assert_eq!(reloaded.execution_count, 2);
        assert_eq!(reloaded.success_count, 2);
    }
}
