// vpt-store-sqlite/tests/persistence.rs
// ============================================================================
// Module: Persistence Store Integration Tests
// Description: Exercises `SqliteStore` against a file-backed database.
// Purpose: Confirm state survives reopening the same path, unlike the
//          in-memory unit tests in `src/store.rs`.
// ============================================================================

use vpt_core::CreationMethod;
use vpt_core::Node;
use vpt_core::NodeType;
use vpt_core::PersistenceStore;
use vpt_core::TeamId;
use vpt_core::Testcase;
use vpt_core::TestcaseId;
use vpt_core::Tree;
use vpt_core::TreeId;
use vpt_store_sqlite::SqliteStore;
use vpt_store_sqlite::SqliteStoreConfig;

fn team() -> TeamId {
    TeamId::new("acme")
}

#[test]
fn testcase_survives_reopening_the_same_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vpt.sqlite3");
    let config = SqliteStoreConfig::new(&path);

    {
        let store = SqliteStore::open(&config).unwrap();
        let testcase = Testcase {
            testcase_id: TestcaseId::new("tc1"),
            team_id: team(),
            name: "zap channel".to_string(),
            ui_name: "horizon_android_mobile".to_string(),
            graph_json: serde_json::json!({"nodes": [], "edges": []}),
            creation_method: CreationMethod::Visual,
            ai_prompt: None,
            ai_analysis: None,
            folder_id: vpt_core::FolderId::ROOT,
            tags: vec![],
        };
        store.save_testcase(&testcase).unwrap();
    }

    let reopened = SqliteStore::open(&config).unwrap();
    let loaded = reopened.get_testcase(&team(), &TestcaseId::new("tc1")).unwrap();
    assert_eq!(loaded.name, "zap channel");
}

#[test]
fn tree_with_nodes_and_edges_round_trips_through_a_fresh_connection() {
    let dir = tempfile::tempdir().unwrap();
    let config = SqliteStoreConfig::new(dir.path().join("vpt.sqlite3"));
    let store = SqliteStore::open(&config).unwrap();

    let tree = Tree {
        tree_id: TreeId::new("root"),
        team_id: team(),
        name: "horizon".to_string(),
        tree_depth: 0,
        is_root_tree: true,
        parent_tree_id: None,
        parent_node_id: None,
        nodes: vec![],
        edges: vec![],
    };
    store.save_tree(&tree).unwrap();
    store
        .save_node(
            &team(),
            &TreeId::new("root"),
            &Node {
                node_id: vpt_core::NodeId::new("home"),
                label: "Home".to_string(),
                node_type: NodeType::Entry,
                position_x: 0.0,
                position_y: 0.0,
                is_root: true,
                verifications: vec![],
                has_subtree: false,
                subtree_count: 0,
                screenshot: None,
            },
        )
        .unwrap();

    let reloaded = store.get_tree(&team(), &TreeId::new("root")).unwrap();
    assert_eq!(reloaded.nodes.len(), 1);
    assert_eq!(reloaded.nodes[0].node_id.as_str(), "home");
}

#[test]
fn maintenance_evict_plans_removes_low_success_rate_entries() {
    let store = SqliteStore::open_in_memory().unwrap();
    let plan = vpt_core::CachedPlan {
        fingerprint: vpt_core::FingerprintId::new("stale"),
        normalized_prompt: "navigation_settings".to_string(),
        intent: "navigation".to_string(),
        target: "settings".to_string(),
        device_model: "android_tv".to_string(),
        ui_name: "horizon_android_tv".to_string(),
        available_nodes: vec!["home".to_string()],
        context_signature: "sig".to_string(),
        graph: serde_json::json!({}),
        success_count: 1,
        failure_count: 9,
        execution_count: 10,
        avg_execution_time_ms: 500.0,
        last_used: chrono::Utc::now(),
        last_success: None,
        last_failure: Some(chrono::Utc::now()),
        failure_reasons: vec!["timeout".to_string()],
    };
    store.upsert_plan(&team(), &plan).unwrap();

    let removed = store.maintenance_evict_plans(&team()).unwrap();
    assert_eq!(removed, 1);
    assert!(store.get_plan_by_fingerprint(&team(), &vpt_core::FingerprintId::new("stale")).unwrap().is_none());
}
