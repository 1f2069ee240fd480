// vpt-host/tests/host_server.rs
// ============================================================================
// Module: Host Server Integration Tests
// Description: Exercises the Host's HTTP surface end to end against a real
//              bound listener (§6.2).
// Dependencies: vpt-host, axum, tokio, reqwest
// ============================================================================

use std::sync::Arc;

use tokio::sync::oneshot;

use vpt_core::core::ids::DeviceId;
use vpt_core::core::ids::HostId;
use vpt_host::config::DeviceConfig;
use vpt_host::config::HostConfig;
use vpt_host::routes::router;
use vpt_host::state::HostState;
use vpt_host::ReferencePlanGenerator;

async fn spawn_host() -> (String, HostState, oneshot::Sender<()>) {
    let shared = vpt_config::VptConfig::default();
    let host_config = HostConfig::new(
        HostId::new("host-1"),
        &shared,
        vec![DeviceConfig { device_id: DeviceId::new("device-1"), device_model: "android_mobile".into(), capabilities: vec!["remote".into()] }],
    );
    let store = vpt_store_sqlite::SqliteStore::open_in_memory().expect("open store");
    let set = vpt_controllers::registry::ModelDriverSet::new("android_mobile")
        .with_driver(vpt_controllers::Category::Remote, || Box::new(vpt_controllers::builtin::remote::LoggingRemoteDriver::new()));
    let registry = vpt_controllers::ControllerRegistry::new(vec![set]);
    let state = HostState::new(host_config, shared, store, registry);

    let app = router(state.clone(), Arc::new(ReferencePlanGenerator));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;
    });
    (format!("http://{addr}"), state, shutdown_tx)
}

#[tokio::test]
async fn execute_task_then_status_reports_completion() {
    let (base_url, _state, shutdown) = spawn_host().await;
    let client = reqwest::Client::new();

    let body = serde_json::json!({
        "team_id": "team-1",
        "device_id": "device-1",
        "script_name": "smoke",
        "graph": {
            "nodes": [
                {"node_id": "start", "type": "start"},
                {"node_id": "act", "type": "action", "command": "press_ok", "params": {}},
                {"node_id": "success", "type": "success"},
                {"node_id": "failure", "type": "failure"}
            ],
            "edges": [
                {"source_node_id": "start", "target_node_id": "act", "source_handle": "success"},
                {"source_node_id": "act", "target_node_id": "success", "source_handle": "success"},
                {"source_node_id": "act", "target_node_id": "failure", "source_handle": "failure"}
            ]
        }
    });

    let response = client
        .post(format!("{base_url}/host/script/executeTask"))
        .json(&body)
        .send()
        .await
        .expect("request");
    assert!(response.status().is_success());
    let payload: serde_json::Value = response.json().await.expect("json");
    assert_eq!(payload["success"], serde_json::json!(true));
    let task_id = payload["task_id"].as_str().expect("task_id").to_string();

    let mut done = false;
    for _ in 0..50 {
        let status: serde_json::Value = client
            .get(format!("{base_url}/host/script/status?task_id={task_id}&since=0"))
            .send()
            .await
            .expect("status request")
            .json()
            .await
            .expect("status json");
        if status["done"] == serde_json::json!(true) {
            assert_eq!(status["success"], serde_json::json!(true));
            done = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(done, "task did not complete in time");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn status_for_unknown_task_is_not_found() {
    let (base_url, _state, shutdown) = spawn_host().await;
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{base_url}/host/script/status?task_id=does-not-exist&since=0"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let _ = shutdown.send(());
}

#[tokio::test]
async fn execute_task_with_unknown_kind_is_bad_request() {
    let (base_url, _state, shutdown) = spawn_host().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base_url}/host/bogus/executeTask"))
        .json(&serde_json::json!({"team_id": "team-1", "device_id": "device-1", "script_name": "x"}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let _ = shutdown.send(());
}
