// vpt-client/tests/proxy_client.rs
// ============================================================================
// Integration tests: `ProxyClient` against a minimal in-process HTTP stub.
// ============================================================================

use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use reqwest::Method;
use vpt_client::ExecuteTaskResponse;
use vpt_client::ProxyClient;
use vpt_core::core::ids::TaskId;
use vpt_core::core::ids::TeamId;

/// Starts a one-shot stub HTTP server that replies with a fixed status and
/// JSON body to every connection it accepts, and records the request line
/// and headers it saw.
fn start_stub(status_line: &'static str, json_body: &'static str) -> (SocketAddr, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 4096];
        let read = stream.read(&mut buf).unwrap_or(0);
        let request = String::from_utf8_lossy(&buf[..read]).to_string();
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{json_body}",
            json_body.len()
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.flush();
        request
    });
    (addr, handle)
}

#[test]
fn execute_task_decodes_task_id_and_sends_headers() {
    let (addr, handle) = start_stub("200 OK", r#"{"task_id":"t-1"}"#);
    let client = ProxyClient::new(Duration::from_secs(5)).unwrap();
    let team_id = TeamId::new("team-1");

    let response: ExecuteTaskResponse = client
        .execute_task(
            &format!("http://{addr}"),
            "script",
            &team_id,
            "alice",
            &serde_json::json!({"script_name": "smoke"}),
        )
        .unwrap();

    assert_eq!(response.task_id, TaskId::new("t-1"));
    let request = handle.join().unwrap();
    assert!(request.starts_with("POST /host/script/executeTask"));
    assert!(request.contains("x-vpt-team-id: team-1"));
    assert!(request.contains("x-vpt-user: alice"));
}

#[test]
fn not_found_status_maps_to_not_found_core_error() {
    let (addr, _handle) = start_stub("404 Not Found", r#"{"error":"missing"}"#);
    let client = ProxyClient::new(Duration::from_secs(5)).unwrap();
    let team_id = TeamId::new("team-1");

    let err = client
        .task_status(&format!("http://{addr}"), "script", &team_id, &TaskId::new("t-1"), 0)
        .unwrap_err();

    assert!(matches!(err.to_core_error(), vpt_core::core::CoreError::NotFound(_)));
}

#[test]
fn server_error_status_maps_to_transient() {
    let (addr, _handle) = start_stub("503 Service Unavailable", r#"{"error":"down"}"#);
    let client = ProxyClient::new(Duration::from_secs(5)).unwrap();

    let err = client.proxy(&format!("http://{addr}"), "/server/navigationTrees/1/full", Method::GET, &TeamId::new("t"), "bob", None).unwrap_err();

    assert!(matches!(err.to_core_error(), vpt_core::core::CoreError::Transient(_)));
}

#[test]
fn proxy_translates_server_path_to_host_path() {
    let (addr, handle) = start_stub("200 OK", "{}");
    let client = ProxyClient::new(Duration::from_secs(5)).unwrap();

    let _ = client.proxy(&format!("http://{addr}"), "/server/navigationTrees/1/full", Method::GET, &TeamId::new("t"), "bob", None);

    let request = handle.join().unwrap();
    assert!(request.starts_with("GET /host/navigationTrees/1/full"));
}

#[test]
fn register_host_against_unreachable_server_is_device_unavailable() {
    // Nothing is listening on this port.
    let client = ProxyClient::new(Duration::from_millis(200)).unwrap();
    let registration = vpt_client::HostRegistration {
        host_id: vpt_core::core::ids::HostId::new("host-1"),
        host_url: "http://127.0.0.1:1".to_string(),
        devices: vec![],
    };
    let err = client.register_host("http://127.0.0.1:1", &registration).unwrap_err();
    assert!(matches!(err.to_core_error(), vpt_core::core::CoreError::DeviceUnavailable(_)));
}
