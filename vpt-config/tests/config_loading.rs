// vpt-config/tests/config_loading.rs
// ============================================================================
// Integration tests: file + env overlay resolution via `VptConfig::load`.
// ============================================================================

#![allow(unsafe_code, reason = "Test harness mutates process env for configuration (§6.6).")]

use std::env;
use std::io::Write;
use std::sync::Mutex;

use vpt_config::VptConfig;

/// `VPT_CONFIG`/`SERVER_URL`/etc. are process-global; serialize the tests
/// that touch them so they don't race each other's env mutations.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for var in [
        "VPT_CONFIG",
        "SERVER_URL",
        "HOST_URL",
        "HLS_SEGMENT_DURATION",
        "OPENROUTER_API_KEY",
        "UPSTASH_REDIS_REST_URL",
        "UPSTASH_REDIS_REST_TOKEN",
        "OBJECT_STORAGE_ENDPOINT",
        "OBJECT_STORAGE_BUCKET",
        "OBJECT_STORAGE_ACCESS_KEY_ID",
        "OBJECT_STORAGE_SECRET_ACCESS_KEY",
    ] {
        unsafe { env::remove_var(var) };
    }
}

#[test]
fn load_with_no_file_and_no_env_uses_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let config = VptConfig::load().expect("defaults must validate");
    assert_eq!(config.server_url, "0.0.0.0:8080");
    assert_eq!(config.hls_segment_duration_secs, 2);
}

#[test]
fn explicit_config_file_overlays_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        server_url = "10.0.0.1:8080"
        hls_segment_duration_secs = 4
        "#
    )
    .unwrap();
    unsafe { env::set_var("VPT_CONFIG", file.path()) };

    let config = VptConfig::load().expect("file-backed config must load");
    assert_eq!(config.server_url, "10.0.0.1:8080");
    assert_eq!(config.hls_segment_duration_secs, 4);
    // Unspecified fields still fall back to defaults.
    assert_eq!(config.host_url, "0.0.0.0:8070");

    unsafe { env::remove_var("VPT_CONFIG") };
}

#[test]
fn env_var_overrides_file_value() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, r#"server_url = "10.0.0.1:8080""#).unwrap();
    unsafe {
        env::set_var("VPT_CONFIG", file.path());
        env::set_var("SERVER_URL", "192.168.1.1:9000");
    }

    let config = VptConfig::load().unwrap();
    assert_eq!(config.server_url, "192.168.1.1:9000");

    unsafe {
        env::remove_var("VPT_CONFIG");
        env::remove_var("SERVER_URL");
    }
}

#[test]
fn oversized_config_file_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    // Well past the 1 MiB limit.
    let filler = "# ".to_string() + &"x".repeat(2 * 1024 * 1024);
    writeln!(file, "{filler}").unwrap();
    unsafe { env::set_var("VPT_CONFIG", file.path()) };

    let result = VptConfig::load();
    assert!(result.is_err());

    unsafe { env::remove_var("VPT_CONFIG") };
}

#[test]
fn malformed_toml_fails_closed() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "this is not valid = = toml").unwrap();
    unsafe { env::set_var("VPT_CONFIG", file.path()) };

    assert!(VptConfig::load().is_err());

    unsafe { env::remove_var("VPT_CONFIG") };
}
