// vpt-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Entry Point Tests
// Description: Unit tests for device-inventory parsing, the reference
//              driver wiring, and argument parsing in the `vpt` binary.
// Dependencies: vpt-cli main helpers, clap, serde_json
// ============================================================================

use std::path::PathBuf;

use clap::Parser;

use vpt_controllers::Category;

use super::reference_model_sets;
use super::Cli;
use super::Commands;
use super::DeviceEntry;

#[test]
fn device_entry_defaults_capabilities_when_absent() {
    let entry: DeviceEntry = serde_json::from_str(r#"{"device_id":"d1","device_model":"android_mobile"}"#).unwrap();
    assert_eq!(entry.device_id, "d1");
    assert!(entry.capabilities.is_empty());
}

#[test]
fn reference_model_sets_dedupes_and_builds_every_category() {
    let entries = vec![
        DeviceEntry { device_id: "d1".into(), device_model: "android_mobile".into(), capabilities: vec![] },
        DeviceEntry { device_id: "d2".into(), device_model: "android_mobile".into(), capabilities: vec![] },
        DeviceEntry { device_id: "d3".into(), device_model: "android_tv".into(), capabilities: vec![] },
    ];
    let sets = reference_model_sets(&entries, &PathBuf::from("/tmp/captures"));
    assert_eq!(sets.len(), 2, "distinct device models should collapse to one set each");

    let registry = vpt_controllers::ControllerRegistry::new(sets);
    assert_eq!(registry.category_for_command("press_key"), Some(Category::Remote));
    assert_eq!(registry.category_for_command("start_capture"), Some(Category::Av));
    assert_eq!(registry.category_for_command("match_template"), Some(Category::VerificationImage));
    assert_eq!(registry.category_for_command("detect_text"), Some(Category::VerificationText));
    assert_eq!(registry.category_for_command("detect_motion"), Some(Category::VerificationVideo));
    assert_eq!(registry.category_for_command("DetectAudioSpeech"), Some(Category::VerificationAudio));
}

#[test]
fn cli_parses_server_ephemeral_flag() {
    let cli = Cli::try_parse_from(["vpt", "server", "--ephemeral"]).unwrap();
    match cli.command {
        Commands::Server(command) => assert!(command.ephemeral),
        other => panic!("expected Server command, got {other:?}"),
    }
}

#[test]
fn cli_requires_host_id_and_devices_for_host_command() {
    let err = Cli::try_parse_from(["vpt", "host"]).unwrap_err();
    assert!(err.to_string().contains("host-id") || err.to_string().contains("devices"));
}

#[test]
fn cli_parses_host_command() {
    let cli = Cli::try_parse_from(["vpt", "host", "--host-id", "host-1", "--devices", "inventory.json"]).unwrap();
    match cli.command {
        Commands::Host(command) => {
            assert_eq!(command.host_id, "host-1");
            assert_eq!(command.devices, PathBuf::from("inventory.json"));
            assert_eq!(command.capture_folder, PathBuf::from("./captures"));
        }
        other => panic!("expected Host command, got {other:?}"),
    }
}

#[test]
fn cli_parses_maintenance_command() {
    let cli = Cli::try_parse_from(["vpt", "maintenance", "--team-id", "team-1"]).unwrap();
    match cli.command {
        Commands::Maintenance(command) => assert_eq!(command.team_id, "team-1"),
        other => panic!("expected Maintenance command, got {other:?}"),
    }
}
