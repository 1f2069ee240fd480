// vpt-controllers/tests/registry.rs
// ============================================================================
// Integration tests: Controller Registry dispatch across categories.
// ============================================================================

use std::sync::Arc;

use vpt_controllers::builtin::av::DirectoryAvDriver;
use vpt_controllers::builtin::remote::LoggingRemoteDriver;
use vpt_controllers::builtin::verification::AudioVerificationDriver;
use vpt_controllers::builtin::verification::ImageVerificationDriver;
use vpt_controllers::registry::ModelDriverSet;
use vpt_controllers::Category;
use vpt_controllers::ControllerRegistry;
use vpt_core::core::ids::DeviceId;
use vpt_core::interfaces::CommandDispatcher;

fn reference_registry() -> ControllerRegistry {
    let capture_dir = tempfile::tempdir().unwrap().into_path();
    let set = ModelDriverSet::new("android_mobile")
        .with_driver(Category::Remote, || Box::new(LoggingRemoteDriver::new()))
        .with_driver(Category::Av, {
            let capture_dir = capture_dir.clone();
            move || Box::new(DirectoryAvDriver::new(capture_dir.clone()))
        })
        .with_driver(Category::VerificationImage, || Box::new(ImageVerificationDriver))
        .with_driver(Category::VerificationAudio, || Box::new(AudioVerificationDriver));
    ControllerRegistry::new(vec![set])
}

#[test]
fn dispatches_remote_command_by_declared_category() {
    let registry = reference_registry();
    registry.register_device(DeviceId::new("box-1"), "android_mobile");
    let outcome = registry.execute_command(&DeviceId::new("box-1"), "press_key", &serde_json::json!({"key": "OK"})).unwrap();
    assert!(outcome.success);
}

#[test]
fn dispatches_verification_command_by_declared_category() {
    let registry = reference_registry();
    registry.register_device(DeviceId::new("box-1"), "android_mobile");
    let outcome = registry
        .execute_command(
            &DeviceId::new("box-1"),
            "DetectAudioSpeech",
            &serde_json::json!({"expected_phrase": "live", "transcript": "now playing live tv"}),
        )
        .unwrap();
    assert!(outcome.success);
}

#[test]
fn unknown_device_model_yields_device_unavailable() {
    let registry = reference_registry();
    registry.register_device(DeviceId::new("box-2"), "unknown_model");
    let err = registry.execute_command(&DeviceId::new("box-2"), "press_key", &serde_json::json!({"key": "OK"})).unwrap_err();
    assert_eq!(err.kind(), "DeviceUnavailable");
}

#[test]
fn same_device_reuses_one_controller_instance_per_category() {
    let registry = Arc::new(reference_registry());
    registry.register_device(DeviceId::new("box-1"), "android_mobile");
    let a = registry.get_controller(&DeviceId::new("box-1"), Category::Remote).unwrap();
    let b = registry.get_controller(&DeviceId::new("box-1"), Category::Remote).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn concurrent_first_use_constructs_exactly_one_instance() {
    let registry = Arc::new(reference_registry());
    registry.register_device(DeviceId::new("box-3"), "android_mobile");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            std::thread::spawn(move || registry.get_controller(&DeviceId::new("box-3"), Category::Remote).unwrap())
        })
        .collect();
    let instances: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
    for instance in &instances[1..] {
        assert!(Arc::ptr_eq(&instances[0], instance));
    }
}
