// vpt-controllers/src/builtin/verification.rs
// ============================================================================
// Module: Reference Verification Drivers
// Description: Deterministic `verification.{image,text,video,audio}` drivers
//              that compare caller-supplied expected/observed values.
// Purpose: Exercise the verification-dispatch path (§4.2.1, §6.4) without
//          OCR, Whisper, or vision-model calls, which are explicitly out of
//          scope (§1).
// Dependencies: none
// ============================================================================

//! ## Overview
//! A real verification driver would run OCR over a screenshot, transcribe
//! audio, or call a vision model — all named as external collaborators in
//! §1. What the core actually needs from a verification driver is the
//! [`Driver::execute`] contract: given `params`, return success/failure and
//! optionally attach evidence URIs. Each driver below implements one
//! comparison command whose semantics don't depend on real media
//! recognition, so they're exact and replayable in tests: `image` and
//! `video` compare a declared frame description against an expected
//! substring, `text` checks containment, and `audio` checks a detected
//! transcript against an expected phrase. A production deployment swaps
//! these for drivers backed by the real recognition services; the Executor
//! and Controller Registry don't change.

use serde_json::Value;

use crate::driver::CancelSignal;
use crate::driver::Category;
use crate::driver::CommandSpec;
use crate::driver::Driver;
use crate::driver::DriverOutcome;
use crate::params::validate;
use crate::params::FieldKind;
use crate::params::FieldSpec;

fn contains_field(params: &Value, expected_field: &str, observed_field: &str) -> Result<DriverOutcome, String> {
    let fields = [
        FieldSpec::required(expected_field, FieldKind::String),
        FieldSpec::required(observed_field, FieldKind::String),
    ];
    if let Err(reason) = validate(&fields, params) {
        return Ok(DriverOutcome { success: false, evidence: vec![], error: Some(reason) });
    }
    let expected = params[expected_field].as_str().unwrap_or_default();
    let observed = params[observed_field].as_str().unwrap_or_default();
    Ok(DriverOutcome { success: observed.contains(expected), evidence: vec![], error: None })
}

/// `verification.image`: compares an expected label against a caller-supplied
/// frame description (a real driver would derive the description from OCR
/// or template matching over a captured frame).
#[derive(Default)]
pub struct ImageVerificationDriver;

impl Driver for ImageVerificationDriver {
    fn category(&self) -> Category {
        Category::VerificationImage
    }
    fn device_models_supported(&self) -> Vec<String> {
        vec!["*".to_string()]
    }
    fn commands(&self) -> Vec<CommandSpec> {
        vec![CommandSpec {
            name: "match_template".to_string(),
            param_schema: serde_json::json!({"expected_label": "string", "frame_description": "string"}),
            timeout_default: std::time::Duration::from_secs(10),
        }]
    }
    fn execute(&self, command: &str, params: &Value, _cancel: &dyn CancelSignal) -> Result<DriverOutcome, String> {
        match command {
            "match_template" => contains_field(params, "expected_label", "frame_description"),
            other => Err(format!("ImageVerificationDriver does not support command \"{other}\"")),
        }
    }
}

/// `verification.text`: containment check against caller-supplied OCR text.
#[derive(Default)]
pub struct TextVerificationDriver;

impl Driver for TextVerificationDriver {
    fn category(&self) -> Category {
        Category::VerificationText
    }
    fn device_models_supported(&self) -> Vec<String> {
        vec!["*".to_string()]
    }
    fn commands(&self) -> Vec<CommandSpec> {
        vec![CommandSpec {
            name: "detect_text".to_string(),
            param_schema: serde_json::json!({"expected_text": "string", "observed_text": "string"}),
            timeout_default: std::time::Duration::from_secs(10),
        }]
    }
    fn execute(&self, command: &str, params: &Value, _cancel: &dyn CancelSignal) -> Result<DriverOutcome, String> {
        match command {
            "detect_text" => contains_field(params, "expected_text", "observed_text"),
            other => Err(format!("TextVerificationDriver does not support command \"{other}\"")),
        }
    }
}

/// `verification.video`: same contract as `image`, over a described sequence
/// of frames (a real driver would sample frames from the AV capture folder).
#[derive(Default)]
pub struct VideoVerificationDriver;

impl Driver for VideoVerificationDriver {
    fn category(&self) -> Category {
        Category::VerificationVideo
    }
    fn device_models_supported(&self) -> Vec<String> {
        vec!["*".to_string()]
    }
    fn commands(&self) -> Vec<CommandSpec> {
        vec![CommandSpec {
            name: "detect_motion".to_string(),
            param_schema: serde_json::json!({"expected_label": "string", "frame_description": "string"}),
            timeout_default: std::time::Duration::from_secs(15),
        }]
    }
    fn execute(&self, command: &str, params: &Value, _cancel: &dyn CancelSignal) -> Result<DriverOutcome, String> {
        match command {
            "detect_motion" => contains_field(params, "expected_label", "frame_description"),
            other => Err(format!("VideoVerificationDriver does not support command \"{other}\"")),
        }
    }
}

/// `verification.audio`: containment check against a caller-supplied
/// transcript (a real driver would transcribe via Whisper or similar).
#[derive(Default)]
pub struct AudioVerificationDriver;

impl Driver for AudioVerificationDriver {
    fn category(&self) -> Category {
        Category::VerificationAudio
    }
    fn device_models_supported(&self) -> Vec<String> {
        vec!["*".to_string()]
    }
    fn commands(&self) -> Vec<CommandSpec> {
        vec![CommandSpec {
            name: "DetectAudioSpeech".to_string(),
            param_schema: serde_json::json!({"expected_phrase": "string", "transcript": "string"}),
            timeout_default: std::time::Duration::from_secs(15),
        }]
    }
    fn execute(&self, command: &str, params: &Value, _cancel: &dyn CancelSignal) -> Result<DriverOutcome, String> {
        match command {
            "DetectAudioSpeech" => contains_field(params, "expected_phrase", "transcript"),
            other => Err(format!("AudioVerificationDriver does not support command \"{other}\"")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Never;
    impl CancelSignal for Never {
        fn is_canceled(&self) -> bool {
            false
        }
    }

    #[test]
    fn image_driver_succeeds_when_label_present_in_description() {
        let driver = ImageVerificationDriver;
        let outcome = driver
            .execute("match_template", &serde_json::json!({"expected_label": "home", "frame_description": "home screen with live tile"}), &Never)
            .unwrap();
        assert!(outcome.success);
    }

    #[test]
    fn image_driver_fails_when_label_absent() {
        let driver = ImageVerificationDriver;
        let outcome = driver
            .execute("match_template", &serde_json::json!({"expected_label": "settings", "frame_description": "home screen"}), &Never)
            .unwrap();
        assert!(!outcome.success);
    }

    #[test]
    fn audio_driver_checks_transcript_containment() {
        let driver = AudioVerificationDriver;
        let outcome = driver
            .execute("DetectAudioSpeech", &serde_json::json!({"expected_phrase": "welcome", "transcript": "welcome to horizon"}), &Never)
            .unwrap();
        assert!(outcome.success);
    }

    #[test]
    fn text_driver_rejects_missing_params() {
        let driver = TextVerificationDriver;
        let outcome = driver.execute("detect_text", &serde_json::json!({"expected_text": "hi"}), &Never).unwrap();
        assert!(!outcome.success);
    }

    #[test]
    fn video_driver_unsupported_command_is_an_error() {
        let driver = VideoVerificationDriver;
        assert!(driver.execute("track_object", &serde_json::json!({}), &Never).is_err());
    }
}
