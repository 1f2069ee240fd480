// vpt-controllers/src/builtin/av.rs
// ============================================================================
// Module: Reference AV Driver
// Description: An `av` category driver exposing the §6.4 capture interface
//              over a local directory of segment files.
// Purpose: Let the Executor and Host exercise start/stop-capture commands
//          and `RecentSegments`/`CaptureFolder` without an HLS/ffmpeg
//          pipeline attached (§1 Non-goals).
// Dependencies: std::fs
// ============================================================================

//! ## Overview
//! Real capture (HLS segmenting, ffmpeg) is an external collaborator (§1).
//! [`DirectoryAvDriver`] treats a configured directory as the capture folder:
//! `start_capture`/`stop_capture` commands flip an in-memory flag, and
//! [`AvCapture::recent_segments`] lists the newest files already present
//! there (named `segment_<n>.ts` by convention), so a test harness can drop
//! fixture segments in and assert the driver returns the expected window.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;

use crate::driver::AvCapture;
use crate::driver::CancelSignal;
use crate::driver::Category;
use crate::driver::CommandSpec;
use crate::driver::Driver;
use crate::driver::DriverOutcome;

pub struct DirectoryAvDriver {
    capture_folder: PathBuf,
    capturing: AtomicBool,
}

impl DirectoryAvDriver {
    #[must_use]
    pub fn new(capture_folder: PathBuf) -> Self {
        Self { capture_folder, capturing: AtomicBool::new(false) }
    }
}

impl Driver for DirectoryAvDriver {
    fn category(&self) -> Category {
        Category::Av
    }

    fn device_models_supported(&self) -> Vec<String> {
        vec!["*".to_string()]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec { name: "start_capture".to_string(), param_schema: serde_json::json!({}), timeout_default: Duration::from_secs(5) },
            CommandSpec { name: "stop_capture".to_string(), param_schema: serde_json::json!({}), timeout_default: Duration::from_secs(5) },
        ]
    }

    fn execute(&self, command: &str, _params: &Value, _cancel: &dyn CancelSignal) -> Result<DriverOutcome, String> {
        match command {
            "start_capture" => {
                self.capturing.store(true, Ordering::SeqCst);
                Ok(DriverOutcome { success: true, evidence: vec![], error: None })
            }
            "stop_capture" => {
                self.capturing.store(false, Ordering::SeqCst);
                Ok(DriverOutcome { success: true, evidence: vec![], error: None })
            }
            other => Err(format!("DirectoryAvDriver does not support command \"{other}\"")),
        }
    }
}

impl AvCapture for DirectoryAvDriver {
    fn recent_segments(&self, count: u32, _duration_sec: u32) -> Result<Vec<String>, String> {
        let mut entries: Vec<(std::time::SystemTime, PathBuf)> = std::fs::read_dir(&self.capture_folder)
            .map_err(|err| format!("could not read capture folder: {err}"))?
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                let modified = metadata.modified().ok()?;
                Some((modified, entry.path()))
            })
            .collect();
        entries.sort_by_key(|(modified, _)| *modified);
        Ok(entries
            .into_iter()
            .rev()
            .take(count as usize)
            .rev()
            .map(|(_, path)| path.to_string_lossy().into_owned())
            .collect())
    }

    fn capture_folder(&self) -> String {
        self.capture_folder.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    struct Never;
    impl CancelSignal for Never {
        fn is_canceled(&self) -> bool {
            false
        }
    }

    #[test]
    fn recent_segments_returns_newest_last() {
        let dir = tempfile::tempdir().unwrap();
        for (name, sleep_ms) in [("segment_0.ts", 0), ("segment_1.ts", 10), ("segment_2.ts", 20)] {
            std::thread::sleep(Duration::from_millis(sleep_ms));
            let mut file = File::create(dir.path().join(name)).unwrap();
            writeln!(file, "data").unwrap();
        }
        let driver = DirectoryAvDriver::new(dir.path().to_path_buf());
        let segments = driver.recent_segments(2, 2).unwrap();
        assert_eq!(segments.len(), 2);
        assert!(segments[1].ends_with("segment_2.ts"));
    }

    #[test]
    fn start_then_stop_capture_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let driver = DirectoryAvDriver::new(dir.path().to_path_buf());
        assert!(driver.execute("start_capture", &serde_json::json!({}), &Never).unwrap().success);
        assert!(driver.execute("stop_capture", &serde_json::json!({}), &Never).unwrap().success);
    }

    #[test]
    fn capture_folder_reports_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let driver = DirectoryAvDriver::new(dir.path().to_path_buf());
        assert_eq!(driver.capture_folder(), dir.path().to_string_lossy());
    }
}
