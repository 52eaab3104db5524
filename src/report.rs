//! Session report and export functionality

use crate::pipeline::PipelineStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// Complete session report
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// Summary statistics
    pub summary: SessionSummary,
    /// Every pipeline counter at export time
    pub pipeline: PipelineStats,
}

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    /// Report generation timestamp
    pub generated_at: String,
    /// Application version
    pub version: String,
    /// Session duration in seconds
    pub duration_secs: f64,
}

/// Session summary statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub frames_published: u64,
    pub frames_dropped: u64,
    pub acquisition_errors: u64,
    /// Taps plus hold actions
    pub actions: u64,
    pub failovers: u64,
    /// Events the output could not express
    pub unsupported_keys: u64,
    /// Frame buffers never returned to the pool
    pub leaked_frames: usize,
    /// Whether the session ended with a healthy privileged backend
    pub privileged_healthy: bool,
}

impl SessionSummary {
    fn from_stats(stats: &PipelineStats) -> Self {
        Self {
            frames_published: stats.frames_published,
            frames_dropped: stats.frames_dropped,
            acquisition_errors: stats.source.errors(),
            actions: stats.classifier.taps + stats.classifier.holds,
            failovers: stats.dispatch.failovers,
            unsupported_keys: stats.classifier.unsupported_keys,
            leaked_frames: stats.pool.leaked,
            privileged_healthy: stats.backend.health.is_healthy(),
        }
    }

    /// Counters that point at a problem
    pub fn issues(&self) -> u64 {
        self.frames_dropped + self.failovers + self.unsupported_keys + self.leaked_frames as u64
    }
}

impl SessionReport {
    /// Create a new session report
    pub fn new(start_time: Instant, stats: PipelineStats) -> Self {
        let now: DateTime<Utc> = Utc::now();
        Self {
            metadata: ReportMetadata {
                generated_at: now.to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                duration_secs: start_time.elapsed().as_secs_f64(),
            },
            summary: SessionSummary::from_stats(&stats),
            pipeline: stats,
        }
    }

    /// Default export file name, unique per second
    pub fn default_file_name(&self) -> String {
        format!("touchpad-keyboard-report-{}.json", Utc::now().format("%Y%m%d-%H%M%S"))
    }

    /// Export report to JSON file
    pub fn export_json(&self, path: &Path) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Export report to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::ClassifierParams;
    use crate::keyboard::LayoutSet;
    use crate::output::{BackendKind, BackendPreference, OutputDispatcher};
    use crate::pipeline::{Pipeline, PipelineOptions};
    use crate::error::DispatchError;
    use crate::keyboard::KeyCode;
    use crate::testing::{touch, RecordingBackend};
    use crate::touch::ContactState;
    use std::env;
    use std::sync::Arc;
    use std::time::Duration;

    fn stats() -> PipelineStats {
        let software = Arc::new(RecordingBackend::new(BackendKind::Software));
        let dispatcher = Arc::new(OutputDispatcher::new(software, BackendPreference::Software));
        let pipeline = Pipeline::start(
            ClassifierParams::default(),
            &LayoutSet::default(),
            dispatcher,
            PipelineOptions::default(),
        )
        .unwrap();
        pipeline.on_callback(&1u64, &[], 0.0, 1).unwrap();
        let _ = pipeline.on_callback(&None::<u64>, &[], 0.0, 2);
        pipeline.stats()
    }

    #[test]
    fn summary_reflects_counters() {
        let report = SessionReport::new(Instant::now(), stats());
        assert_eq!(report.summary.acquisition_errors, 1);
        assert_eq!(report.summary.actions, 0);
        assert!(!report.summary.privileged_healthy);
        assert_eq!(report.metadata.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn issues_sum_problem_counters() {
        let mut summary = SessionReport::new(Instant::now(), stats()).summary;
        summary.failovers = 2;
        summary.leaked_frames = 1;
        assert_eq!(summary.issues(), summary.frames_dropped + 3);
    }

    #[test]
    fn unsupported_key_is_counted_once() {
        let software = Arc::new(RecordingBackend::new(BackendKind::Software));
        software.fail_with(|| DispatchError::UnsupportedKeyCode(KeyCode(16)));
        let dispatcher = Arc::new(OutputDispatcher::new(
            software.clone(),
            BackendPreference::Software,
        ));
        let pipeline = Pipeline::start(
            ClassifierParams::default(),
            &LayoutSet::default(),
            dispatcher,
            PipelineOptions::default(),
        )
        .unwrap();
        let q = (0.25, 0.3);
        pipeline
            .on_callback(&1u64, &[touch(1, q, ContactState::Touching)], 0.0, 1)
            .unwrap();
        pipeline
            .on_callback(&1u64, &[touch(1, q, ContactState::Leaving)], 0.05, 2)
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while pipeline.stats().classifier.frames < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        let summary = SessionReport::new(Instant::now(), pipeline.stats()).summary;
        assert_eq!(software.attempts(), 1);
        assert_eq!(summary.unsupported_keys, 1);
    }

    #[test]
    fn export_json_writes_file() {
        let report = SessionReport::new(Instant::now(), stats());
        let path = env::temp_dir().join(format!(
            "touchpad-keyboard-report-test-{}.json",
            std::process::id()
        ));

        report.export_json(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["acquisition_errors"], 1);
        assert_eq!(value["pipeline"]["backend"]["active_backend"], "Software");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn default_file_name_is_json() {
        let report = SessionReport::new(Instant::now(), stats());
        let name = report.default_file_name();
        assert!(name.starts_with("touchpad-keyboard-report-"));
        assert!(name.ends_with(".json"));
    }
}
