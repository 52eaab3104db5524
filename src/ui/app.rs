//! Main application state and logic

use super::theme::ThemeColors;
use super::widgets::{RowStatus, StatusRow};
use crate::config::Config;
use crate::output::{BackendStatus, HealthState};
#[cfg(unix)]
use crate::output::HealthMonitor;
use crate::pipeline::{Pipeline, PipelineStats};
use crate::report::SessionReport;
use crate::touch::{DeviceSlot, SlotEntry};
use std::path::Path;
use std::time::Instant;

/// Current view/tab in the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppView {
    Backend,
    Pipeline,
    Help,
}

impl AppView {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Backend => "Backend",
            Self::Pipeline => "Pipeline",
            Self::Help => "Help",
        }
    }

    pub fn all() -> &'static [AppView] {
        &[Self::Backend, Self::Pipeline, Self::Help]
    }

    pub fn index(&self) -> usize {
        match self {
            Self::Backend => 0,
            Self::Pipeline => 1,
            Self::Help => 2,
        }
    }

    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Backend,
            1 => Self::Pipeline,
            _ => Self::Help,
        }
    }
}

/// Application running state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Running,
    Paused,
    Quitting,
}

/// Main application
pub struct App {
    /// Current view
    pub view: AppView,
    /// Application state
    pub state: AppState,
    pub config: Config,
    pub colors: ThemeColors,
    pipeline: Pipeline,
    #[cfg(unix)]
    monitor: Option<HealthMonitor>,
    /// Application start time
    pub start_time: Instant,
    /// Last status message
    pub status_message: Option<String>,
    /// Status message timestamp
    pub status_time: Option<Instant>,
}

impl App {
    pub fn new(config: Config, pipeline: Pipeline) -> Self {
        Self {
            view: AppView::Backend,
            state: AppState::Running,
            colors: ThemeColors::from_theme(config.ui.theme),
            config,
            pipeline,
            #[cfg(unix)]
            monitor: None,
            start_time: Instant::now(),
            status_message: None,
            status_time: None,
        }
    }

    /// Attach the health monitor driving the privileged backend
    #[cfg(unix)]
    pub fn with_monitor(mut self, monitor: HealthMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Switch to the next view
    pub fn next_view(&mut self) {
        let next = (self.view.index() + 1) % AppView::all().len();
        self.view = AppView::from_index(next);
    }

    /// Switch to the previous view
    pub fn prev_view(&mut self) {
        let current = self.view.index();
        let prev = if current == 0 {
            AppView::all().len() - 1
        } else {
            current - 1
        };
        self.view = AppView::from_index(prev);
    }

    /// Toggle listening
    pub fn toggle_pause(&mut self) {
        self.state = match self.state {
            AppState::Running => {
                self.pipeline.set_listening(false);
                self.set_status("Paused".to_string());
                AppState::Paused
            }
            AppState::Paused => {
                self.pipeline.set_listening(true);
                self.set_status("Resumed".to_string());
                AppState::Running
            }
            AppState::Quitting => AppState::Quitting,
        };
    }

    /// Flip between software and privileged output
    pub fn toggle_backend(&mut self) {
        let dispatcher = self.pipeline.dispatcher();
        let preference = dispatcher.status().preference.toggled();
        dispatcher.set_preference(preference);
        self.config.output.preferred_backend = preference;
        self.request_check();
        self.set_status(format!("Preferred backend: {:?}", preference));
    }

    /// Ask the monitor for an immediate privileged backend check
    pub fn request_check(&mut self) {
        #[cfg(unix)]
        {
            if let Some(monitor) = &self.monitor {
                monitor.request_check();
                self.set_status("Checking privileged backend".to_string());
                return;
            }
        }
        self.set_status("No health monitor running".to_string());
    }

    /// Request quit
    pub fn quit(&mut self) {
        self.state = AppState::Quitting;
    }

    /// Stop the monitor and the pipeline, releasing held modifiers
    pub fn shutdown(&mut self) {
        #[cfg(unix)]
        {
            if let Some(mut monitor) = self.monitor.take() {
                monitor.stop();
            }
        }
        self.pipeline.stop();
    }

    /// Set a status message
    pub fn set_status(&mut self, message: String) {
        self.status_message = Some(message);
        self.status_time = Some(Instant::now());
    }

    /// Get status message if still valid (within 3 seconds)
    pub fn get_status(&self) -> Option<&str> {
        match (&self.status_message, self.status_time) {
            (Some(msg), Some(time)) if time.elapsed().as_secs() < 3 => Some(msg),
            _ => None,
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    /// Rows for the current view
    pub fn current_rows(&self) -> Vec<StatusRow> {
        let stats = self.stats();
        match self.view {
            AppView::Backend => backend_rows(&stats.backend),
            AppView::Pipeline => pipeline_rows(&stats),
            AppView::Help => Vec::new(),
        }
    }

    /// Get elapsed time formatted
    pub fn elapsed_formatted(&self) -> String {
        let secs = self.start_time.elapsed().as_secs();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }

    pub fn generate_report(&self) -> SessionReport {
        SessionReport::new(self.start_time, self.stats())
    }

    /// Export session report to a JSON file in `dir`
    pub fn export_report(&mut self, dir: &Path) -> Result<String, std::io::Error> {
        let report = self.generate_report();
        let path = dir.join(report.default_file_name());
        report.export_json(&path)?;
        let msg = format!("Exported to {}", path.display());
        self.set_status(msg.clone());
        Ok(msg)
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn health_row(health: HealthState) -> StatusRow {
    let status = if health.is_healthy() {
        RowStatus::Ok
    } else if health.is_failure() {
        RowStatus::Error
    } else {
        RowStatus::Info
    };
    StatusRow::new("Health", health.name(), status)
}

/// Backend status as panel rows
pub fn backend_rows(status: &BackendStatus) -> Vec<StatusRow> {
    let mut rows = vec![
        StatusRow::check("Installed", yes_no(status.installed), status.installed),
        StatusRow::check("Reachable", yes_no(status.reachable), status.reachable),
        health_row(status.health),
        StatusRow::info("Preferred", format!("{:?}", status.preference)),
        StatusRow::info("Active", status.active_backend.name()),
    ];
    match (&status.last_error, status.last_error_at) {
        (Some(error), Some(at)) => rows.push(StatusRow::new(
            "Last error",
            format!("{} ({})", error, at.format("%H:%M:%S")),
            RowStatus::Error,
        )),
        (Some(error), None) => rows.push(StatusRow::new("Last error", error, RowStatus::Error)),
        _ => rows.push(StatusRow::check("Last error", "none", true)),
    }
    rows
}

fn slot_row(slot: DeviceSlot, entry: &SlotEntry) -> StatusRow {
    let label = format!("Slot {} ({})", slot.index(), slot.name());
    match entry.device_id {
        Some(id) => StatusRow::check(label, format!("{:#x}", id), true),
        None => StatusRow::info(label, "empty"),
    }
}

/// Pipeline counters as panel rows
pub fn pipeline_rows(stats: &PipelineStats) -> Vec<StatusRow> {
    let mut rows = vec![StatusRow::check(
        "Listening",
        yes_no(stats.listening),
        stats.listening,
    )];
    rows.extend(
        DeviceSlot::ALL
            .iter()
            .map(|&slot| slot_row(slot, &stats.slots[slot.index()])),
    );
    rows.extend([
        StatusRow::info(
            "Frames",
            format!(
                "{} published, {} dropped",
                stats.frames_published, stats.frames_dropped
            ),
        ),
        StatusRow::check(
            "Acquisition errs",
            stats.source.errors().to_string(),
            stats.source.errors() == 0,
        ),
        StatusRow::check(
            "Pool",
            format!(
                "{} allocated, {} free, {} leaked",
                stats.pool.allocated, stats.pool.available, stats.pool.leaked
            ),
            stats.pool.leaked == 0,
        ),
        StatusRow::info("Active touches", stats.active_touches.to_string()),
        StatusRow::info("Held modifiers", stats.held_modifiers.len().to_string()),
        StatusRow::info(
            "Actions",
            format!(
                "{} taps, {} holds",
                stats.classifier.taps, stats.classifier.holds
            ),
        ),
        StatusRow::check(
            "Failovers",
            stats.dispatch.failovers.to_string(),
            stats.dispatch.failovers == 0,
        ),
    ]);
    rows
}
