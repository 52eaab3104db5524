//! Configuration management for the touchpad keyboard
//!
//! Configuration is read by the binary only. The core receives plain
//! parameter structs built from it ([`ClassifierParams`], `DaemonSettings`,
//! [`PipelineOptions`]).
//!
//! ## Config File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/touchpad-keyboard/config.toml` |
//! | macOS | `~/Library/Application Support/touchpad-keyboard/config.toml` |
//!
//! ## Example
//!
//! ```no_run
//! use touchpad_keyboard::Config;
//!
//! let mut config = Config::load().unwrap_or_default();
//! config.classifier.hold_min_ms = 350;
//! config.save().expect("Failed to save config");
//! ```

use crate::intent::{ClassifierParams, MotionThresholds};
use crate::keyboard::LayoutSet;
use crate::output::BackendPreference;
use crate::pipeline::PipelineOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration and layout file operations
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to determine config directory
    #[error("could not determine config directory")]
    NoConfigDir,
    /// IO error reading or writing a file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Failed to parse a TOML file
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Failed to serialize config
    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Returns the path to the config file.
///
/// Creates the config directory if it doesn't exist.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    let app_dir = config_dir.join("touchpad-keyboard");

    if !app_dir.exists() {
        fs::create_dir_all(&app_dir)?;
    }

    Ok(app_dir.join("config.toml"))
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Tap/hold timing and motion thresholds
    pub classifier: ClassifierConfig,
    /// Backend preference and daemon location
    pub output: OutputConfig,
    /// Frame queue sizing
    pub pipeline: PipelineConfig,
    /// Active device selection
    pub devices: DevicesConfig,
    /// UI settings
    pub ui: UiConfig,
    /// Layout file
    pub layout: LayoutConfig,
}

/// Classifier timing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Longest touch that still counts as a tap
    pub tap_max_ms: u64,
    /// Shortest touch that fires a hold action
    pub hold_min_ms: u64,
    /// Travel (normalized surface units) past which a touch is pointing
    pub max_tap_travel: f32,
    /// Average speed (normalized units per second) past which a touch is pointing
    pub max_tap_velocity: f32,
    /// Contact time before speed is checked
    pub velocity_window_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            tap_max_ms: 250,
            hold_min_ms: 400,
            max_tap_travel: 0.04,
            max_tap_velocity: 2.0,
            velocity_window_ms: 50,
        }
    }
}

impl ClassifierConfig {
    pub fn to_params(&self) -> ClassifierParams {
        ClassifierParams::new(
            Duration::from_millis(self.tap_max_ms),
            Duration::from_millis(self.hold_min_ms),
        )
        .with_disqualifier(MotionThresholds {
            max_travel: self.max_tap_travel,
            max_velocity: self.max_tap_velocity,
            velocity_window: self.velocity_window_ms as f64 / 1000.0,
        })
    }
}

/// Output backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// `software` or `privileged`
    pub preferred_backend: BackendPreference,
    /// Directory the daemon creates its server socket in
    pub server_socket_dir: PathBuf,
    /// Directory client sockets are created in
    pub client_socket_dir: PathBuf,
    /// Server socket file name suffix
    pub server_socket_suffix: String,
    pub vendor_id: u64,
    pub product_id: u64,
    pub country_code: u64,
    /// Seconds between checks while the preferred backend is unhealthy
    pub health_check_interval_secs: u64,
    /// How long a check waits for the virtual keyboard to become ready
    pub ready_timeout_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            preferred_backend: BackendPreference::Software,
            server_socket_dir: PathBuf::from("/var/run/touchpad-keyboard/vhid/server"),
            client_socket_dir: PathBuf::from("/var/run/touchpad-keyboard/vhid/client"),
            server_socket_suffix: ".sock".to_string(),
            vendor_id: 0x16c0,
            product_id: 0x27db,
            country_code: 0,
            health_check_interval_secs: 3,
            ready_timeout_ms: 1000,
        }
    }
}

impl OutputConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs.max(1))
    }

    #[cfg(unix)]
    pub fn daemon_settings(&self) -> crate::output::daemon::DaemonSettings {
        use crate::output::daemon::{DaemonSettings, KeyboardParameters};

        DaemonSettings {
            server_dir: self.server_socket_dir.clone(),
            client_dir: self.client_socket_dir.clone(),
            server_suffix: self.server_socket_suffix.clone(),
            keyboard: KeyboardParameters {
                vendor_id: self.vendor_id,
                product_id: self.product_id,
                country_code: self.country_code,
            },
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
        }
    }
}

/// Frame queue configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames queued per subscriber before the oldest is dropped
    pub subscriber_capacity: usize,
    /// Touches per pooled frame
    pub frame_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 2,
            frame_capacity: 16,
        }
    }
}

/// Device selection
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct DevicesConfig {
    /// Ordered device ids for slot 0 and slot 1; empty accepts any device
    pub active: Vec<u64>,
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    /// Refresh rate for UI updates (in Hz)
    pub refresh_rate_hz: u32,
    /// Color theme (dark/light)
    pub theme: Theme,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            refresh_rate_hz: 30,
            theme: Theme::Dark,
        }
    }
}

/// Color theme options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Theme {
    Dark,
    Light,
}

/// Layout source
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Layout TOML file; the built-in split layout when absent
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default config file.
    ///
    /// Returns the default configuration if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default config file.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get UI refresh interval as Duration
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.ui.refresh_rate_hz.max(1) as u64)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            subscriber_capacity: self.pipeline.subscriber_capacity,
            frame_capacity: self.pipeline.frame_capacity,
            active_devices: self.devices.active.clone(),
        }
    }

    /// Layouts from the configured file, or the built-in split layout
    pub fn load_layouts(&self) -> Result<LayoutSet, ConfigError> {
        match &self.layout.path {
            Some(path) => LayoutSet::load_from(path),
            None => Ok(LayoutSet::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn temp_config_path(name: &str) -> PathBuf {
        env::temp_dir().join(format!(
            "touchpad-keyboard-test-{}-{}.toml",
            std::process::id(),
            name
        ))
    }

    #[test]
    fn config_default_values() {
        let config = Config::default();
        assert_eq!(config.classifier.tap_max_ms, 250);
        assert_eq!(config.classifier.hold_min_ms, 400);
        assert_eq!(config.output.preferred_backend, BackendPreference::Software);
        assert_eq!(config.output.health_check_interval_secs, 3);
        assert_eq!(config.pipeline.subscriber_capacity, 2);
        assert_eq!(config.pipeline.frame_capacity, 16);
        assert!(config.devices.active.is_empty());
        assert_eq!(config.layout.path, None);
        assert_eq!(config.ui.theme, Theme::Dark);
    }

    #[test]
    fn config_refresh_interval() {
        let config = Config::default();
        // 30 Hz = 33333 microseconds per frame
        assert_eq!(config.refresh_interval().as_micros(), 33333);
    }

    #[test]
    fn config_classifier_params() {
        let mut config = Config::default();
        config.classifier.hold_min_ms = 500;
        let params = config.classifier.to_params();
        assert_eq!(params.tap_max, Duration::from_millis(250));
        assert_eq!(params.hold_min, Duration::from_millis(500));
        assert!(params.disqualifier.disqualify(0.1, 0.5, 0.0));
        assert!(!params.disqualifier.disqualify(0.1, 0.01, 0.1));
    }

    #[test]
    fn config_save_and_load_roundtrip() {
        let path = temp_config_path("roundtrip");

        let mut config = Config::default();
        config.output.preferred_backend = BackendPreference::Privileged;
        config.devices.active = vec![0x1234, 0x5678];
        config.ui.theme = Theme::Light;

        config.save_to(&path).expect("Failed to save config");
        let loaded = Config::load_from(&path).expect("Failed to load config");

        assert_eq!(loaded, config);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn config_partial_file_uses_defaults() {
        let path = temp_config_path("partial");
        fs::write(
            &path,
            "[classifier]\ntap_max_ms = 180\n\n[output]\npreferred_backend = \"privileged\"\n",
        )
        .unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.classifier.tap_max_ms, 180);
        assert_eq!(loaded.classifier.hold_min_ms, 400);
        assert_eq!(loaded.output.preferred_backend, BackendPreference::Privileged);
        assert_eq!(loaded.pipeline, PipelineConfig::default());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn config_load_missing_file_is_io_error() {
        let path = PathBuf::from("/nonexistent/path/config.toml");
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Io(_))));
    }

    #[test]
    fn config_pipeline_options_carry_devices() {
        let mut config = Config::default();
        config.devices.active = vec![7];
        let options = config.pipeline_options();
        assert_eq!(options.active_devices, vec![7]);
        assert_eq!(options.subscriber_capacity, 2);
    }

    #[test]
    fn config_without_layout_path_uses_builtin() {
        let layouts = Config::default().load_layouts().unwrap();
        assert_eq!(layouts, LayoutSet::default());
    }

    #[cfg(unix)]
    #[test]
    fn config_daemon_settings() {
        let mut config = Config::default();
        config.output.vendor_id = 0x05ac;
        let settings = config.output.daemon_settings();
        assert_eq!(settings.keyboard.vendor_id, 0x05ac);
        assert_eq!(settings.server_suffix, ".sock");
        assert_eq!(settings.ready_timeout, Duration::from_millis(1000));
    }
}
