//! Touchpad Keyboard - turns multitouch trackpad frames into keystrokes
//!
//! Two trackpads act as the halves of a split keyboard. Sensor frames flow
//! through a pooled, fan-out frame bus into a tap/hold classifier, which
//! drives either a software key injector or a privileged virtual HID daemon.

pub mod config;
pub mod error;
pub mod intent;
pub mod keyboard;
pub mod output;
pub mod pipeline;
pub mod platform;
pub mod report;
pub mod testing;
pub mod touch;
pub mod ui;

pub use config::Config;
pub use pipeline::{Pipeline, PipelineOptions, PipelineStats};
