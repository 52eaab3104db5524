//! Platform touch sources
//!
//! Platform code only pushes frames into [`crate::touch::FrameSource`]; the
//! core never polls.

pub mod mt;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::{list_touch_devices, stable_device_id, touch_status, EvdevTouchSource, TouchDeviceInfo};

/// Device availability for the status panel
#[cfg(not(target_os = "linux"))]
pub fn touch_status() -> String {
    "no touch source for this platform".to_string()
}
