//! Key layouts supplied to the binding map
//!
//! A layout is an ordered list of `(rect, label)` pairs plus optional hold
//! actions per label. The core only consumes [`KeyLayout`] values; loading them
//! from TOML is a convenience for the binary.

use super::binding::Rect;
use crate::config::ConfigError;
use crate::touch::DeviceSlot;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A labelled key region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutKey {
    pub label: String,
    pub rect: Rect,
}

/// Sustained-touch alternative for a label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldSpec {
    pub label: String,
    pub hold: String,
}

/// Layout for one surface, keys in row-major order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyLayout {
    pub keys: Vec<LayoutKey>,
    #[serde(default)]
    pub holds: Vec<HoldSpec>,
}

impl KeyLayout {
    /// Lay out rows of equal height, keys of equal width within a row
    pub fn grid(rows: &[&[&str]]) -> Self {
        let mut keys = Vec::new();
        if rows.is_empty() {
            return Self::default();
        }
        let row_height = 1.0 / rows.len() as f32;
        for (r, row) in rows.iter().enumerate() {
            if row.is_empty() {
                continue;
            }
            let key_width = 1.0 / row.len() as f32;
            for (c, label) in row.iter().enumerate() {
                keys.push(LayoutKey {
                    label: (*label).to_string(),
                    rect: Rect::new(
                        c as f32 * key_width,
                        r as f32 * row_height,
                        key_width,
                        row_height,
                    ),
                });
            }
        }
        Self {
            keys,
            holds: Vec::new(),
        }
    }

    /// Add a hold action for `label`
    pub fn with_hold(mut self, label: &str, hold: &str) -> Self {
        self.holds.retain(|h| h.label != label);
        self.holds.push(HoldSpec {
            label: label.to_string(),
            hold: hold.to_string(),
        });
        self
    }

    /// Built-in split QWERTY half for a slot
    pub fn split_qwerty(slot: DeviceSlot) -> Self {
        let layout = match slot {
            DeviceSlot::Left => Self::grid(&[
                &["Esc", "1", "2", "3", "4", "5"],
                &["Tab", "Q", "W", "E", "R", "T"],
                &["Ctrl", "A", "S", "D", "F", "G"],
                &["Shift", "Z", "X", "C", "V", "B"],
                &["Alt", "Cmd", "Space"],
            ]),
            DeviceSlot::Right => Self::grid(&[
                &["6", "7", "8", "9", "0", "Back"],
                &["Y", "U", "I", "O", "P", "Enter"],
                &["H", "J", "K", "L", ";", "'"],
                &["N", "M", ",", ".", "/", "Shift"],
                &["Space", "Left", "Down", "Up", "Right"],
            ]),
        };
        layout.with_hold("Space", "Enter").with_hold("Back", "Del")
    }
}

/// Layouts for both slots as stored in a layout file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSet {
    pub left: KeyLayout,
    pub right: KeyLayout,
}

impl Default for LayoutSet {
    fn default() -> Self {
        Self {
            left: KeyLayout::split_qwerty(DeviceSlot::Left),
            right: KeyLayout::split_qwerty(DeviceSlot::Right),
        }
    }
}

impl LayoutSet {
    pub fn for_slot(&self, slot: DeviceSlot) -> &KeyLayout {
        match slot {
            DeviceSlot::Left => &self.left,
            DeviceSlot::Right => &self.right,
        }
    }

    /// Load a layout file (TOML with `[left]` and `[right]` tables)
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let layouts: LayoutSet = toml::from_str(&contents)?;
        Ok(layouts)
    }
}
