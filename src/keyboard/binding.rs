//! Spatial key bindings
//!
//! A [`KeyBindingMap`] is built once per layout change and is immutable
//! afterwards. Hit testing walks the bindings in build order and the first
//! region containing the point wins, so overlaps resolve by declaration order.

use super::layout::KeyLayout;
use super::{KeyCode, KeyId, ModifierFlags};
use crate::error::LayoutError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A point in normalized surface coordinates (0..1, origin top-left)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned rectangle in normalized surface coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Half-open containment: left/top edges are inside, right/bottom are not
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x < self.x + self.width
            && point.y >= self.y
            && point.y < self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// A resolved key to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyAction {
    pub key: KeyId,
    pub code: KeyCode,
    pub flags: ModifierFlags,
}

impl From<KeyId> for KeyAction {
    fn from(key: KeyId) -> Self {
        let info = key.info();
        Self {
            key,
            code: info.code,
            flags: info.flags,
        }
    }
}

/// A region of the surface bound to a key
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBinding {
    pub region: Rect,
    pub label: Arc<str>,
    pub action: KeyAction,
    pub hold_action: Option<KeyAction>,
}

impl KeyBinding {
    pub fn key_code(&self) -> KeyCode {
        self.action.code
    }

    pub fn modifier_flags(&self) -> ModifierFlags {
        self.action.flags
    }

    pub fn is_modifier(&self) -> bool {
        self.action.key.is_modifier()
    }
}

/// First binding whose region contains `point`, in slice order
pub fn hit_test(point: Point, bindings: &[KeyBinding]) -> Option<&KeyBinding> {
    bindings.iter().find(|binding| binding.region.contains(point))
}

/// Precomputed bindings for one device slot
#[derive(Debug, Clone, Default)]
pub struct KeyBindingMap {
    bindings: Vec<KeyBinding>,
    by_label: HashMap<Arc<str>, usize>,
    errors: Vec<LayoutError>,
}

impl KeyBindingMap {
    /// Build the binding table for a layout.
    ///
    /// Keys with unknown labels or empty regions are skipped and recorded in
    /// [`errors`](Self::errors); the rest of the layout stays usable.
    pub fn build(layout: &KeyLayout) -> Self {
        let mut holds: HashMap<&str, KeyAction> = HashMap::new();
        let mut errors = Vec::new();

        for spec in &layout.holds {
            match KeyId::from_label(&spec.hold) {
                Some(id) => {
                    holds.insert(spec.label.as_str(), KeyAction::from(id));
                }
                None => errors.push(LayoutError::UnknownLabel(spec.hold.clone())),
            }
        }

        let mut bindings = Vec::with_capacity(layout.keys.len());
        let mut by_label = HashMap::with_capacity(layout.keys.len());

        for key in &layout.keys {
            let Some(id) = KeyId::from_label(&key.label) else {
                log::warn!("layout key {:?} has no key mapping, skipped", key.label);
                errors.push(LayoutError::UnknownLabel(key.label.clone()));
                continue;
            };
            if key.rect.is_empty() {
                errors.push(LayoutError::EmptyRegion(key.label.clone()));
                continue;
            }

            let label: Arc<str> = Arc::from(key.label.as_str());
            // Modifiers are held, never upgraded to a hold action
            let hold_action = if id.is_modifier() {
                None
            } else {
                holds.get(key.label.as_str()).copied()
            };

            by_label.entry(label.clone()).or_insert(bindings.len());
            bindings.push(KeyBinding {
                region: key.rect,
                label,
                action: KeyAction::from(id),
                hold_action,
            });
        }

        Self {
            bindings,
            by_label,
            errors,
        }
    }

    /// Resolved `(code, flags, hold action)` for a label in this map
    pub fn lookup(&self, label: &str) -> Option<(KeyCode, ModifierFlags, Option<KeyAction>)> {
        self.by_label.get(label).map(|&index| {
            let binding = &self.bindings[index];
            (binding.key_code(), binding.modifier_flags(), binding.hold_action)
        })
    }

    /// First binding containing `point`
    pub fn hit_test(&self, point: Point) -> Option<&KeyBinding> {
        hit_test(point, &self.bindings)
    }

    pub fn bindings(&self) -> &[KeyBinding] {
        &self.bindings
    }

    pub fn errors(&self) -> &[LayoutError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
