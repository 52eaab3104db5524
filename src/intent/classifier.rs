//! Touch intent state machine
//!
//! Per contact: `Contacting` until it either ends (tap or nothing), fires its
//! hold action, or is disqualified as pointing. Contacts landing on a modifier
//! go straight to `ModifierHeld` and are counted per modifier key, so several
//! fingers on the same modifier produce one key-down and one key-up.

use super::ClassifierParams;
use crate::error::DispatchError;
use crate::keyboard::{KeyAction, KeyBindingMap, KeyCode, ModifierFlags, Point};
use crate::output::KeySink;
use crate::touch::{DeviceSlot, RawTouch, TouchFrame, TouchIdentity};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Where a contact is in its episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TouchPhase {
    /// On a key, may still become a tap or a hold
    Contacting,
    /// Hold action sent; nothing more for this contact
    HoldFired,
    /// Holding a modifier down
    ModifierHeld,
    /// Looked like pointing; nothing will be sent
    Disqualified,
}

/// Tracked state of one contact episode
#[derive(Debug, Clone, PartialEq)]
struct ActiveTouchState {
    start_time: f64,
    start: Point,
    last: Point,
    action: KeyAction,
    hold_action: Option<KeyAction>,
    phase: TouchPhase,
}

impl ActiveTouchState {
    fn motion(&self, position: Point, now: f64) -> (f64, f32, f32) {
        let elapsed = now - self.start_time;
        let displacement = self.start.distance(position);
        let velocity = if elapsed > 0.0 {
            (displacement as f64 / elapsed) as f32
        } else {
            0.0
        };
        (elapsed, displacement, velocity)
    }
}

/// Classification counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifierStats {
    pub frames: u64,
    pub taps: u64,
    pub holds: u64,
    pub modifier_downs: u64,
    pub modifier_ups: u64,
    /// Contacts dropped by the motion check
    pub disqualified: u64,
    /// Contacts that outlived the tap window without a hold action
    pub expired: u64,
    pub dispatch_errors: u64,
    pub unsupported_keys: u64,
}

#[derive(Debug, Clone, Copy)]
struct ModifierCount {
    flags: ModifierFlags,
    touches: usize,
}

/// Turns touch frames into key actions.
///
/// Not thread-safe on purpose: exactly one owner drives it, normally the
/// classifier worker thread.
pub struct IntentClassifier {
    params: ClassifierParams,
    maps: [KeyBindingMap; 2],
    touches: HashMap<TouchIdentity, ActiveTouchState>,
    modifiers: HashMap<KeyCode, ModifierCount>,
    sink: Arc<dyn KeySink>,
    stats: ClassifierStats,
    /// Scratch list of contacts that vanished from a frame
    vanished: Vec<TouchIdentity>,
}

impl IntentClassifier {
    pub fn new(params: ClassifierParams, sink: Arc<dyn KeySink>) -> Self {
        Self {
            params,
            maps: [KeyBindingMap::default(), KeyBindingMap::default()],
            touches: HashMap::new(),
            modifiers: HashMap::new(),
            sink,
            stats: ClassifierStats::default(),
            vanished: Vec::new(),
        }
    }

    /// Replace the binding map for a slot wholesale
    pub fn set_layout(&mut self, slot: DeviceSlot, map: KeyBindingMap) {
        log::info!("{} layout updated: {} bindings", slot.name(), map.len());
        self.maps[slot.index()] = map;
    }

    pub fn layout(&self, slot: DeviceSlot) -> &KeyBindingMap {
        &self.maps[slot.index()]
    }

    pub fn params(&self) -> &ClassifierParams {
        &self.params
    }

    /// Run one frame through the state machine. The frame timestamp is "now".
    pub fn process_frame(&mut self, frame: &TouchFrame) {
        self.stats.frames += 1;
        let now = frame.timestamp;

        for touch in &frame.touches {
            let identity = frame.identity(touch);
            if touch.state.is_contact() {
                self.on_contact(frame.slot, identity, touch, now);
            } else if touch.state.is_ending() {
                self.on_end(identity, touch.position(), now);
            }
        }

        // Contacts missing from the frame ended without an end state
        self.vanished.clear();
        for identity in self.touches.keys() {
            if identity.device_id == frame.device_id
                && !frame.touches.iter().any(|t| t.id == identity.touch_id)
            {
                self.vanished.push(*identity);
            }
        }
        let mut vanished = std::mem::take(&mut self.vanished);
        for identity in vanished.drain(..) {
            let last = self.touches.get(&identity).map(|state| state.last);
            if let Some(last) = last {
                self.on_end(identity, last, now);
            }
        }
        self.vanished = vanished;
    }

    fn on_contact(&mut self, slot: DeviceSlot, identity: TouchIdentity, touch: &RawTouch, now: f64) {
        let position = touch.position();

        let Some(state) = self.touches.get_mut(&identity) else {
            self.on_land(slot, identity, position, now);
            return;
        };

        state.last = position;
        if state.phase != TouchPhase::Contacting {
            return;
        }

        let (elapsed, displacement, velocity) = state.motion(position, now);
        if self
            .params
            .disqualifier
            .disqualify(elapsed, displacement, velocity)
        {
            state.phase = TouchPhase::Disqualified;
            self.stats.disqualified += 1;
            log::debug!(
                "touch {:?} disqualified: travel {:.3}, speed {:.2}",
                identity,
                displacement,
                velocity
            );
            return;
        }

        let hold = match state.hold_action {
            Some(hold) if elapsed >= self.params.hold_min_secs() => {
                state.phase = TouchPhase::HoldFired;
                hold
            }
            _ => return,
        };
        self.stats.holds += 1;
        log::debug!("hold {:?} after {:.3}s", hold.key, elapsed);
        self.stroke(hold);
    }

    fn on_land(&mut self, slot: DeviceSlot, identity: TouchIdentity, position: Point, now: f64) {
        let Some(binding) = self.maps[slot.index()].hit_test(position) else {
            return;
        };

        let phase = if binding.is_modifier() {
            TouchPhase::ModifierHeld
        } else {
            TouchPhase::Contacting
        };
        let action = binding.action;
        self.touches.insert(
            identity,
            ActiveTouchState {
                start_time: now,
                start: position,
                last: position,
                action,
                hold_action: binding.hold_action,
                phase,
            },
        );

        if phase == TouchPhase::ModifierHeld {
            self.modifier_down(action);
        }
    }

    fn on_end(&mut self, identity: TouchIdentity, position: Point, now: f64) {
        let Some(state) = self.touches.remove(&identity) else {
            return;
        };

        match state.phase {
            TouchPhase::ModifierHeld => self.modifier_up(state.action.code),
            TouchPhase::HoldFired | TouchPhase::Disqualified => {}
            TouchPhase::Contacting => {
                let (elapsed, displacement, velocity) = state.motion(position, now);
                if elapsed > self.params.tap_max_secs() {
                    self.stats.expired += 1;
                    log::debug!("touch {:?} outlived tap window ({:.3}s)", identity, elapsed);
                } else if self
                    .params
                    .disqualifier
                    .disqualify(elapsed, displacement, velocity)
                {
                    self.stats.disqualified += 1;
                } else {
                    self.stats.taps += 1;
                    self.stroke(state.action);
                }
            }
        }
    }

    fn modifier_down(&mut self, action: KeyAction) {
        let count = self.modifiers.entry(action.code).or_insert(ModifierCount {
            flags: action.flags,
            touches: 0,
        });
        count.touches += 1;
        if count.touches == 1 {
            self.stats.modifier_downs += 1;
            let result = self.sink.post_key(action.code, action.flags, true);
            self.record(action.code, result);
        }
    }

    fn modifier_up(&mut self, code: KeyCode) {
        let Some(count) = self.modifiers.get_mut(&code) else {
            return;
        };
        count.touches = count.touches.saturating_sub(1);
        if count.touches > 0 {
            return;
        }
        let flags = count.flags;
        self.modifiers.remove(&code);
        self.stats.modifier_ups += 1;
        let result = self.sink.post_key(code, flags, false);
        self.record(code, result);
    }

    fn stroke(&mut self, action: KeyAction) {
        let result = self.sink.post_key_stroke(action.code, action.flags);
        self.record(action.code, result);
    }

    fn record(&mut self, code: KeyCode, result: Result<(), DispatchError>) {
        match result {
            Ok(()) => {}
            Err(DispatchError::UnsupportedKeyCode(_)) => {
                self.stats.unsupported_keys += 1;
                log::warn!("key {:?} is not supported by the active backend", code);
            }
            Err(err) => {
                self.stats.dispatch_errors += 1;
                log::warn!("key {:?} dispatch failed: {}", code, err);
            }
        }
    }

    /// Release every held modifier, then forget all contacts
    pub fn cancel_all(&mut self) {
        let held: Vec<(KeyCode, ModifierFlags)> = self
            .modifiers
            .drain()
            .map(|(code, count)| (code, count.flags))
            .collect();
        for (code, flags) in held {
            self.stats.modifier_ups += 1;
            let result = self.sink.post_key(code, flags, false);
            self.record(code, result);
        }
        if !self.touches.is_empty() {
            log::debug!("cancelled {} active touches", self.touches.len());
        }
        self.touches.clear();
    }

    pub fn active_touches(&self) -> usize {
        self.touches.len()
    }

    /// Modifier keys currently held down
    pub fn held_modifiers(&self) -> Vec<KeyCode> {
        let mut codes: Vec<KeyCode> = self.modifiers.keys().copied().collect();
        codes.sort();
        codes
    }

    pub fn stats(&self) -> ClassifierStats {
        self.stats
    }
}

impl Drop for IntentClassifier {
    fn drop(&mut self) {
        if !self.modifiers.is_empty() {
            self.cancel_all();
        }
    }
}
