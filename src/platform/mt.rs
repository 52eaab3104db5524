//! Linux multitouch (type B) event decoding
//!
//! The kernel reports contacts per MT slot: `ABS_MT_SLOT` selects a slot,
//! `ABS_MT_TRACKING_ID` starts (id >= 0) or ends (-1) a contact in it, and
//! axis events update the selected slot. `SYN_REPORT` closes a frame.

use crate::touch::{ContactState, RawTouch};

pub const EV_SYN: u16 = 0x00;
pub const EV_ABS: u16 = 0x03;

pub const SYN_REPORT: u16 = 0;
pub const SYN_DROPPED: u16 = 3;

pub const ABS_MT_SLOT: u16 = 0x2f;
pub const ABS_MT_TOUCH_MAJOR: u16 = 0x30;
pub const ABS_MT_TOUCH_MINOR: u16 = 0x31;
pub const ABS_MT_ORIENTATION: u16 = 0x34;
pub const ABS_MT_POSITION_X: u16 = 0x35;
pub const ABS_MT_POSITION_Y: u16 = 0x36;
pub const ABS_MT_TRACKING_ID: u16 = 0x39;
pub const ABS_MT_PRESSURE: u16 = 0x3a;

/// Upper bound on MT slots tracked per device
const MAX_SLOTS: usize = 64;

/// Reported range of one absolute axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub min: i32,
    pub max: i32,
}

impl AxisRange {
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// Map a raw value into 0..=1
    pub fn normalize(&self, value: i32) -> f32 {
        let span = self.max - self.min;
        if span <= 0 {
            return 0.0;
        }
        ((value - self.min) as f32 / span as f32).clamp(0.0, 1.0)
    }
}

/// Axis ranges needed to normalize a device's contacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRanges {
    pub x: AxisRange,
    pub y: AxisRange,
    pub pressure: Option<AxisRange>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Contact {
    id: i32,
    x: i32,
    y: i32,
    major: i32,
    minor: i32,
    orientation: i32,
    pressure: i32,
}

#[derive(Debug, Clone, Copy, Default)]
struct MtSlot {
    current: Option<Contact>,
    /// Contact that ended since the last report
    ended: Option<Contact>,
    /// `current` started since the last report
    fresh: bool,
}

/// Folds a device's event stream into per-report touch arrays
#[derive(Debug)]
pub struct MtDecoder {
    ranges: AxisRanges,
    slots: Vec<MtSlot>,
    selected: usize,
    touches: Vec<RawTouch>,
    dropping: bool,
    reports: u64,
}

impl MtDecoder {
    pub fn new(ranges: AxisRanges, slot_count: usize) -> Self {
        Self {
            ranges,
            slots: vec![MtSlot::default(); slot_count.clamp(1, MAX_SLOTS)],
            selected: 0,
            touches: Vec::with_capacity(slot_count.min(MAX_SLOTS)),
            dropping: false,
            reports: 0,
        }
    }

    /// Feed one kernel event.
    ///
    /// Returns true when a frame is complete; read it with [`Self::touches`].
    pub fn feed(&mut self, event_type: u16, code: u16, value: i32) -> bool {
        match (event_type, code) {
            (EV_SYN, SYN_DROPPED) => {
                log::debug!("evdev buffer overrun, discarding until next report");
                self.dropping = true;
                false
            }
            (EV_SYN, SYN_REPORT) => {
                if self.dropping {
                    self.dropping = false;
                    return false;
                }
                self.build_report();
                true
            }
            (EV_ABS, _) if !self.dropping => {
                self.apply_abs(code, value);
                false
            }
            _ => false,
        }
    }

    /// Touches of the last completed frame
    pub fn touches(&self) -> &[RawTouch] {
        &self.touches
    }

    /// Completed frames so far
    pub fn reports(&self) -> u64 {
        self.reports
    }

    fn apply_abs(&mut self, code: u16, value: i32) {
        if code == ABS_MT_SLOT {
            match usize::try_from(value) {
                Ok(index) if index < MAX_SLOTS => {
                    if index >= self.slots.len() {
                        self.slots.resize(index + 1, MtSlot::default());
                    }
                    self.selected = index;
                }
                _ => log::debug!("ignoring out-of-range MT slot {}", value),
            }
            return;
        }

        let slot = &mut self.slots[self.selected];
        if code == ABS_MT_TRACKING_ID {
            if let Some(previous) = slot.current.take() {
                slot.ended = Some(previous);
            }
            if value >= 0 {
                // Axes carry over from the previous contact until updated
                let base = slot.ended.unwrap_or_default();
                slot.current = Some(Contact { id: value, ..base });
                slot.fresh = true;
            }
            return;
        }

        let Some(contact) = slot.current.as_mut() else {
            return;
        };
        match code {
            ABS_MT_POSITION_X => contact.x = value,
            ABS_MT_POSITION_Y => contact.y = value,
            ABS_MT_TOUCH_MAJOR => contact.major = value,
            ABS_MT_TOUCH_MINOR => contact.minor = value,
            ABS_MT_ORIENTATION => contact.orientation = value,
            ABS_MT_PRESSURE => contact.pressure = value,
            _ => {}
        }
    }

    fn build_report(&mut self) {
        self.touches.clear();
        for slot in &mut self.slots {
            if let Some(ended) = slot.ended.take() {
                let touch = to_touch(&self.ranges, &ended, ContactState::Leaving);
                self.touches.push(touch);
            }
            if let Some(current) = &slot.current {
                let state = if slot.fresh {
                    ContactState::Making
                } else {
                    ContactState::Touching
                };
                self.touches.push(to_touch(&self.ranges, current, state));
            }
            slot.fresh = false;
        }
        self.reports += 1;
    }
}

fn to_touch(ranges: &AxisRanges, contact: &Contact, state: ContactState) -> RawTouch {
    let mut touch = RawTouch::new(
        contact.id,
        ranges.x.normalize(contact.x),
        ranges.y.normalize(contact.y),
        state,
    );
    touch.pressure = ranges
        .pressure
        .map_or(contact.pressure as f32, |range| range.normalize(contact.pressure));
    touch.major_axis = contact.major as f32;
    touch.minor_axis = contact.minor as f32;
    touch.angle = contact.orientation as f32;
    touch
}
