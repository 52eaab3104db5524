//! Touch frame data model

use crate::keyboard::Point;
use serde::{Deserialize, Serialize};

/// Per-contact state as reported by the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactState {
    NotTouching,
    Starting,
    Hovering,
    Making,
    Touching,
    Breaking,
    Lingering,
    Leaving,
}

impl ContactState {
    /// Finger is physically on the surface
    pub fn is_contact(self) -> bool {
        matches!(self, Self::Starting | Self::Making | Self::Touching)
    }

    /// Contact episode is ending
    pub fn is_ending(self) -> bool {
        matches!(self, Self::Breaking | Self::Leaving | Self::NotTouching)
    }

    /// Neither contact nor ending: hovering or lingering
    pub fn is_inert(self) -> bool {
        !self.is_contact() && !self.is_ending()
    }
}

/// One contact in a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawTouch {
    pub id: i32,
    /// Normalized 0..1, left to right
    pub x: f32,
    /// Normalized 0..1, top to bottom
    pub y: f32,
    pub pressure: f32,
    pub major_axis: f32,
    pub minor_axis: f32,
    pub angle: f32,
    pub density: f32,
    pub state: ContactState,
}

impl RawTouch {
    pub fn new(id: i32, x: f32, y: f32, state: ContactState) -> Self {
        Self {
            id,
            x,
            y,
            pressure: 0.0,
            major_axis: 0.0,
            minor_axis: 0.0,
            angle: 0.0,
            density: 0.0,
            state,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Logical device slot: exactly two exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceSlot {
    Left = 0,
    Right = 1,
}

impl DeviceSlot {
    pub const ALL: [DeviceSlot; 2] = [DeviceSlot::Left, DeviceSlot::Right];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Left),
            1 => Some(Self::Right),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Identity of one contact episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TouchIdentity {
    pub device_id: u64,
    pub touch_id: i32,
}

impl TouchIdentity {
    pub fn new(device_id: u64, touch_id: i32) -> Self {
        Self {
            device_id,
            touch_id,
        }
    }
}

/// A snapshot of all contacts on one device at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct TouchFrame {
    pub slot: DeviceSlot,
    pub device_id: u64,
    /// Seconds, monotonic, from the sensor clock
    pub timestamp: f64,
    /// Platform frame counter
    pub sequence: u64,
    pub touches: Vec<RawTouch>,
}

impl TouchFrame {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slot: DeviceSlot::Left,
            device_id: 0,
            timestamp: 0.0,
            sequence: 0,
            touches: Vec::with_capacity(capacity),
        }
    }

    /// Clear for reuse, keeping the touch buffer's allocation
    pub(crate) fn reset(&mut self, min_capacity: usize) {
        self.slot = DeviceSlot::Left;
        self.device_id = 0;
        self.timestamp = 0.0;
        self.sequence = 0;
        self.touches.clear();
        if self.touches.capacity() < min_capacity {
            self.touches.reserve(min_capacity);
        }
    }

    pub fn identity(&self, touch: &RawTouch) -> TouchIdentity {
        TouchIdentity::new(self.device_id, touch.id)
    }

    pub fn is_empty(&self) -> bool {
        self.touches.is_empty()
    }
}
