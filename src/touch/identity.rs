//! Stable device-to-slot assignment
//!
//! A fixed two-entry LRU: the table never grows past two slots no matter how
//! many physical devices come and go.

use super::DeviceSlot;
use parking_lot::Mutex;
use serde::Serialize;

/// One logical slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlotEntry {
    pub device_id: Option<u64>,
    pub last_used_tick: u64,
}

#[derive(Debug, Default)]
struct SlotTable {
    slots: [SlotEntry; 2],
    tick: u64,
    /// Ordered active set; empty accepts every device
    active: Vec<u64>,
}

impl SlotTable {
    fn resolve(&mut self, device_id: u64) -> DeviceSlot {
        self.tick += 1;
        let tick = self.tick;

        let index = if let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.device_id == Some(device_id))
        {
            index
        } else if let Some(index) = self.slots.iter().position(|slot| slot.device_id.is_none()) {
            index
        } else {
            // Least recently touched; ties go to slot 0
            let evicted = if self.slots[1].last_used_tick < self.slots[0].last_used_tick {
                1
            } else {
                0
            };
            log::debug!(
                "device {:#x} evicts {:?} from slot {}",
                device_id,
                self.slots[evicted].device_id,
                evicted
            );
            evicted
        };

        self.slots[index] = SlotEntry {
            device_id: Some(device_id),
            last_used_tick: tick,
        };
        if index == 0 {
            DeviceSlot::Left
        } else {
            DeviceSlot::Right
        }
    }
}

/// Maps device ids to logical slots
#[derive(Debug, Default)]
pub struct DeviceIdentity {
    inner: Mutex<SlotTable>,
}

impl DeviceIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `device_id`, claiming or evicting as needed
    pub fn resolve_slot(&self, device_id: u64) -> DeviceSlot {
        self.inner.lock().resolve(device_id)
    }

    /// Apply an ordered active device set.
    ///
    /// `ids[0]` takes slot 0 and `ids[1]` slot 1; an empty set clears the
    /// restriction and keeps current assignments.
    pub fn pin(&self, ids: &[u64]) {
        let mut table = self.inner.lock();
        if ids.len() > 2 {
            log::warn!("{} active devices requested, only the first two are used", ids.len());
        }
        table.active = ids.iter().copied().take(2).collect();
        if table.active.is_empty() {
            return;
        }

        table.slots = [SlotEntry::default(); 2];
        let active = table.active.clone();
        for device_id in active {
            table.resolve(device_id);
        }
    }

    /// Whether frames from `device_id` should be accepted
    pub fn is_active(&self, device_id: u64) -> bool {
        let table = self.inner.lock();
        table.active.is_empty() || table.active.contains(&device_id)
    }

    /// Accept-check and resolve under one lock acquisition
    pub fn admit(&self, device_id: u64) -> Option<DeviceSlot> {
        let mut table = self.inner.lock();
        if !table.active.is_empty() && !table.active.contains(&device_id) {
            return None;
        }
        Some(table.resolve(device_id))
    }

    pub fn active_devices(&self) -> Vec<u64> {
        self.inner.lock().active.clone()
    }

    pub fn slots(&self) -> [SlotEntry; 2] {
        self.inner.lock().slots
    }
}
