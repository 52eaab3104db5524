//! In-place keyboard input report

/// Usage slots per report
pub const KEY_SLOTS: usize = 32;

pub const KEYBOARD_REPORT_ID: u8 = 1;

/// report id, modifiers, reserved, then the usage slots
pub const KEYBOARD_REPORT_LEN: usize = 3 + 2 * KEY_SLOTS;

/// Rollover keyboard report, mutated in place on every key transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardReport {
    pub report_id: u8,
    pub modifiers: u8,
    pub reserved: u8,
    pub keys: [u16; KEY_SLOTS],
}

impl Default for KeyboardReport {
    fn default() -> Self {
        Self {
            report_id: KEYBOARD_REPORT_ID,
            modifiers: 0,
            reserved: 0,
            keys: [0; KEY_SLOTS],
        }
    }
}

impl KeyboardReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `usage` to the first free slot.
    ///
    /// Returns the slot holding the usage, or `None` when every slot is taken.
    /// Inserting a usage that is already present changes nothing.
    pub fn insert_key(&mut self, usage: u16) -> Option<usize> {
        if usage == 0 {
            return None;
        }
        if let Some(index) = self.keys.iter().position(|&k| k == usage) {
            return Some(index);
        }
        let index = self.keys.iter().position(|&k| k == 0)?;
        self.keys[index] = usage;
        Some(index)
    }

    /// Clear every slot holding `usage`
    pub fn remove_key(&mut self, usage: u16) {
        for key in self.keys.iter_mut().filter(|k| **k == usage) {
            *key = 0;
        }
    }

    pub fn contains(&self, usage: u16) -> bool {
        usage != 0 && self.keys.contains(&usage)
    }

    pub fn pressed(&self) -> usize {
        self.keys.iter().filter(|&&k| k != 0).count()
    }

    pub fn clear(&mut self) {
        self.modifiers = 0;
        self.keys = [0; KEY_SLOTS];
    }

    /// Serialize into `out`, which must be `KEYBOARD_REPORT_LEN` long
    pub fn write_to(&self, out: &mut [u8; KEYBOARD_REPORT_LEN]) {
        out[0] = self.report_id;
        out[1] = self.modifiers;
        out[2] = self.reserved;
        for (chunk, key) in out[3..].chunks_exact_mut(2).zip(self.keys.iter()) {
            chunk.copy_from_slice(&key.to_le_bytes());
        }
    }
}
