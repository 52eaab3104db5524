//! Key event types produced by the classifier

use super::{KeyCode, ModifierFlags};

/// Type of key event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyEventType {
    /// Key goes down
    Press,
    /// Key comes back up
    Release,
}

impl KeyEventType {
    pub fn is_down(self) -> bool {
        self == KeyEventType::Press
    }
}

impl From<bool> for KeyEventType {
    fn from(down: bool) -> Self {
        if down {
            KeyEventType::Press
        } else {
            KeyEventType::Release
        }
    }
}

/// A key transition as handed to an output backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    /// The key code
    pub code: KeyCode,
    /// Modifiers that accompany the key
    pub flags: ModifierFlags,
    /// Type of event (press/release)
    pub event_type: KeyEventType,
}

impl KeyEvent {
    pub fn new(code: KeyCode, flags: ModifierFlags, event_type: KeyEventType) -> Self {
        Self {
            code,
            flags,
            event_type,
        }
    }

    pub fn press(code: KeyCode, flags: ModifierFlags) -> Self {
        Self::new(code, flags, KeyEventType::Press)
    }

    pub fn release(code: KeyCode, flags: ModifierFlags) -> Self {
        Self::new(code, flags, KeyEventType::Release)
    }
}
