//! Always-available software key injection
//!
//! With the `virtual-send` feature keys are synthesized through `enigo`.
//! Without it the backend is a dry run that logs each event and succeeds.

use super::{BackendKind, KeyBackend};
use crate::error::DispatchError;
use crate::keyboard::{KeyCode, ModifierFlags};

/// OS-level key event injection
#[derive(Debug, Default)]
pub struct SoftwareBackend {
    _private: (),
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether events actually reach the OS in this build
    pub fn is_live() -> bool {
        cfg!(feature = "virtual-send")
    }
}

impl KeyBackend for SoftwareBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    #[cfg(feature = "virtual-send")]
    fn post_key(
        &self,
        code: KeyCode,
        flags: ModifierFlags,
        down: bool,
    ) -> Result<(), DispatchError> {
        inject::post_key(code, flags, down)
    }

    #[cfg(not(feature = "virtual-send"))]
    fn post_key(
        &self,
        code: KeyCode,
        flags: ModifierFlags,
        down: bool,
    ) -> Result<(), DispatchError> {
        log::info!(
            "[dry run] key {} {}{}",
            code.as_u16(),
            flags.symbols(),
            if down { "down" } else { "up" }
        );
        Ok(())
    }
}

#[cfg(feature = "virtual-send")]
mod inject {
    use crate::error::DispatchError;
    use crate::keyboard::{KeyCode, KeyId, ModifierFlags};
    use enigo::{Direction, Enigo, Key, Keyboard, Settings};
    use std::cell::RefCell;

    thread_local! {
        // Enigo holds per-thread platform handles
        static ENIGO: RefCell<Option<Enigo>> = const { RefCell::new(None) };
    }

    const MODIFIER_KEYS: &[(ModifierFlags, Key)] = &[
        (ModifierFlags::CONTROL, Key::Control),
        (ModifierFlags::SHIFT, Key::Shift),
        (ModifierFlags::ALT, Key::Alt),
        (ModifierFlags::COMMAND, Key::Meta),
    ];

    fn enigo_key(id: KeyId) -> Option<Key> {
        let key = match id {
            KeyId::Space => Key::Space,
            KeyId::Enter => Key::Return,
            KeyId::Tab => Key::Tab,
            KeyId::Backspace => Key::Backspace,
            KeyId::Delete => Key::Delete,
            KeyId::Escape => Key::Escape,
            KeyId::CapsLock => Key::CapsLock,
            KeyId::Up => Key::UpArrow,
            KeyId::Down => Key::DownArrow,
            KeyId::Left => Key::LeftArrow,
            KeyId::Right => Key::RightArrow,
            KeyId::Home => Key::Home,
            KeyId::End => Key::End,
            KeyId::PageUp => Key::PageUp,
            KeyId::PageDown => Key::PageDown,
            KeyId::F1 => Key::F1,
            KeyId::F2 => Key::F2,
            KeyId::F3 => Key::F3,
            KeyId::F4 => Key::F4,
            KeyId::F5 => Key::F5,
            KeyId::F6 => Key::F6,
            KeyId::F7 => Key::F7,
            KeyId::F8 => Key::F8,
            KeyId::F9 => Key::F9,
            KeyId::F10 => Key::F10,
            KeyId::F11 => Key::F11,
            KeyId::F12 => Key::F12,
            KeyId::Shift | KeyId::RightShift => Key::Shift,
            KeyId::Control | KeyId::RightControl => Key::Control,
            KeyId::Alt | KeyId::RightAlt => Key::Alt,
            KeyId::Command | KeyId::RightCommand => Key::Meta,
            other => Key::Unicode(other.as_char()?),
        };
        Some(key)
    }

    fn send(enigo: &mut Enigo, key: Key, direction: Direction) -> Result<(), DispatchError> {
        enigo
            .key(key, direction)
            .map_err(|e| DispatchError::BackendUnavailable(e.to_string()))
    }

    pub(super) fn post_key(
        code: KeyCode,
        flags: ModifierFlags,
        down: bool,
    ) -> Result<(), DispatchError> {
        let id = KeyId::from_code(code).ok_or(DispatchError::UnsupportedKeyCode(code))?;
        let key = enigo_key(id).ok_or(DispatchError::UnsupportedKeyCode(code))?;
        // A modifier key carries its own flag; don't wrap it in itself
        let wrap = if id.is_modifier() {
            ModifierFlags::empty()
        } else {
            flags
        };

        ENIGO.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                let enigo = Enigo::new(&Settings::default())
                    .map_err(|e| DispatchError::BackendUnavailable(e.to_string()))?;
                *slot = Some(enigo);
            }
            let Some(enigo) = slot.as_mut() else {
                return Err(DispatchError::BackendUnavailable("no input connection".into()));
            };

            if down {
                for (flag, modifier) in MODIFIER_KEYS {
                    if wrap.contains(*flag) {
                        send(enigo, *modifier, Direction::Press)?;
                    }
                }
                send(enigo, key, Direction::Press)
            } else {
                send(enigo, key, Direction::Release)?;
                for (flag, modifier) in MODIFIER_KEYS.iter().rev() {
                    if wrap.contains(*flag) {
                        send(enigo, *modifier, Direction::Release)?;
                    }
                }
                Ok(())
            }
        })
    }

}
