//! Key identifiers, bindings and layouts

mod binding;
mod event;
pub mod keymap;
pub mod layout;
mod modifiers;

pub use binding::{hit_test, KeyAction, KeyBinding, KeyBindingMap, Point, Rect};
pub use event::{KeyEvent, KeyEventType};
pub use keymap::{KeyCode, KeyId, KeyInfo};
pub use layout::{HoldSpec, KeyLayout, LayoutKey, LayoutSet};
pub use modifiers::ModifierFlags;
