//! Key identifiers and the static label table
//!
//! Every key a layout may name is a [`KeyId`]. Labels are resolved to a `KeyId`
//! once, when a binding map is built; the hot path only ever sees the resolved
//! [`KeyCode`] and [`ModifierFlags`].

use super::ModifierFlags;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Represents a physical key code (Linux evdev scancode space)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub fn new(code: u16) -> Self {
        Self(code)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl From<u16> for KeyCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

/// Resolved information about a key identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfo {
    /// Canonical label
    pub label: &'static str,
    /// Scancode to send
    pub code: KeyCode,
    /// Modifiers that must accompany the scancode
    pub flags: ModifierFlags,
}

impl KeyInfo {
    const fn new(label: &'static str, code: KeyCode, flags: ModifierFlags) -> Self {
        Self { label, code, flags }
    }
}

const NONE: ModifierFlags = ModifierFlags::empty();
const SHIFT: ModifierFlags = ModifierFlags::SHIFT;

macro_rules! key_ids {
    ($($id:ident => $label:literal, $code:literal, $flags:expr;)*) => {
        /// Enumerated key identifier
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum KeyId {
            $($id),*
        }

        impl KeyId {
            /// Every known key, in table order
            pub const ALL: &'static [KeyId] = &[$(KeyId::$id),*];

            /// Static key information
            pub const fn info(self) -> KeyInfo {
                match self {
                    $(KeyId::$id => KeyInfo::new($label, KeyCode($code), $flags)),*
                }
            }
        }
    };
}

key_ids! {
    A => "A", 30, NONE;
    B => "B", 48, NONE;
    C => "C", 46, NONE;
    D => "D", 32, NONE;
    E => "E", 18, NONE;
    F => "F", 33, NONE;
    G => "G", 34, NONE;
    H => "H", 35, NONE;
    I => "I", 23, NONE;
    J => "J", 36, NONE;
    K => "K", 37, NONE;
    L => "L", 38, NONE;
    M => "M", 50, NONE;
    N => "N", 49, NONE;
    O => "O", 24, NONE;
    P => "P", 25, NONE;
    Q => "Q", 16, NONE;
    R => "R", 19, NONE;
    S => "S", 31, NONE;
    T => "T", 20, NONE;
    U => "U", 22, NONE;
    V => "V", 47, NONE;
    W => "W", 17, NONE;
    X => "X", 45, NONE;
    Y => "Y", 21, NONE;
    Z => "Z", 44, NONE;
    Digit1 => "1", 2, NONE;
    Digit2 => "2", 3, NONE;
    Digit3 => "3", 4, NONE;
    Digit4 => "4", 5, NONE;
    Digit5 => "5", 6, NONE;
    Digit6 => "6", 7, NONE;
    Digit7 => "7", 8, NONE;
    Digit8 => "8", 9, NONE;
    Digit9 => "9", 10, NONE;
    Digit0 => "0", 11, NONE;
    Minus => "-", 12, NONE;
    Equal => "=", 13, NONE;
    LeftBracket => "[", 26, NONE;
    RightBracket => "]", 27, NONE;
    Backslash => "\\", 43, NONE;
    Semicolon => ";", 39, NONE;
    Apostrophe => "'", 40, NONE;
    Grave => "`", 41, NONE;
    Comma => ",", 51, NONE;
    Period => ".", 52, NONE;
    Slash => "/", 53, NONE;
    Exclaim => "!", 2, SHIFT;
    At => "@", 3, SHIFT;
    Hash => "#", 4, SHIFT;
    Dollar => "$", 5, SHIFT;
    Percent => "%", 6, SHIFT;
    Caret => "^", 7, SHIFT;
    Ampersand => "&", 8, SHIFT;
    Asterisk => "*", 9, SHIFT;
    LeftParen => "(", 10, SHIFT;
    RightParen => ")", 11, SHIFT;
    Underscore => "_", 12, SHIFT;
    Plus => "+", 13, SHIFT;
    LeftBrace => "{", 26, SHIFT;
    RightBrace => "}", 27, SHIFT;
    Pipe => "|", 43, SHIFT;
    Colon => ":", 39, SHIFT;
    DoubleQuote => "\"", 40, SHIFT;
    Tilde => "~", 41, SHIFT;
    LessThan => "<", 51, SHIFT;
    GreaterThan => ">", 52, SHIFT;
    Question => "?", 53, SHIFT;
    Space => "Space", 57, NONE;
    Enter => "Enter", 28, NONE;
    Tab => "Tab", 15, NONE;
    Backspace => "Back", 14, NONE;
    Delete => "Del", 111, NONE;
    Escape => "Esc", 1, NONE;
    CapsLock => "Caps", 58, NONE;
    Up => "Up", 103, NONE;
    Down => "Down", 108, NONE;
    Left => "Left", 105, NONE;
    Right => "Right", 106, NONE;
    Home => "Home", 102, NONE;
    End => "End", 107, NONE;
    PageUp => "PgUp", 104, NONE;
    PageDown => "PgDn", 109, NONE;
    F1 => "F1", 59, NONE;
    F2 => "F2", 60, NONE;
    F3 => "F3", 61, NONE;
    F4 => "F4", 62, NONE;
    F5 => "F5", 63, NONE;
    F6 => "F6", 64, NONE;
    F7 => "F7", 65, NONE;
    F8 => "F8", 66, NONE;
    F9 => "F9", 67, NONE;
    F10 => "F10", 68, NONE;
    F11 => "F11", 87, NONE;
    F12 => "F12", 88, NONE;
    Shift => "Shift", 42, SHIFT;
    RightShift => "RShift", 54, SHIFT;
    Control => "Ctrl", 29, ModifierFlags::CONTROL;
    RightControl => "RCtrl", 97, ModifierFlags::CONTROL;
    Alt => "Alt", 56, ModifierFlags::ALT;
    RightAlt => "RAlt", 100, ModifierFlags::ALT;
    Command => "Cmd", 125, ModifierFlags::COMMAND;
    RightCommand => "RCmd", 126, ModifierFlags::COMMAND;
}

/// Alternative spellings accepted in layouts
const LABEL_ALIASES: &[(&str, KeyId)] = &[
    ("Backspace", KeyId::Backspace),
    ("Delete", KeyId::Delete),
    ("Return", KeyId::Enter),
    ("Escape", KeyId::Escape),
    ("CapsLock", KeyId::CapsLock),
    ("Control", KeyId::Control),
    ("Option", KeyId::Alt),
    ("Command", KeyId::Command),
    ("Meta", KeyId::Command),
    ("PageUp", KeyId::PageUp),
    ("PageDown", KeyId::PageDown),
    ("←", KeyId::Left),
    ("→", KeyId::Right),
    ("↑", KeyId::Up),
    ("↓", KeyId::Down),
];

static LABELS: LazyLock<HashMap<&'static str, KeyId>> = LazyLock::new(|| {
    let mut map = HashMap::with_capacity(KeyId::ALL.len() + LABEL_ALIASES.len());
    for &id in KeyId::ALL {
        map.insert(id.info().label, id);
    }
    for &(alias, id) in LABEL_ALIASES {
        map.entry(alias).or_insert(id);
    }
    map
});

/// Unshifted key for each scancode
static BY_CODE: LazyLock<HashMap<KeyCode, KeyId>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for &id in KeyId::ALL {
        let info = id.info();
        if info.flags.is_empty() || id.is_modifier() {
            map.entry(info.code).or_insert(id);
        }
    }
    map
});

impl KeyId {
    /// Resolve a layout label. Single letters are case-insensitive.
    pub fn from_label(label: &str) -> Option<KeyId> {
        if let Some(&id) = LABELS.get(label) {
            return Some(id);
        }
        let mut chars = label.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_lowercase() => {
                let upper = c.to_ascii_uppercase().to_string();
                LABELS.get(upper.as_str()).copied()
            }
            _ => None,
        }
    }

    /// The unshifted key that produces `code`
    pub fn from_code(code: KeyCode) -> Option<KeyId> {
        BY_CODE.get(&code).copied()
    }

    /// Whether this key is a modifier (held, counted, never tapped)
    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            KeyId::Shift
                | KeyId::RightShift
                | KeyId::Control
                | KeyId::RightControl
                | KeyId::Alt
                | KeyId::RightAlt
                | KeyId::Command
                | KeyId::RightCommand
        )
    }

    /// Printable character for the unshifted key, if any
    pub fn as_char(self) -> Option<char> {
        let label = self.info().label;
        let mut chars = label.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => Some(c.to_ascii_lowercase()),
            (Some(c), None) if c.is_ascii_graphic() => Some(c),
            _ => None,
        }
    }
}
