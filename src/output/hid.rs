//! HID keyboard usage (page 0x07) tables for the daemon backend

use crate::keyboard::{KeyCode, ModifierFlags};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Scancode to HID usage
const USAGES: &[(u16, u16)] = &[
    // Letters
    (30, 0x04), // A
    (48, 0x05), // B
    (46, 0x06), // C
    (32, 0x07), // D
    (18, 0x08), // E
    (33, 0x09), // F
    (34, 0x0A), // G
    (35, 0x0B), // H
    (23, 0x0C), // I
    (36, 0x0D), // J
    (37, 0x0E), // K
    (38, 0x0F), // L
    (50, 0x10), // M
    (49, 0x11), // N
    (24, 0x12), // O
    (25, 0x13), // P
    (16, 0x14), // Q
    (19, 0x15), // R
    (31, 0x16), // S
    (20, 0x17), // T
    (22, 0x18), // U
    (47, 0x19), // V
    (17, 0x1A), // W
    (45, 0x1B), // X
    (21, 0x1C), // Y
    (44, 0x1D), // Z
    // Digits row
    (2, 0x1E),
    (3, 0x1F),
    (4, 0x20),
    (5, 0x21),
    (6, 0x22),
    (7, 0x23),
    (8, 0x24),
    (9, 0x25),
    (10, 0x26),
    (11, 0x27),
    (28, 0x28), // Enter
    (1, 0x29),  // Esc
    (14, 0x2A), // Backspace
    (15, 0x2B), // Tab
    (57, 0x2C), // Space
    (12, 0x2D), // -
    (13, 0x2E), // =
    (26, 0x2F), // [
    (27, 0x30), // ]
    (43, 0x31), // backslash
    (39, 0x33), // ;
    (40, 0x34), // '
    (41, 0x35), // `
    (51, 0x36), // ,
    (52, 0x37), // .
    (53, 0x38), // /
    (58, 0x39), // Caps Lock
    // F1..F12
    (59, 0x3A),
    (60, 0x3B),
    (61, 0x3C),
    (62, 0x3D),
    (63, 0x3E),
    (64, 0x3F),
    (65, 0x40),
    (66, 0x41),
    (67, 0x42),
    (68, 0x43),
    (87, 0x44),
    (88, 0x45),
    // Navigation
    (102, 0x4A), // Home
    (104, 0x4B), // Page Up
    (111, 0x4C), // Delete
    (107, 0x4D), // End
    (109, 0x4E), // Page Down
    (106, 0x4F), // Right
    (105, 0x50), // Left
    (108, 0x51), // Down
    (103, 0x52), // Up
    // Modifiers
    (29, 0xE0),  // Left Ctrl
    (42, 0xE1),  // Left Shift
    (56, 0xE2),  // Left Alt
    (125, 0xE3), // Left Meta
    (97, 0xE4),  // Right Ctrl
    (54, 0xE5),  // Right Shift
    (100, 0xE6), // Right Alt
    (126, 0xE7), // Right Meta
];

static USAGE_MAP: LazyLock<HashMap<u16, u16>> =
    LazyLock::new(|| USAGES.iter().copied().collect());

const FIRST_MODIFIER_USAGE: u16 = 0xE0;
const LAST_MODIFIER_USAGE: u16 = 0xE7;

/// Left-hand bit for each flag; keys with no bit of their own use these
const FLAG_BITS: &[(ModifierFlags, u8)] = &[
    (ModifierFlags::CONTROL, 0x01),
    (ModifierFlags::SHIFT, 0x02),
    (ModifierFlags::ALT, 0x04),
    (ModifierFlags::COMMAND, 0x08),
];

/// HID usage for a scancode
pub fn usage_for(code: KeyCode) -> Option<u16> {
    USAGE_MAP.get(&code.as_u16()).copied()
}

/// Report modifier bit owned by a usage, if it is a modifier usage
pub fn modifier_bit(usage: u16) -> Option<u8> {
    if (FIRST_MODIFIER_USAGE..=LAST_MODIFIER_USAGE).contains(&usage) {
        Some(1 << (usage - FIRST_MODIFIER_USAGE))
    } else {
        None
    }
}

/// Report modifier bitmask for a flag set
pub fn flags_to_bitmask(flags: ModifierFlags) -> u8 {
    FLAG_BITS
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .fold(0, |mask, (_, bit)| mask | bit)
}
