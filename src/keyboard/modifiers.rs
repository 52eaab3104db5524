//! Modifier flag sets carried by key bindings

use bitflags::bitflags;

bitflags! {
    /// Logical modifiers that accompany a key.
    ///
    /// Left and right variants collapse into one flag here; the output backends
    /// decide which physical modifier to synthesize.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModifierFlags: u8 {
        const SHIFT = 1 << 0;
        const CONTROL = 1 << 1;
        const ALT = 1 << 2;
        const COMMAND = 1 << 3;
    }
}

impl ModifierFlags {
    /// Short display string, e.g. "⇧⌃"
    pub fn symbols(self) -> String {
        let mut out = String::new();
        if self.contains(Self::CONTROL) {
            out.push('⌃');
        }
        if self.contains(Self::ALT) {
            out.push('⌥');
        }
        if self.contains(Self::SHIFT) {
            out.push('⇧');
        }
        if self.contains(Self::COMMAND) {
            out.push('⌘');
        }
        out
    }
}
