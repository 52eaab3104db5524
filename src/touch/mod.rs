//! Frame acquisition and distribution
//!
//! ```text
//! sensor callback ──► FrameSource ──► FramePool (buffer)
//!                          │
//!                   DeviceIdentity (slot 0|1)
//!                          │
//!                       FrameBus ──► classifier, visualization, ...
//! ```

mod bus;
mod frame;
mod identity;
mod pool;
mod source;

pub use bus::{FrameBus, Subscription};
pub use frame::{ContactState, DeviceSlot, RawTouch, TouchFrame, TouchIdentity};
pub use identity::{DeviceIdentity, SlotEntry};
pub use pool::{FrameBuilder, FramePool, FrameRef, PoolStats};
pub use source::{DeviceHandle, FrameSource, SourceStats};
