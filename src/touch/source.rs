//! Adapter from platform touch callbacks to pooled, slot-tagged frames

use super::{DeviceIdentity, FrameBus, FramePool, RawTouch};
use crate::error::AcquisitionError;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque platform device handle.
///
/// The core only needs a stable 64-bit identifier out of it.
pub trait DeviceHandle {
    fn device_id(&self) -> Option<u64>;
}

impl DeviceHandle for u64 {
    fn device_id(&self) -> Option<u64> {
        Some(*self)
    }
}

impl DeviceHandle for Option<u64> {
    fn device_id(&self) -> Option<u64> {
        *self
    }
}

/// Acquisition counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub frames: u64,
    pub unresolved: u64,
    pub inactive: u64,
    pub paused: u64,
}

impl SourceStats {
    pub fn errors(&self) -> u64 {
        self.unresolved + self.inactive + self.paused
    }
}

#[derive(Default)]
struct Counters {
    frames: AtomicU64,
    unresolved: AtomicU64,
    inactive: AtomicU64,
    paused: AtomicU64,
}

/// Turns sensor callbacks into published frames.
///
/// Safe to call concurrently from per-device callback threads; the only
/// cross-device synchronization is inside [`DeviceIdentity`].
pub struct FrameSource {
    pool: Arc<FramePool>,
    bus: Arc<FrameBus>,
    devices: Arc<DeviceIdentity>,
    frame_capacity: usize,
    listening: AtomicBool,
    counters: Counters,
}

impl FrameSource {
    pub fn new(
        pool: Arc<FramePool>,
        bus: Arc<FrameBus>,
        devices: Arc<DeviceIdentity>,
        frame_capacity: usize,
    ) -> Self {
        Self {
            pool,
            bus,
            devices,
            frame_capacity,
            listening: AtomicBool::new(true),
            counters: Counters::default(),
        }
    }

    /// Handle one sensor callback.
    ///
    /// An empty `touches` slice still publishes a frame so consumers can clear
    /// transient state. Errors are counted and the frame is dropped.
    pub fn on_callback<H>(
        &self,
        handle: &H,
        touches: &[RawTouch],
        timestamp: f64,
        sequence: u64,
    ) -> Result<(), AcquisitionError>
    where
        H: DeviceHandle + ?Sized,
    {
        let (device_id, slot) = match self.admit(handle) {
            Ok(admitted) => admitted,
            Err(err) => {
                log::debug!("frame {} dropped: {}", sequence, err);
                return Err(err);
            }
        };

        let mut builder = self.pool.acquire(touches.len().max(self.frame_capacity));
        {
            let frame = builder.frame_mut();
            frame.slot = slot;
            frame.device_id = device_id;
            frame.timestamp = timestamp;
            frame.sequence = sequence;
            frame.touches.extend_from_slice(touches);
        }
        self.bus.publish(builder.into_shared());
        self.counters.frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn admit<H>(&self, handle: &H) -> Result<(u64, super::DeviceSlot), AcquisitionError>
    where
        H: DeviceHandle + ?Sized,
    {
        if !self.listening.load(Ordering::Acquire) {
            self.counters.paused.fetch_add(1, Ordering::Relaxed);
            return Err(AcquisitionError::NotListening);
        }
        let Some(device_id) = handle.device_id() else {
            self.counters.unresolved.fetch_add(1, Ordering::Relaxed);
            return Err(AcquisitionError::UnresolvedDevice);
        };
        match self.devices.admit(device_id) {
            Some(slot) => Ok((device_id, slot)),
            None => {
                self.counters.inactive.fetch_add(1, Ordering::Relaxed);
                Err(AcquisitionError::InactiveDevice(device_id))
            }
        }
    }

    pub fn set_listening(&self, listening: bool) {
        self.listening.store(listening, Ordering::Release);
        log::info!("frame source {}", if listening { "listening" } else { "paused" });
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    pub fn devices(&self) -> &Arc<DeviceIdentity> {
        &self.devices
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames: self.counters.frames.load(Ordering::Relaxed),
            unresolved: self.counters.unresolved.load(Ordering::Relaxed),
            inactive: self.counters.inactive.load(Ordering::Relaxed),
            paused: self.counters.paused.load(Ordering::Relaxed),
        }
    }
}
