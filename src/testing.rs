//! Shared helpers for unit and integration tests
//!
//! Recording key sinks/backends and compact frame constructors.

use crate::error::DispatchError;
use crate::keyboard::{KeyCode, KeyEvent, KeyId, ModifierFlags};
use crate::output::{BackendKind, KeyBackend, KeySink};
use crate::touch::{ContactState, DeviceSlot, RawTouch, TouchFrame};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// `(touch id, (x, y), state)`
pub type TouchSpec = (i32, (f32, f32), ContactState);

/// Build a touch
pub fn touch(id: i32, (x, y): (f32, f32), state: ContactState) -> RawTouch {
    RawTouch::new(id, x, y, state)
}

/// Build a slot-0 frame from compact touch specs
pub fn frame(device_id: u64, timestamp: f64, touches: &[TouchSpec]) -> TouchFrame {
    frame_on(DeviceSlot::Left, device_id, timestamp, touches)
}

pub fn frame_on(
    slot: DeviceSlot,
    device_id: u64,
    timestamp: f64,
    touches: &[TouchSpec],
) -> TouchFrame {
    let mut frame = TouchFrame::with_capacity(touches.len());
    frame.slot = slot;
    frame.device_id = device_id;
    frame.timestamp = timestamp;
    frame
        .touches
        .extend(touches.iter().map(|&(id, pos, state)| touch(id, pos, state)));
    frame
}

/// Map raw events to `(key, down)` pairs for readable assertions
fn as_pairs(events: &[KeyEvent]) -> Vec<(KeyId, bool)> {
    events
        .iter()
        .filter_map(|event| {
            KeyId::from_code(event.code).map(|id| (id, event.event_type.is_down()))
        })
        .collect()
}

fn wait_for_len(len: impl Fn() -> usize, count: usize, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while len() < count {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
    true
}

/// Key sink that records every accepted event
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<KeyEvent>>,
    rejected: Vec<KeyCode>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that answers `UnsupportedKeyCode` for these keys
    pub fn rejecting(keys: &[KeyId]) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            rejected: keys.iter().map(|id| id.info().code).collect(),
        }
    }

    pub fn events(&self) -> Vec<(KeyId, bool)> {
        as_pairs(&self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Wait until at least `count` events were recorded
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        wait_for_len(|| self.len(), count, timeout)
    }
}

impl KeySink for RecordingSink {
    fn post_key(
        &self,
        code: KeyCode,
        flags: ModifierFlags,
        down: bool,
    ) -> Result<(), DispatchError> {
        if self.rejected.contains(&code) {
            return Err(DispatchError::UnsupportedKeyCode(code));
        }
        self.events
            .lock()
            .push(KeyEvent::new(code, flags, down.into()));
        Ok(())
    }
}

type FailureFn = Box<dyn Fn() -> DispatchError + Send + Sync>;

/// Backend that records events and can be told to fail
pub struct RecordingBackend {
    kind: BackendKind,
    events: Mutex<Vec<KeyEvent>>,
    attempts: AtomicUsize,
    releases: AtomicUsize,
    failure: Mutex<Option<FailureFn>>,
}

impl RecordingBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            events: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }

    /// Fail every following send with the error `make` builds
    pub fn fail_with<F>(&self, make: F)
    where
        F: Fn() -> DispatchError + Send + Sync + 'static,
    {
        *self.failure.lock() = Some(Box::new(make));
    }

    pub fn succeed(&self) {
        *self.failure.lock() = None;
    }

    /// Delivered events
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every send, delivered or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn events(&self) -> Vec<(KeyId, bool)> {
        as_pairs(&self.events.lock())
    }

    /// How often `release_all` was called
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::Relaxed)
    }

    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        wait_for_len(|| self.len(), count, timeout)
    }
}

impl KeyBackend for RecordingBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn post_key(
        &self,
        code: KeyCode,
        flags: ModifierFlags,
        down: bool,
    ) -> Result<(), DispatchError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if let Some(make) = self.failure.lock().as_ref() {
            return Err(make());
        }
        self.events
            .lock()
            .push(KeyEvent::new(code, flags, down.into()));
        Ok(())
    }

    fn release_all(&self) -> Result<(), DispatchError> {
        self.releases.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl std::fmt::Debug for RecordingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingBackend")
            .field("kind", &self.kind)
            .field("events", &self.len())
            .field("attempts", &self.attempts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_helper_fills_fields() {
        let frame = frame(9, 1.25, &[(1, (0.1, 0.2), ContactState::Touching)]);
        assert_eq!(frame.device_id, 9);
        assert_eq!(frame.slot, DeviceSlot::Left);
        assert_eq!(frame.timestamp, 1.25);
        assert_eq!(frame.touches[0].x, 0.1);
    }

    #[test]
    fn recording_backend_failure_toggles() {
        let backend = RecordingBackend::new(BackendKind::Privileged);
        backend.fail_with(|| DispatchError::BackendUnavailable("down".into()));
        assert!(backend.post_key(KeyCode(30), ModifierFlags::empty(), true).is_err());
        backend.succeed();
        assert!(backend.post_key(KeyCode(30), ModifierFlags::empty(), true).is_ok());
        assert_eq!(backend.attempts(), 2);
        assert_eq!(backend.events(), vec![(KeyId::A, true)]);
    }
}
