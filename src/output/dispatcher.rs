//! Backend selection and failover
//!
//! The hot path reads one atomic word to learn the active backend. Health
//! transitions take a short lock, recompute the selection and publish it with
//! a single store, so a failure reported from inside a dispatch call is
//! visible to the very next call.

use super::health::{
    select_backend, BackendKind, BackendPreference, BackendStatus, HealthEvent, HealthState,
};
use super::{KeyBackend, KeySink};
use crate::error::DispatchError;
use crate::keyboard::{KeyCode, ModifierFlags};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct SelectorState {
    health: HealthState,
    preference: BackendPreference,
    installed: bool,
    reachable: bool,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
}

/// Health state machine plus the active-backend word
#[derive(Debug)]
pub struct BackendSelector {
    active: AtomicU8,
    health: AtomicU8,
    state: Mutex<SelectorState>,
}

impl BackendSelector {
    pub fn new(preference: BackendPreference) -> Self {
        Self {
            active: AtomicU8::new(BackendKind::Software as u8),
            health: AtomicU8::new(HealthState::Unknown as u8),
            state: Mutex::new(SelectorState {
                preference,
                ..SelectorState::default()
            }),
        }
    }

    /// Backend the next dispatch will use
    pub fn active(&self) -> BackendKind {
        BackendKind::from_u8(self.active.load(Ordering::Acquire))
    }

    pub fn health(&self) -> HealthState {
        HealthState::from_u8(self.health.load(Ordering::Acquire))
    }

    pub fn preference(&self) -> BackendPreference {
        self.state.lock().preference
    }

    /// Whether the preferred backend is the privileged one and it is not healthy
    pub fn wants_check(&self) -> bool {
        let state = self.state.lock();
        state.preference == BackendPreference::Privileged && !state.health.is_healthy()
    }

    /// Feed one event into the health state machine
    pub fn apply(&self, event: HealthEvent, error: Option<String>) -> HealthState {
        let mut state = self.state.lock();
        let previous = state.health;
        state.health = previous.on(event);

        match event {
            HealthEvent::CheckPassed => {
                state.installed = true;
                state.reachable = true;
            }
            HealthEvent::NotInstalled => {
                state.installed = false;
                state.reachable = false;
            }
            HealthEvent::ServerUnreachable | HealthEvent::SendFailed => {
                state.installed = true;
                state.reachable = false;
            }
            HealthEvent::ConnectFailed
            | HealthEvent::HandshakeFailed
            | HealthEvent::VersionMismatch
            | HealthEvent::PermissionDenied => state.installed = true,
            HealthEvent::CheckStarted => {}
        }
        if let Some(error) = error {
            state.last_error = Some(error);
            state.last_error_at = Some(Utc::now());
        }

        self.publish(&state);
        if state.health != previous {
            let level = if state.health.is_failure() {
                log::Level::Warn
            } else {
                log::Level::Info
            };
            log::log!(
                level,
                "privileged backend {} -> {}",
                previous.name(),
                state.health.name()
            );
        }
        state.health
    }

    /// A backend failed to deliver an event
    pub fn report_failure(&self, kind: BackendKind, error: &DispatchError) {
        if kind == BackendKind::Software || !error.is_backend_failure() {
            return;
        }
        self.apply(HealthEvent::for_error(error), Some(error.to_string()));
    }

    pub fn set_preference(&self, preference: BackendPreference) {
        let mut state = self.state.lock();
        state.preference = preference;
        self.publish(&state);
        log::info!("preferred backend set to {:?}", preference);
    }

    fn publish(&self, state: &SelectorState) {
        let active = select_backend(state.preference, state.health);
        self.health.store(state.health as u8, Ordering::Release);
        self.active.store(active as u8, Ordering::Release);
    }

    pub fn status(&self) -> BackendStatus {
        let state = self.state.lock();
        BackendStatus {
            installed: state.installed,
            reachable: state.reachable,
            health: state.health,
            preference: state.preference,
            active_backend: select_backend(state.preference, state.health),
            last_error: state.last_error.clone(),
            last_error_at: state.last_error_at,
        }
    }
}

/// Dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub software: u64,
    pub privileged: u64,
    pub failovers: u64,
    pub unsupported: u64,
}

#[derive(Default)]
struct Counters {
    software: AtomicU64,
    privileged: AtomicU64,
    failovers: AtomicU64,
    unsupported: AtomicU64,
}

/// Routes key actions to the active backend.
///
/// The software backend is always present. A privileged failure is reported
/// before the call returns and the same event is retried on software. A
/// key-up goes to the backend that took its key-down, whatever is active by
/// then.
pub struct OutputDispatcher {
    software: Arc<dyn KeyBackend>,
    privileged: RwLock<Option<Arc<dyn KeyBackend>>>,
    selector: Arc<BackendSelector>,
    counters: Counters,
    /// Backend holding each key that is down
    held: Mutex<HashMap<KeyCode, BackendKind>>,
}

impl OutputDispatcher {
    pub fn new(software: Arc<dyn KeyBackend>, preference: BackendPreference) -> Self {
        Self {
            software,
            privileged: RwLock::new(None),
            selector: Arc::new(BackendSelector::new(preference)),
            counters: Counters::default(),
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn selector(&self) -> &Arc<BackendSelector> {
        &self.selector
    }

    /// Install (or replace) the privileged backend.
    ///
    /// A replaced backend is told to release its keys first.
    pub fn install_privileged(&self, backend: Arc<dyn KeyBackend>) {
        let previous = self.privileged.write().replace(backend);
        if let Some(previous) = previous {
            release_backend(previous.as_ref());
        }
    }

    pub fn remove_privileged(&self) -> Option<Arc<dyn KeyBackend>> {
        let removed = self.privileged.write().take();
        if let Some(backend) = &removed {
            release_backend(backend.as_ref());
        }
        removed
    }

    pub fn has_privileged(&self) -> bool {
        self.privileged.read().is_some()
    }

    pub fn report_failure(&self, kind: BackendKind, error: &DispatchError) {
        self.selector.report_failure(kind, error);
    }

    pub fn set_preference(&self, preference: BackendPreference) {
        self.selector.set_preference(preference);
    }

    pub fn status(&self) -> BackendStatus {
        self.selector.status()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            software: self.counters.software.load(Ordering::Relaxed),
            privileged: self.counters.privileged.load(Ordering::Relaxed),
            failovers: self.counters.failovers.load(Ordering::Relaxed),
            unsupported: self.counters.unsupported.load(Ordering::Relaxed),
        }
    }

    /// Keys currently down and the backend holding each
    pub fn held_keys(&self) -> Vec<(KeyCode, BackendKind)> {
        let mut keys: Vec<_> = self.held.lock().iter().map(|(&k, &b)| (k, b)).collect();
        keys.sort_by_key(|&(code, _)| code);
        keys
    }

    /// Send one event to `kind`, failing over to software when a privileged
    /// send fails. Returns the backend that took the event.
    fn deliver(
        &self,
        kind: BackendKind,
        code: KeyCode,
        flags: ModifierFlags,
        down: bool,
    ) -> Result<BackendKind, DispatchError> {
        if kind == BackendKind::Software {
            return self.post_software(code, flags, down);
        }
        let Some(backend) = self.privileged.read().clone() else {
            return self.post_software(code, flags, down);
        };
        match backend.post_key(code, flags, down) {
            Ok(()) => {
                self.count(BackendKind::Privileged, &Ok(()));
                Ok(BackendKind::Privileged)
            }
            Err(err) if !err.is_backend_failure() => {
                let result = Err(err);
                self.count(BackendKind::Privileged, &result);
                result.map(|()| kind)
            }
            Err(err) => {
                self.counters.failovers.fetch_add(1, Ordering::Relaxed);
                log::warn!("privileged backend failed ({}), falling back to software", err);
                self.selector.report_failure(BackendKind::Privileged, &err);
                self.post_software(code, flags, down)
            }
        }
    }

    fn post_software(
        &self,
        code: KeyCode,
        flags: ModifierFlags,
        down: bool,
    ) -> Result<BackendKind, DispatchError> {
        let result = self.software.post_key(code, flags, down);
        self.count(BackendKind::Software, &result);
        result.map(|()| BackendKind::Software)
    }

    fn count(&self, kind: BackendKind, result: &Result<(), DispatchError>) {
        let counter = match result {
            Ok(()) if kind == BackendKind::Privileged => &self.counters.privileged,
            Ok(()) => &self.counters.software,
            Err(DispatchError::UnsupportedKeyCode(_)) => &self.counters.unsupported,
            Err(_) => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn release_backend(backend: &dyn KeyBackend) {
    if let Err(err) = backend.release_all() {
        log::debug!("{} backend could not release keys: {}", backend.kind().name(), err);
    }
}

impl KeySink for OutputDispatcher {
    fn post_key(
        &self,
        code: KeyCode,
        flags: ModifierFlags,
        down: bool,
    ) -> Result<(), DispatchError> {
        if down {
            let landed = self.deliver(self.selector.active(), code, flags, true)?;
            self.held.lock().insert(code, landed);
            Ok(())
        } else {
            let holder = self.held.lock().remove(&code);
            let kind = holder.unwrap_or_else(|| self.selector.active());
            self.deliver(kind, code, flags, false).map(|_| ())
        }
    }

    /// Both halves go to one backend, read once for the whole stroke
    fn post_key_stroke(&self, code: KeyCode, flags: ModifierFlags) -> Result<(), DispatchError> {
        let landed = self.deliver(self.selector.active(), code, flags, true)?;
        self.deliver(landed, code, flags, false).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::KeyId;
    use crate::testing::RecordingBackend;
    use std::io;

    fn dispatcher() -> (OutputDispatcher, Arc<RecordingBackend>, Arc<RecordingBackend>) {
        let software = Arc::new(RecordingBackend::new(BackendKind::Software));
        let privileged = Arc::new(RecordingBackend::new(BackendKind::Privileged));
        let dispatcher = OutputDispatcher::new(software.clone(), BackendPreference::Privileged);
        dispatcher.install_privileged(privileged.clone());
        (dispatcher, software, privileged)
    }

    fn a() -> KeyCode {
        KeyId::A.info().code
    }

    #[test]
    fn software_until_privileged_is_healthy() {
        let (dispatcher, software, privileged) = dispatcher();
        dispatcher.post_key_stroke(a(), ModifierFlags::empty()).unwrap();
        assert_eq!(software.len(), 2);
        assert_eq!(privileged.len(), 0);

        dispatcher.selector().apply(HealthEvent::CheckPassed, None);
        assert_eq!(dispatcher.selector().active(), BackendKind::Privileged);
        dispatcher.post_key_stroke(a(), ModifierFlags::empty()).unwrap();
        assert_eq!(privileged.len(), 2);
        assert_eq!(dispatcher.stats().privileged, 2);
    }

    #[test]
    fn send_failure_fails_over_synchronously() {
        let (dispatcher, software, privileged) = dispatcher();
        dispatcher.selector().apply(HealthEvent::CheckPassed, None);
        privileged.fail_with(|| {
            DispatchError::SocketSendFailed(io::Error::new(io::ErrorKind::NotFound, "gone"))
        });

        // The failing event itself is retried on software
        dispatcher.post_key(a(), ModifierFlags::empty(), true).unwrap();
        assert_eq!(dispatcher.selector().health(), HealthState::Unreachable);
        assert_eq!(dispatcher.selector().active(), BackendKind::Software);
        assert_eq!(software.len(), 1);

        dispatcher.post_key(a(), ModifierFlags::empty(), false).unwrap();
        assert_eq!(software.len(), 2);
        assert_eq!(privileged.attempts(), 1);
        assert_eq!(dispatcher.stats().failovers, 1);

        let status = dispatcher.status();
        assert!(!status.reachable);
        assert!(status.last_error.is_some());
        assert!(status.last_error_at.is_some());
    }

    #[test]
    fn unsupported_key_does_not_change_health() {
        let (dispatcher, _software, privileged) = dispatcher();
        dispatcher.selector().apply(HealthEvent::CheckPassed, None);
        privileged.fail_with(|| DispatchError::UnsupportedKeyCode(KeyCode(999)));

        let result = dispatcher.post_key(KeyCode(999), ModifierFlags::empty(), true);
        assert!(matches!(result, Err(DispatchError::UnsupportedKeyCode(_))));
        assert_eq!(dispatcher.selector().health(), HealthState::Healthy);
        assert_eq!(dispatcher.stats().unsupported, 1);
    }

    #[test]
    fn software_preference_ignores_healthy_privileged() {
        let (dispatcher, software, privileged) = dispatcher();
        dispatcher.selector().apply(HealthEvent::CheckPassed, None);
        dispatcher.set_preference(BackendPreference::Software);
        dispatcher.post_key(a(), ModifierFlags::empty(), true).unwrap();
        assert_eq!(software.len(), 1);
        assert_eq!(privileged.len(), 0);
        assert!(!dispatcher.selector().wants_check());
    }

    #[test]
    fn key_up_follows_its_key_down_across_health_change() {
        let (dispatcher, software, privileged) = dispatcher();
        let shift = KeyId::Shift.info().code;
        dispatcher.post_key(shift, ModifierFlags::SHIFT, true).unwrap();
        assert_eq!(dispatcher.held_keys(), vec![(shift, BackendKind::Software)]);

        dispatcher.selector().apply(HealthEvent::CheckPassed, None);
        assert_eq!(dispatcher.selector().active(), BackendKind::Privileged);
        dispatcher.post_key(shift, ModifierFlags::SHIFT, false).unwrap();

        assert_eq!(
            software.events(),
            vec![(KeyId::Shift, true), (KeyId::Shift, false)]
        );
        assert!(privileged.is_empty());
        assert!(dispatcher.held_keys().is_empty());

        // New presses use the newly active backend
        dispatcher.post_key(shift, ModifierFlags::SHIFT, true).unwrap();
        assert_eq!(privileged.events(), vec![(KeyId::Shift, true)]);
    }

    #[test]
    fn key_up_follows_its_key_down_across_preference_toggle() {
        let (dispatcher, software, privileged) = dispatcher();
        dispatcher.selector().apply(HealthEvent::CheckPassed, None);
        dispatcher.post_key(a(), ModifierFlags::empty(), true).unwrap();

        dispatcher.set_preference(BackendPreference::Software);
        dispatcher.post_key(a(), ModifierFlags::empty(), false).unwrap();

        assert_eq!(privileged.events(), vec![(KeyId::A, true), (KeyId::A, false)]);
        assert!(software.is_empty());
    }

    /// Software backend that brings the privileged one up once a key-down lands
    struct PromotingBackend {
        inner: RecordingBackend,
        selector: Mutex<Option<Arc<BackendSelector>>>,
    }

    impl KeyBackend for PromotingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Software
        }

        fn post_key(
            &self,
            code: KeyCode,
            flags: ModifierFlags,
            down: bool,
        ) -> Result<(), DispatchError> {
            self.inner.post_key(code, flags, down)?;
            if down {
                if let Some(selector) = self.selector.lock().as_ref() {
                    selector.apply(HealthEvent::CheckPassed, None);
                }
            }
            Ok(())
        }
    }

    #[test]
    fn stroke_is_not_split_by_a_mid_stroke_switch() {
        let software = Arc::new(PromotingBackend {
            inner: RecordingBackend::new(BackendKind::Software),
            selector: Mutex::new(None),
        });
        let privileged = Arc::new(RecordingBackend::new(BackendKind::Privileged));
        let dispatcher = OutputDispatcher::new(software.clone(), BackendPreference::Privileged);
        dispatcher.install_privileged(privileged.clone());
        *software.selector.lock() = Some(Arc::clone(dispatcher.selector()));

        dispatcher.post_key_stroke(a(), ModifierFlags::empty()).unwrap();
        assert_eq!(dispatcher.selector().active(), BackendKind::Privileged);
        assert_eq!(
            software.inner.events(),
            vec![(KeyId::A, true), (KeyId::A, false)]
        );
        assert!(privileged.is_empty());
    }

    #[test]
    fn stroke_key_up_follows_failover() {
        let (dispatcher, software, privileged) = dispatcher();
        dispatcher.selector().apply(HealthEvent::CheckPassed, None);
        privileged.fail_with(|| DispatchError::BackendUnavailable("gone".into()));

        dispatcher.post_key_stroke(a(), ModifierFlags::empty()).unwrap();
        assert_eq!(software.events(), vec![(KeyId::A, true), (KeyId::A, false)]);
        assert_eq!(privileged.attempts(), 1);
    }

    #[test]
    fn replaced_privileged_backend_releases_its_keys() {
        let (dispatcher, _software, privileged) = dispatcher();
        dispatcher.install_privileged(Arc::new(RecordingBackend::new(BackendKind::Privileged)));
        assert_eq!(privileged.releases(), 1);

        let current = dispatcher.remove_privileged().unwrap();
        assert!(!dispatcher.has_privileged());
        assert_eq!(current.kind(), BackendKind::Privileged);
        assert_eq!(privileged.releases(), 1);
    }

    #[test]
    fn software_failures_do_not_touch_health() {
        let selector = BackendSelector::new(BackendPreference::Privileged);
        selector.apply(HealthEvent::CheckPassed, None);
        selector.report_failure(
            BackendKind::Software,
            &DispatchError::BackendUnavailable("x".into()),
        );
        assert_eq!(selector.health(), HealthState::Healthy);
    }
}
