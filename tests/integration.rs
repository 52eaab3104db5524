//! Integration tests for Touchpad Keyboard
//!
//! These drive the public API end to end: sensor callbacks through the
//! pipeline into recording backends, the dispatcher failover path, and the
//! daemon client against a socket playing the server.

use std::sync::Arc;
use std::time::Duration;
use touchpad_keyboard::error::{AcquisitionError, DispatchError};
use touchpad_keyboard::intent::{ClassifierParams, IntentClassifier};
use touchpad_keyboard::keyboard::{KeyBindingMap, KeyId, KeyLayout, LayoutSet, ModifierFlags};
use touchpad_keyboard::output::{
    BackendKind, BackendPreference, HealthEvent, HealthState, KeySink, OutputDispatcher,
};
use touchpad_keyboard::pipeline::{Pipeline, PipelineOptions};
use touchpad_keyboard::testing::{frame, touch, RecordingBackend, RecordingSink, TouchSpec};
use touchpad_keyboard::touch::ContactState::*;
use touchpad_keyboard::touch::{DeviceIdentity, DeviceSlot, FrameBus, FramePool};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const WAIT: Duration = Duration::from_secs(2);

/// Left-half positions in the built-in split layout
const Q: (f32, f32) = (0.25, 0.3);
const A: (f32, f32) = (0.25, 0.5);
const SHIFT: (f32, f32) = (0.05, 0.7);
const SPACE: (f32, f32) = (0.8, 0.9);

fn software_pipeline() -> (Pipeline, Arc<RecordingBackend>) {
    let software = Arc::new(RecordingBackend::new(BackendKind::Software));
    let dispatcher = Arc::new(OutputDispatcher::new(
        software.clone(),
        BackendPreference::Software,
    ));
    let pipeline = Pipeline::start(
        ClassifierParams::default(),
        &LayoutSet::default(),
        dispatcher,
        PipelineOptions {
            subscriber_capacity: 64,
            ..PipelineOptions::default()
        },
    )
    .expect("pipeline should start");
    (pipeline, software)
}

/// Feed device 1 a sequence of `(timestamp, touches)` callbacks
fn feed(pipeline: &Pipeline, frames: &[(f64, Vec<TouchSpec>)]) {
    for (sequence, (timestamp, touches)) in frames.iter().enumerate() {
        let raw: Vec<_> = touches
            .iter()
            .map(|&(id, pos, state)| touch(id, pos, state))
            .collect();
        pipeline
            .on_callback(&1u64, &raw, *timestamp, sequence as u64)
            .expect("device 1 is accepted");
    }
}

/// Wait until the classifier has seen `count` frames
fn settle(pipeline: &Pipeline, count: u64) {
    let deadline = std::time::Instant::now() + WAIT;
    while pipeline.stats().classifier.frames < count && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
}

// ---------------------------------------------------------------------------
// Classification through the pipeline
// ---------------------------------------------------------------------------

#[test]
fn short_touch_is_a_single_tap() {
    let (pipeline, software) = software_pipeline();
    feed(
        &pipeline,
        &[
            (0.0, vec![(1, Q, Touching)]),
            (0.05, vec![(1, Q, Leaving)]),
        ],
    );

    assert!(software.wait_for(2, WAIT));
    settle(&pipeline, 2);
    assert_eq!(software.events(), vec![(KeyId::Q, true), (KeyId::Q, false)]);
    assert_eq!(pipeline.stats().classifier.holds, 0);
}

#[test]
fn repeated_end_states_tap_once() {
    let (pipeline, software) = software_pipeline();
    feed(
        &pipeline,
        &[
            (0.0, vec![(1, Q, Touching)]),
            (0.05, vec![(1, Q, Breaking)]),
            (0.06, vec![(1, Q, Leaving)]),
            (0.07, vec![(1, Q, NotTouching)]),
        ],
    );

    settle(&pipeline, 4);
    assert_eq!(software.events(), vec![(KeyId::Q, true), (KeyId::Q, false)]);
    assert_eq!(pipeline.stats().classifier.taps, 1);
}

#[test]
fn sustained_touch_fires_hold_once_and_no_tap() {
    let (pipeline, software) = software_pipeline();
    feed(
        &pipeline,
        &[
            (0.0, vec![(1, SPACE, Touching)]),
            (0.2, vec![(1, SPACE, Touching)]),
            (0.45, vec![(1, SPACE, Touching)]),
            (0.5, vec![(1, SPACE, Touching)]),
            (0.6, vec![(1, SPACE, Leaving)]),
        ],
    );

    settle(&pipeline, 5);
    assert_eq!(
        software.events(),
        vec![(KeyId::Enter, true), (KeyId::Enter, false)]
    );
    let stats = pipeline.stats();
    assert_eq!(stats.classifier.holds, 1);
    assert_eq!(stats.classifier.taps, 0);
}

#[test]
fn overlapping_modifier_fingers_send_one_pair() {
    let (pipeline, software) = software_pipeline();
    feed(&pipeline, &[(0.0, vec![(1, SHIFT, Touching)])]);
    assert!(software.wait_for(1, WAIT));

    feed(
        &pipeline,
        &[
            (0.1, vec![(1, SHIFT, Touching), (2, SHIFT, Touching)]),
            (
                0.2,
                vec![(1, SHIFT, Touching), (2, SHIFT, Touching), (3, SHIFT, Touching)],
            ),
            (0.3, vec![(1, SHIFT, Leaving), (2, SHIFT, Touching), (3, SHIFT, Touching)]),
            (0.4, vec![(2, SHIFT, Leaving), (3, SHIFT, Touching)]),
        ],
    );
    settle(&pipeline, 5);
    assert_eq!(software.events(), vec![(KeyId::Shift, true)]);
    assert_eq!(pipeline.stats().held_modifiers.len(), 1);

    feed(&pipeline, &[(0.5, vec![(3, SHIFT, Leaving)])]);
    settle(&pipeline, 6);
    assert_eq!(
        software.events(),
        vec![(KeyId::Shift, true), (KeyId::Shift, false)]
    );
    assert!(pipeline.stats().held_modifiers.is_empty());
}

#[test]
fn stopping_with_held_modifier_sends_key_up() {
    let (mut pipeline, software) = software_pipeline();
    feed(&pipeline, &[(0.0, vec![(1, SHIFT, Touching)])]);
    assert!(software.wait_for(1, WAIT));

    pipeline.stop();
    assert_eq!(
        software.events(),
        vec![(KeyId::Shift, true), (KeyId::Shift, false)]
    );
    let stats = pipeline.stats();
    assert_eq!(stats.active_touches, 0);
    assert!(stats.held_modifiers.is_empty());
}

#[test]
fn changing_active_devices_releases_modifiers() {
    let (pipeline, software) = software_pipeline();
    feed(&pipeline, &[(0.0, vec![(1, SHIFT, Touching)])]);
    assert!(software.wait_for(1, WAIT));

    pipeline.set_active_devices(&[7, 8]);
    assert_eq!(
        software.events(),
        vec![(KeyId::Shift, true), (KeyId::Shift, false)]
    );
    assert_eq!(
        pipeline.on_callback(&1u64, &[], 0.1, 9),
        Err(AcquisitionError::InactiveDevice(1))
    );
    assert_eq!(pipeline.stats().slots[0].device_id, Some(7));
}

#[test]
fn unresolved_handles_are_counted_not_fatal() {
    let (pipeline, _software) = software_pipeline();
    assert_eq!(
        pipeline.on_callback(&None::<u64>, &[], 0.0, 1),
        Err(AcquisitionError::UnresolvedDevice)
    );
    pipeline.on_callback(&1u64, &[], 0.0, 2).unwrap();

    let stats = pipeline.stats();
    assert_eq!(stats.source.unresolved, 1);
    assert_eq!(stats.frames_published, 1);
}

#[test]
fn unsupported_key_fails_only_its_binding() {
    let sink = Arc::new(RecordingSink::rejecting(&[KeyId::Q]));
    let mut classifier = IntentClassifier::new(ClassifierParams::default(), sink.clone());
    classifier.set_layout(
        DeviceSlot::Left,
        KeyBindingMap::build(&KeyLayout::split_qwerty(DeviceSlot::Left)),
    );

    classifier.process_frame(&frame(1, 0.0, &[(1, Q, Touching), (2, A, Touching)]));
    classifier.process_frame(&frame(1, 0.05, &[(1, Q, Leaving), (2, A, Leaving)]));

    assert_eq!(sink.events(), vec![(KeyId::A, true), (KeyId::A, false)]);
    assert_eq!(classifier.stats().unsupported_keys, 1);
}

// ---------------------------------------------------------------------------
// Device slots and buffers
// ---------------------------------------------------------------------------

#[test]
fn device_slots_are_stable_and_lru_evicted() {
    let identity = DeviceIdentity::new();
    assert_eq!(identity.resolve_slot(10), DeviceSlot::Left);
    assert_eq!(identity.resolve_slot(20), DeviceSlot::Right);
    for _ in 0..5 {
        assert_eq!(identity.resolve_slot(20), DeviceSlot::Right);
        assert_eq!(identity.resolve_slot(10), DeviceSlot::Left);
    }

    // 20 was touched least recently
    assert_eq!(identity.resolve_slot(30), DeviceSlot::Right);
    assert_eq!(identity.resolve_slot(10), DeviceSlot::Left);
    assert_eq!(identity.resolve_slot(20), DeviceSlot::Right);
}

#[test]
fn pool_allocation_converges_under_steady_load() {
    let pool = FramePool::new(8);
    let bus = FrameBus::new(2);
    let subscriber = bus.subscribe();

    let mut allocated_at = Vec::new();
    for i in 0..1000u64 {
        let mut builder = pool.acquire(4);
        builder.frame_mut().sequence = i;
        bus.publish(builder.into_shared());
        if i % 3 == 0 {
            while let Some(frame) = subscriber.try_recv() {
                frame.release();
            }
        }
        if i % 100 == 99 {
            allocated_at.push(pool.stats().allocated);
        }
    }

    assert!(allocated_at.windows(2).all(|w| w[0] == w[1]));
    assert!(pool.stats().allocated <= 4);
    assert!(bus.dropped() > 0);
    assert_eq!(pool.stats().leaked, 0);
}

#[test]
fn pipeline_returns_every_frame_to_pool() {
    let (mut pipeline, _software) = software_pipeline();
    for i in 0..200 {
        pipeline.on_callback(&1u64, &[], i as f64 * 0.008, i).unwrap();
    }
    settle(&pipeline, 200);
    pipeline.stop();

    let stats = pipeline.stats();
    assert_eq!(stats.pool.leaked, 0);
    assert_eq!(stats.pool.in_flight(), 0);
    assert!(stats.pool.allocated < 200);
}

// ---------------------------------------------------------------------------
// Output dispatch
// ---------------------------------------------------------------------------

fn privileged_dispatcher() -> (OutputDispatcher, Arc<RecordingBackend>, Arc<RecordingBackend>) {
    let software = Arc::new(RecordingBackend::new(BackendKind::Software));
    let privileged = Arc::new(RecordingBackend::new(BackendKind::Privileged));
    let dispatcher = OutputDispatcher::new(software.clone(), BackendPreference::Privileged);
    dispatcher.install_privileged(privileged.clone());
    dispatcher.selector().apply(HealthEvent::CheckPassed, None);
    (dispatcher, software, privileged)
}

#[test]
fn failed_privileged_send_fails_over_synchronously() {
    let (dispatcher, software, privileged) = privileged_dispatcher();
    let a = KeyId::A.info().code;

    dispatcher.post_key_stroke(a, ModifierFlags::empty()).unwrap();
    assert_eq!(privileged.len(), 2);

    privileged.fail_with(|| {
        DispatchError::SocketSendFailed(std::io::Error::from(std::io::ErrorKind::NotFound))
    });
    dispatcher.post_key(a, ModifierFlags::empty(), true).unwrap();

    // Already switched when the failing call returned
    let status = dispatcher.status();
    assert_eq!(status.active_backend, BackendKind::Software);
    assert_eq!(status.health, HealthState::Unreachable);
    assert!(status.last_error.is_some());
    assert!(status.last_error_at.is_some());
    assert_eq!(software.events(), vec![(KeyId::A, true)]);

    let attempts = privileged.attempts();
    dispatcher.post_key(a, ModifierFlags::empty(), false).unwrap();
    assert_eq!(privileged.attempts(), attempts);
    assert_eq!(software.events(), vec![(KeyId::A, true), (KeyId::A, false)]);
    assert_eq!(dispatcher.stats().failovers, 1);
}

#[test]
fn modifier_held_across_backend_switch_is_released_where_pressed() {
    let software = Arc::new(RecordingBackend::new(BackendKind::Software));
    let privileged = Arc::new(RecordingBackend::new(BackendKind::Privileged));
    let dispatcher = Arc::new(OutputDispatcher::new(
        software.clone(),
        BackendPreference::Privileged,
    ));
    dispatcher.install_privileged(privileged.clone());

    let mut classifier = IntentClassifier::new(ClassifierParams::default(), dispatcher.clone());
    classifier.set_layout(
        DeviceSlot::Left,
        KeyBindingMap::build(&KeyLayout::split_qwerty(DeviceSlot::Left)),
    );

    classifier.process_frame(&frame(1, 0.0, &[(1, SHIFT, Touching)]));
    dispatcher.selector().apply(HealthEvent::CheckPassed, None);
    classifier.process_frame(&frame(1, 0.3, &[(1, SHIFT, Leaving)]));

    assert_eq!(
        software.events(),
        vec![(KeyId::Shift, true), (KeyId::Shift, false)]
    );
    assert!(privileged.is_empty());
    assert!(dispatcher.held_keys().is_empty());
}

#[test]
fn pausing_releases_held_modifier() {
    let (pipeline, software) = software_pipeline();
    feed(&pipeline, &[(0.0, vec![(1, SHIFT, Touching)])]);
    assert!(software.wait_for(1, WAIT));

    pipeline.set_listening(false);
    assert_eq!(
        software.events(),
        vec![(KeyId::Shift, true), (KeyId::Shift, false)]
    );
    assert!(pipeline.stats().held_modifiers.is_empty());

    pipeline.set_listening(true);
    feed(&pipeline, &[(0.5, vec![])]);
    settle(&pipeline, 2);
    assert_eq!(software.len(), 2);
}

#[test]
fn software_preference_ignores_healthy_privileged() {
    let (dispatcher, software, privileged) = privileged_dispatcher();
    dispatcher.set_preference(BackendPreference::Software);

    dispatcher
        .post_key_stroke(KeyId::B.info().code, ModifierFlags::empty())
        .unwrap();
    assert!(privileged.is_empty());
    assert_eq!(software.len(), 2);
}

#[cfg(unix)]
mod daemon {
    use super::*;
    use std::fs;
    use std::os::unix::net::UnixDatagram;
    use std::path::PathBuf;
    use touchpad_keyboard::output::daemon::protocol::decode_request;
    use touchpad_keyboard::output::daemon::{DaemonProtocolClient, DaemonSettings, RequestType};
    use touchpad_keyboard::output::KeyBackend;

    struct Server {
        root: PathBuf,
        socket: UnixDatagram,
        settings: DaemonSettings,
    }

    impl Server {
        fn start(name: &str) -> Self {
            let root = std::env::temp_dir().join(format!(
                "touchpad-keyboard-it-{}-{}",
                std::process::id(),
                name
            ));
            let _ = fs::remove_dir_all(&root);
            let server_dir = root.join("server");
            fs::create_dir_all(&server_dir).unwrap();
            let socket = UnixDatagram::bind(server_dir.join("0001.sock")).unwrap();
            socket.set_read_timeout(Some(WAIT)).unwrap();
            let settings = DaemonSettings {
                server_dir,
                client_dir: root.join("client"),
                ..DaemonSettings::default()
            };
            Self {
                root,
                socket,
                settings,
            }
        }

        fn recv(&self) -> (RequestType, Vec<u8>) {
            let mut buf = [0u8; 256];
            let len = self.socket.recv(&mut buf).unwrap();
            let (kind, payload) = decode_request(&buf[..len]).unwrap();
            (kind, payload.to_vec())
        }
    }

    impl Drop for Server {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    /// First HID usage slot of a keyboard report payload
    fn first_usage(payload: &[u8]) -> u16 {
        u16::from_le_bytes([payload[3], payload[4]])
    }

    #[test]
    fn repeated_key_down_occupies_one_slot() {
        let server = Server::start("idempotent");
        let client = DaemonProtocolClient::connect(&server.settings, None).unwrap();
        let a = KeyId::A.info().code;

        client.post_key(a, ModifierFlags::empty(), true).unwrap();
        client.post_key(a, ModifierFlags::empty(), true).unwrap();
        let report = client.report_snapshot();
        assert_eq!(report.pressed(), 1);
        assert!(report.contains(0x04));

        client.post_key(a, ModifierFlags::empty(), false).unwrap();
        assert_eq!(client.report_snapshot().pressed(), 0);
    }

    #[test]
    fn tap_reaches_daemon_as_reports() {
        let server = Server::start("tap");
        let software = Arc::new(RecordingBackend::new(BackendKind::Software));
        let dispatcher = Arc::new(OutputDispatcher::new(
            software.clone(),
            BackendPreference::Privileged,
        ));
        let client = DaemonProtocolClient::connect(
            &server.settings,
            Some(Arc::clone(dispatcher.selector())),
        )
        .unwrap();
        dispatcher.install_privileged(Arc::new(client));
        dispatcher.selector().apply(HealthEvent::CheckPassed, None);

        let pipeline = Pipeline::start(
            ClassifierParams::default(),
            &LayoutSet::default(),
            Arc::clone(&dispatcher),
            PipelineOptions::default(),
        )
        .unwrap();
        feed(
            &pipeline,
            &[
                (0.0, vec![(1, A, Touching)]),
                (0.05, vec![(1, A, Leaving)]),
            ],
        );

        assert_eq!(server.recv().0, RequestType::KeyboardInitialize);
        let (kind, down) = server.recv();
        assert_eq!(kind, RequestType::PostKeyboardReport);
        assert_eq!(first_usage(&down), 0x04);
        let (_, up) = server.recv();
        assert_eq!(first_usage(&up), 0);
        assert!(software.is_empty());
    }
}
