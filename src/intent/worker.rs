//! Sequential classifier worker
//!
//! The classifier is owned by a single thread that multiplexes frames from
//! its bus subscription with control commands. Nothing else ever touches the
//! active-touch table.

use super::{ClassifierStats, IntentClassifier};
use crate::keyboard::{KeyBindingMap, KeyCode};
use crate::touch::{DeviceSlot, Subscription};
use crossbeam::channel::{self, select, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long control calls wait for the worker to acknowledge
const ACK_TIMEOUT: Duration = Duration::from_secs(1);

enum Command {
    UpdateLayout(DeviceSlot, KeyBindingMap),
    Cancel(Sender<()>),
    Stop,
}

/// What the worker last reported about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSnapshot {
    pub stats: ClassifierStats,
    pub active_touches: usize,
    pub held_modifiers: Vec<u16>,
}

/// Handle on the classifier thread
pub struct ClassifierWorker {
    commands: Sender<Command>,
    snapshot: Arc<Mutex<WorkerSnapshot>>,
    handle: Option<JoinHandle<()>>,
}

impl ClassifierWorker {
    pub fn spawn(classifier: IntentClassifier, frames: Subscription) -> io::Result<Self> {
        let (commands, command_rx) = channel::unbounded();
        let snapshot = Arc::new(Mutex::new(WorkerSnapshot::default()));
        let shared = Arc::clone(&snapshot);

        let handle = thread::Builder::new()
            .name("intent-classifier".into())
            .spawn(move || run(classifier, frames, command_rx, shared))?;

        Ok(Self {
            commands,
            snapshot,
            handle: Some(handle),
        })
    }

    /// Swap the binding map for a slot. Takes effect before the next frame.
    pub fn update_layout(&self, slot: DeviceSlot, map: KeyBindingMap) {
        if self.commands.send(Command::UpdateLayout(slot, map)).is_err() {
            log::warn!("classifier worker is gone, layout update dropped");
        }
    }

    /// Drop queued frames, release held modifiers and forget every contact.
    ///
    /// Returns once the worker has sent the key-ups, or false if it did not
    /// answer in time.
    pub fn cancel(&self) -> bool {
        let (ack, done) = channel::bounded(1);
        if self.commands.send(Command::Cancel(ack)).is_err() {
            return false;
        }
        done.recv_timeout(ACK_TIMEOUT).is_ok()
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        self.snapshot.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel all contacts and join the thread
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.commands.send(Command::Stop);
        if handle.join().is_err() {
            log::error!("classifier worker panicked");
        }
    }
}

impl Drop for ClassifierWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    mut classifier: IntentClassifier,
    frames: Subscription,
    commands: Receiver<Command>,
    snapshot: Arc<Mutex<WorkerSnapshot>>,
) {
    log::debug!("classifier worker started");
    loop {
        select! {
            recv(frames.receiver()) -> msg => match msg {
                Ok(frame) => {
                    classifier.process_frame(&frame);
                    frame.release();
                }
                Err(_) => {
                    classifier.cancel_all();
                    break;
                }
            },
            recv(commands) -> msg => match msg {
                Ok(Command::UpdateLayout(slot, map)) => classifier.set_layout(slot, map),
                Ok(Command::Cancel(ack)) => {
                    // Queued frames predate the cancel; never classify them
                    while let Some(frame) = frames.try_recv() {
                        frame.release();
                    }
                    classifier.cancel_all();
                    let _ = ack.send(());
                }
                Ok(Command::Stop) | Err(_) => {
                    classifier.cancel_all();
                    publish(&classifier, &snapshot);
                    break;
                }
            },
        }
        publish(&classifier, &snapshot);
    }
    frames.unsubscribe();
    log::debug!("classifier worker stopped");
}

fn publish(classifier: &IntentClassifier, snapshot: &Mutex<WorkerSnapshot>) {
    let mut snapshot = snapshot.lock();
    snapshot.stats = classifier.stats();
    snapshot.active_touches = classifier.active_touches();
    snapshot.held_modifiers = classifier
        .held_modifiers()
        .into_iter()
        .map(|code| code.as_u16())
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::ClassifierParams;
    use crate::keyboard::{KeyId, KeyLayout};
    use crate::testing::RecordingSink;
    use crate::touch::{ContactState, FrameBus, FramePool, RawTouch};

    fn publish_touch(pool: &Arc<FramePool>, bus: &FrameBus, timestamp: f64, state: ContactState) {
        let mut builder = pool.acquire(4);
        let frame = builder.frame_mut();
        frame.device_id = 1;
        frame.timestamp = timestamp;
        frame.touches.push(RawTouch::new(1, 0.5, 0.5, state));
        bus.publish(builder.into_shared());
    }

    #[test]
    fn worker_classifies_published_frames() {
        let pool = FramePool::new(4);
        let bus = FrameBus::new(8);
        let sink = Arc::new(RecordingSink::new());
        let mut classifier = IntentClassifier::new(ClassifierParams::default(), sink.clone());
        classifier.set_layout(
            DeviceSlot::Left,
            KeyBindingMap::build(&KeyLayout::grid(&[&["Shift"]])),
        );
        let mut worker = ClassifierWorker::spawn(classifier, bus.subscribe()).unwrap();

        publish_touch(&pool, &bus, 0.0, ContactState::Touching);
        assert!(sink.wait_for(1, Duration::from_secs(2)));
        assert_eq!(sink.events(), vec![(KeyId::Shift, true)]);

        // Stop releases the held modifier before the thread exits
        worker.stop();
        assert_eq!(
            sink.events(),
            vec![(KeyId::Shift, true), (KeyId::Shift, false)]
        );
        assert_eq!(worker.snapshot().active_touches, 0);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(pool.stats().in_flight(), 0);
    }

    #[test]
    fn cancel_is_acknowledged() {
        let bus = FrameBus::new(2);
        let sink = Arc::new(RecordingSink::new());
        let worker = ClassifierWorker::spawn(
            IntentClassifier::new(ClassifierParams::default(), sink),
            bus.subscribe(),
        )
        .unwrap();
        assert!(worker.cancel());
        assert!(worker.is_running());
    }
}
