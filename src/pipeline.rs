//! The pipeline context object
//!
//! Owns everything between the platform callback and the output dispatcher,
//! constructed once and handed to whoever needs it. There are no process-wide
//! singletons.

use crate::error::{AcquisitionError, LayoutError};
use crate::intent::{ClassifierParams, ClassifierStats, ClassifierWorker, IntentClassifier};
use crate::keyboard::{KeyBindingMap, KeyLayout, LayoutSet};
use crate::output::{BackendStatus, DispatchStats, KeySink, OutputDispatcher};
use crate::touch::{
    DeviceHandle, DeviceIdentity, DeviceSlot, FrameBus, FramePool, FrameSource, PoolStats,
    RawTouch, SlotEntry, SourceStats, Subscription,
};
use serde::Serialize;
use std::io;
use std::sync::Arc;

/// Sizing and device selection for a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Frames buffered per bus subscriber before the oldest is dropped
    pub subscriber_capacity: usize,
    /// Touch capacity of pooled frames
    pub frame_capacity: usize,
    /// Ordered active devices; empty accepts all
    pub active_devices: Vec<u64>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            subscriber_capacity: 2,
            frame_capacity: 16,
            active_devices: Vec::new(),
        }
    }
}

/// Point-in-time view of every counter in the pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStats {
    pub listening: bool,
    pub pool: PoolStats,
    pub frames_published: u64,
    pub frames_dropped: u64,
    pub subscribers: usize,
    pub source: SourceStats,
    pub classifier: ClassifierStats,
    pub active_touches: usize,
    pub held_modifiers: Vec<u16>,
    pub dispatch: DispatchStats,
    pub backend: BackendStatus,
    pub slots: [SlotEntry; 2],
}

/// Frame acquisition, classification and output, wired together
pub struct Pipeline {
    pool: Arc<FramePool>,
    bus: Arc<FrameBus>,
    devices: Arc<DeviceIdentity>,
    source: Arc<FrameSource>,
    dispatcher: Arc<OutputDispatcher>,
    worker: ClassifierWorker,
}

impl Pipeline {
    /// Build the pipeline and start the classifier worker
    pub fn start(
        params: ClassifierParams,
        layouts: &LayoutSet,
        dispatcher: Arc<OutputDispatcher>,
        options: PipelineOptions,
    ) -> io::Result<Self> {
        let pool = FramePool::new(options.frame_capacity);
        let bus = FrameBus::new(options.subscriber_capacity);
        let devices = Arc::new(DeviceIdentity::new());
        if !options.active_devices.is_empty() {
            devices.pin(&options.active_devices);
        }
        let source = Arc::new(FrameSource::new(
            Arc::clone(&pool),
            Arc::clone(&bus),
            Arc::clone(&devices),
            options.frame_capacity,
        ));

        let sink: Arc<dyn KeySink> = dispatcher.clone();
        let mut classifier = IntentClassifier::new(params, sink);
        for slot in DeviceSlot::ALL {
            classifier.set_layout(slot, build_map(slot, layouts.for_slot(slot)));
        }
        let worker = ClassifierWorker::spawn(classifier, bus.subscribe())?;

        log::info!(
            "pipeline started: {} frames/subscriber, {} touches/frame",
            options.subscriber_capacity,
            options.frame_capacity
        );

        Ok(Self {
            pool,
            bus,
            devices,
            source,
            dispatcher,
            worker,
        })
    }

    /// Sensor callback entry point, safe to call from any thread
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
        self.source.on_callback(handle, touches, timestamp, sequence)
    }

    /// The frame source, for platform reader threads
    pub fn source(&self) -> &Arc<FrameSource> {
        &self.source
    }

    pub fn dispatcher(&self) -> &Arc<OutputDispatcher> {
        &self.dispatcher
    }

    pub fn devices(&self) -> &Arc<DeviceIdentity> {
        &self.devices
    }

    /// An extra bus subscriber (visualization, recording, ...)
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Rebuild a slot's bindings and hand them to the classifier.
    ///
    /// Returns the keys that could not be bound.
    pub fn update_layout(&self, slot: DeviceSlot, layout: &KeyLayout) -> Vec<LayoutError> {
        let map = build_map(slot, layout);
        let errors = map.errors().to_vec();
        self.worker.update_layout(slot, map);
        errors
    }

    /// Apply a new active device set.
    ///
    /// Held modifiers are released before frames from the new set are
    /// classified.
    pub fn set_active_devices(&self, ids: &[u64]) {
        self.devices.pin(ids);
        if !self.worker.cancel() {
            log::warn!("classifier did not acknowledge device change");
        }
    }

    /// Start or stop accepting callbacks. Pausing releases held modifiers.
    pub fn set_listening(&self, listening: bool) {
        let was_listening = self.source.is_listening();
        self.source.set_listening(listening);
        if was_listening && !listening && !self.worker.cancel() {
            log::warn!("classifier did not acknowledge pause");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.source.is_listening()
    }

    pub fn stats(&self) -> PipelineStats {
        let worker = self.worker.snapshot();
        PipelineStats {
            listening: self.source.is_listening(),
            pool: self.pool.stats(),
            frames_published: self.bus.published(),
            frames_dropped: self.bus.dropped(),
            subscribers: self.bus.subscriber_count(),
            source: self.source.stats(),
            classifier: worker.stats,
            active_touches: worker.active_touches,
            held_modifiers: worker.held_modifiers,
            dispatch: self.dispatcher.stats(),
            backend: self.dispatcher.status(),
            slots: self.devices.slots(),
        }
    }

    /// Stop accepting frames, release held modifiers and join the worker
    pub fn stop(&mut self) {
        if !self.worker.is_running() {
            return;
        }
        self.source.set_listening(false);
        self.worker.stop();
        log::info!("pipeline stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_map(slot: DeviceSlot, layout: &KeyLayout) -> KeyBindingMap {
    let map = KeyBindingMap::build(layout);
    for error in map.errors() {
        log::warn!("{} layout: {}", slot.name(), error);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::KeyId;
    use crate::output::{BackendKind, BackendPreference};
    use crate::testing::{touch, RecordingBackend};
    use crate::touch::ContactState::*;
    use std::time::Duration;

    fn pipeline() -> (Pipeline, Arc<RecordingBackend>) {
        let software = Arc::new(RecordingBackend::new(BackendKind::Software));
        let dispatcher = Arc::new(OutputDispatcher::new(
            software.clone(),
            BackendPreference::Software,
        ));
        let layouts = LayoutSet {
            left: KeyLayout::grid(&[&["Shift", "A"]]),
            right: KeyLayout::grid(&[&["B"]]),
        };
        let pipeline = Pipeline::start(
            ClassifierParams::default(),
            &layouts,
            dispatcher,
            PipelineOptions {
                subscriber_capacity: 8,
                ..PipelineOptions::default()
            },
        )
        .unwrap();
        (pipeline, software)
    }

    #[test]
    fn tap_flows_to_backend() {
        let (pipeline, software) = pipeline();
        pipeline
            .on_callback(&1u64, &[touch(1, (0.75, 0.5), Touching)], 0.0, 1)
            .unwrap();
        pipeline
            .on_callback(&1u64, &[touch(1, (0.75, 0.5), Leaving)], 0.05, 2)
            .unwrap();

        assert!(software.wait_for(2, Duration::from_secs(2)));
        assert_eq!(software.events(), vec![(KeyId::A, true), (KeyId::A, false)]);
    }

    #[test]
    fn second_device_uses_right_layout() {
        let (pipeline, software) = pipeline();
        pipeline.on_callback(&1u64, &[], 0.0, 1).unwrap();
        pipeline
            .on_callback(&2u64, &[touch(1, (0.5, 0.5), Touching)], 0.0, 1)
            .unwrap();
        pipeline
            .on_callback(&2u64, &[touch(1, (0.5, 0.5), Leaving)], 0.05, 2)
            .unwrap();

        assert!(software.wait_for(2, Duration::from_secs(2)));
        assert_eq!(software.events(), vec![(KeyId::B, true), (KeyId::B, false)]);
    }

    #[test]
    fn stop_releases_held_modifier() {
        let (mut pipeline, software) = pipeline();
        pipeline
            .on_callback(&1u64, &[touch(1, (0.25, 0.5), Touching)], 0.0, 1)
            .unwrap();
        assert!(software.wait_for(1, Duration::from_secs(2)));

        pipeline.stop();
        assert_eq!(
            software.events(),
            vec![(KeyId::Shift, true), (KeyId::Shift, false)]
        );
        assert!(!pipeline.is_listening());
        assert_eq!(pipeline.stats().pool.in_flight(), 0);
    }

    #[test]
    fn device_change_releases_held_modifier() {
        let (pipeline, software) = pipeline();
        pipeline
            .on_callback(&1u64, &[touch(1, (0.25, 0.5), Touching)], 0.0, 1)
            .unwrap();
        assert!(software.wait_for(1, Duration::from_secs(2)));

        pipeline.set_active_devices(&[3]);
        assert_eq!(
            software.events(),
            vec![(KeyId::Shift, true), (KeyId::Shift, false)]
        );
        assert_eq!(
            pipeline.on_callback(&1u64, &[], 0.1, 2),
            Err(AcquisitionError::InactiveDevice(1))
        );
    }

    #[test]
    fn pause_releases_held_modifier() {
        let (pipeline, software) = pipeline();
        pipeline
            .on_callback(&1u64, &[touch(1, (0.25, 0.5), Touching)], 0.0, 1)
            .unwrap();
        assert!(software.wait_for(1, Duration::from_secs(2)));

        pipeline.set_listening(false);
        assert_eq!(
            software.events(),
            vec![(KeyId::Shift, true), (KeyId::Shift, false)]
        );
        assert_eq!(
            pipeline.on_callback(&1u64, &[touch(1, (0.25, 0.5), Leaving)], 0.1, 2),
            Err(AcquisitionError::NotListening)
        );
        assert!(pipeline.stats().held_modifiers.is_empty());

        // Pausing twice sends nothing more
        pipeline.set_listening(false);
        assert_eq!(software.len(), 2);
    }

    #[test]
    fn layout_update_reports_bad_keys() {
        let (pipeline, _software) = pipeline();
        let errors = pipeline.update_layout(DeviceSlot::Left, &KeyLayout::grid(&[&["A", "Nope"]]));
        assert_eq!(errors, vec![LayoutError::UnknownLabel("Nope".into())]);
    }
}
