//! Non-blocking multi-subscriber frame fan-out
//!
//! Each subscriber owns a small bounded queue. When a queue is full the oldest
//! queued frame is released back to the pool and the new one takes its place;
//! the producer never waits on a slow subscriber.

use super::FrameRef;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Subscriber {
    id: u64,
    tx: Sender<FrameRef>,
    /// Bus-side handle on the same queue, used to evict the oldest frame
    evict: Receiver<FrameRef>,
}

/// Fan-out of published frames to every subscriber
pub struct FrameBus {
    subscribers: Mutex<Vec<Subscriber>>,
    capacity: usize,
    next_id: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl FrameBus {
    /// `capacity` frames are buffered per subscriber (at least one)
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = channel::bounded(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push(Subscriber {
            id,
            tx,
            evict: rx.clone(),
        });
        log::debug!("frame bus subscriber {} attached", id);
        Subscription {
            id,
            rx,
            bus: Arc::clone(self),
            closed: false,
        }
    }

    /// Deliver `frame` to every subscriber, consuming the publisher's claim
    pub fn publish(&self, frame: FrameRef) {
        self.published.fetch_add(1, Ordering::Relaxed);
        {
            let subscribers = self.subscribers.lock();
            for subscriber in subscribers.iter() {
                self.offer(subscriber, frame.clone());
            }
        }
        frame.release();
    }

    fn offer(&self, subscriber: &Subscriber, frame: FrameRef) {
        let mut pending = frame;
        loop {
            match subscriber.tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(frame)) => {
                    // Publishers are serialized by the subscriber lock, so
                    // evicting one frame always makes room.
                    if let Ok(oldest) = subscriber.evict.try_recv() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        oldest.release();
                    }
                    pending = frame;
                }
                Err(TrySendError::Disconnected(frame)) => {
                    frame.release();
                    return;
                }
            }
        }
    }

    fn remove(&self, id: u64) {
        let removed = {
            let mut subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .position(|s| s.id == id)
                .map(|index| subscribers.swap_remove(index))
        };
        if let Some(subscriber) = removed {
            while let Ok(frame) = subscriber.evict.try_recv() {
                frame.release();
            }
            log::debug!("frame bus subscriber {} detached", id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Frames published since creation
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Stale frames evicted from full subscriber queues
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// A subscriber's view of the bus.
///
/// Every received frame must be released by the receiver. Unsubscribing
/// (explicitly or on drop) releases anything still queued.
pub struct Subscription {
    id: u64,
    rx: Receiver<FrameRef>,
    bus: Arc<FrameBus>,
    closed: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the next frame arrives
    pub fn recv(&self) -> Option<FrameRef> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<FrameRef> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<FrameRef> {
        match self.rx.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Underlying receiver, for `select!`
    pub fn receiver(&self) -> &Receiver<FrameRef> {
        &self.rx
    }

    /// Frames currently queued for this subscriber
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Detach from the bus and release queued frames
    pub fn unsubscribe(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.bus.remove(self.id);
        while let Ok(frame) = self.rx.try_recv() {
            frame.release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::touch::FramePool;

    fn publish_seq(pool: &Arc<FramePool>, bus: &FrameBus, sequence: u64) {
        let mut builder = pool.acquire(2);
        builder.frame_mut().sequence = sequence;
        bus.publish(builder.into_shared());
    }

    #[test]
    fn every_subscriber_sees_every_frame() {
        let pool = FramePool::new(2);
        let bus = FrameBus::new(4);
        let a = bus.subscribe();
        let b = bus.subscribe();

        publish_seq(&pool, &bus, 1);
        publish_seq(&pool, &bus, 2);

        for sub in [&a, &b] {
            let first = sub.try_recv().unwrap();
            assert_eq!(first.sequence, 1);
            first.release();
            let second = sub.try_recv().unwrap();
            assert_eq!(second.sequence, 2);
            second.release();
        }
        assert_eq!(pool.stats().in_flight(), 0);
    }

    #[test]
    fn full_queue_drops_oldest_not_newest() {
        let pool = FramePool::new(2);
        let bus = FrameBus::new(2);
        let sub = bus.subscribe();

        for sequence in 1..=5 {
            publish_seq(&pool, &bus, sequence);
        }

        let sequences: Vec<u64> = std::iter::from_fn(|| sub.try_recv())
            .map(|frame| {
                let sequence = frame.sequence;
                frame.release();
                sequence
            })
            .collect();
        assert_eq!(sequences, vec![4, 5]);
        assert_eq!(bus.dropped(), 3);
        assert_eq!(pool.stats().in_flight(), 0);
        assert_eq!(pool.stats().leaked, 0);
    }

    #[test]
    fn slow_subscriber_does_not_affect_fast_one() {
        let pool = FramePool::new(2);
        let bus = FrameBus::new(1);
        let slow = bus.subscribe();
        let fast = bus.subscribe();

        for sequence in 1..=3 {
            publish_seq(&pool, &bus, sequence);
            let frame = fast.try_recv().unwrap();
            assert_eq!(frame.sequence, sequence);
            frame.release();
        }
        let frame = slow.try_recv().unwrap();
        assert_eq!(frame.sequence, 3);
        frame.release();
    }

    #[test]
    fn publish_without_subscribers_returns_frame() {
        let pool = FramePool::new(2);
        let bus = FrameBus::new(2);
        publish_seq(&pool, &bus, 1);
        assert_eq!(pool.stats().available, 1);
        assert_eq!(bus.published(), 1);
    }

    #[test]
    fn unsubscribe_releases_queued_frames() {
        let pool = FramePool::new(2);
        let bus = FrameBus::new(4);
        let sub = bus.subscribe();
        publish_seq(&pool, &bus, 1);
        publish_seq(&pool, &bus, 2);
        assert_eq!(pool.stats().in_flight(), 2);

        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(pool.stats().in_flight(), 0);
        assert_eq!(pool.stats().leaked, 0);
    }
}
