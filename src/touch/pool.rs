//! Reusable frame buffers
//!
//! Frames move through three phases: a [`FrameBuilder`] owned by the producer,
//! then any number of [`FrameRef`] holders sharing it read-only, then back to
//! the pool. The return happens exactly once, in [`FrameRef::release`] by
//! whichever holder is last. A last holder that is dropped without releasing
//! is counted as a leak and its buffer is not recycled.

use super::TouchFrame;
use parking_lot::Mutex;
use serde::Serialize;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

struct FrameCell {
    holders: AtomicUsize,
    frame: TouchFrame,
}

impl FrameCell {
    fn new(capacity: usize) -> Self {
        Self {
            holders: AtomicUsize::new(1),
            frame: TouchFrame::with_capacity(capacity),
        }
    }
}

impl Clone for FrameCell {
    fn clone(&self) -> Self {
        Self {
            holders: AtomicUsize::new(1),
            frame: self.frame.clone(),
        }
    }
}

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Buffers ever allocated
    pub allocated: usize,
    /// Buffers sitting in the free list
    pub available: usize,
    /// Acquisitions served from the free list
    pub reused: u64,
    /// Buffers lost to a missing release
    pub leaked: usize,
}

impl PoolStats {
    /// Buffers currently held by producers or subscribers
    pub fn in_flight(&self) -> usize {
        self.allocated
            .saturating_sub(self.available)
            .saturating_sub(self.leaked)
    }
}

/// Pool of frame buffers shared by all frame sources
pub struct FramePool {
    free: Mutex<Vec<Arc<FrameCell>>>,
    default_capacity: usize,
    allocated: AtomicUsize,
    reused: AtomicU64,
    leaked: AtomicUsize,
}

impl FramePool {
    /// Create an empty pool; buffers are allocated on demand
    pub fn new(default_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
            default_capacity,
            allocated: AtomicUsize::new(0),
            reused: AtomicU64::new(0),
            leaked: AtomicUsize::new(0),
        })
    }

    /// Hand out an empty frame with room for at least `min_capacity` touches.
    ///
    /// Reuses a released buffer when one is available and allocates only when
    /// the free list is exhausted.
    pub fn acquire(self: &Arc<Self>, min_capacity: usize) -> FrameBuilder {
        let recycled = {
            let mut free = self.free.lock();
            // A just-released cell can still be shared for an instant
            free.iter()
                .rposition(|cell| Arc::strong_count(cell) == 1)
                .map(|index| free.swap_remove(index))
        };

        let mut cell = match recycled {
            Some(cell) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                cell
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Arc::new(FrameCell::new(min_capacity.max(self.default_capacity)))
            }
        };

        let inner = Arc::make_mut(&mut cell);
        *inner.holders.get_mut() = 1;
        inner.frame.reset(min_capacity);

        FrameBuilder {
            cell,
            pool: Arc::clone(self),
            finished: false,
        }
    }

    fn recycle(&self, cell: Arc<FrameCell>) {
        self.free.lock().push(cell);
    }

    fn note_leak(&self, sequence: u64) {
        self.leaked.fetch_add(1, Ordering::Relaxed);
        log::warn!("frame {} dropped without release; buffer not recycled", sequence);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            available: self.free.lock().len(),
            reused: self.reused.load(Ordering::Relaxed),
            leaked: self.leaked.load(Ordering::Relaxed),
        }
    }
}

/// Exclusive, writable frame owned by its producer until published
pub struct FrameBuilder {
    cell: Arc<FrameCell>,
    pool: Arc<FramePool>,
    finished: bool,
}

impl FrameBuilder {
    pub fn frame(&self) -> &TouchFrame {
        &self.cell.frame
    }

    pub fn frame_mut(&mut self) -> &mut TouchFrame {
        // Never cloned: the builder is the only holder of this cell
        &mut Arc::make_mut(&mut self.cell).frame
    }

    /// Freeze the frame into a shareable reference with one holder
    pub fn into_shared(mut self) -> FrameRef {
        self.finished = true;
        FrameRef {
            cell: Arc::clone(&self.cell),
            pool: Arc::clone(&self.pool),
            released: false,
        }
    }

    /// Give the buffer back without publishing it
    pub fn discard(mut self) {
        self.finished = true;
        self.pool.recycle(Arc::clone(&self.cell));
    }
}

impl Drop for FrameBuilder {
    fn drop(&mut self) {
        if !self.finished {
            self.pool.note_leak(self.cell.frame.sequence);
        }
    }
}

/// Shared read-only handle to a published frame
pub struct FrameRef {
    cell: Arc<FrameCell>,
    pool: Arc<FramePool>,
    released: bool,
}

impl FrameRef {
    /// Drop this holder's claim on the frame.
    ///
    /// Returns `true` when this was the last holder and the buffer went back
    /// to the pool.
    pub fn release(mut self) -> bool {
        self.released = true;
        let last = self.cell.holders.fetch_sub(1, Ordering::AcqRel) == 1;
        if last {
            self.pool.recycle(Arc::clone(&self.cell));
        }
        last
    }

    /// Current number of holders
    pub fn holders(&self) -> usize {
        self.cell.holders.load(Ordering::Acquire)
    }
}

impl Clone for FrameRef {
    fn clone(&self) -> Self {
        self.cell.holders.fetch_add(1, Ordering::Relaxed);
        Self {
            cell: Arc::clone(&self.cell),
            pool: Arc::clone(&self.pool),
            released: false,
        }
    }
}

impl Deref for FrameRef {
    type Target = TouchFrame;

    fn deref(&self) -> &TouchFrame {
        &self.cell.frame
    }
}

impl Drop for FrameRef {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if self.cell.holders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.pool.note_leak(self.cell.frame.sequence);
        }
    }
}

impl std::fmt::Debug for FrameRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRef")
            .field("frame", &self.cell.frame)
            .field("holders", &self.holders())
            .finish()
    }
}
