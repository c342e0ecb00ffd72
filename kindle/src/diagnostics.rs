//! Frame allocation hooks.
//!
//! Tasks created through [`Task::tracked`](crate::task::Task::tracked)
//! report the layout of their boxed frame to a [`FrameTracker`] when the
//! frame is allocated and again when it is released. The hooks have no
//! behavioural effect on the task.

use std::alloc::Layout;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives allocation events of tracked task frames.
pub trait FrameTracker: Send + Sync {
    /// A frame of `layout` was allocated on behalf of `pool`.
    fn allocated(&self, pool: &'static str, layout: Layout);

    /// A frame previously reported through [`allocated`](Self::allocated)
    /// was released.
    fn deallocated(&self, pool: &'static str, layout: Layout);
}

/// A [`FrameTracker`] keeping running totals.
#[derive(Debug, Default)]
pub struct FrameStats {
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    live_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    pub fn deallocations(&self) -> usize {
        self.deallocations.load(Ordering::Relaxed)
    }

    /// Returns the bytes of frames allocated and not yet released.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Relaxed)
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak_bytes.load(Ordering::Relaxed)
    }
}

impl FrameTracker for FrameStats {
    fn allocated(&self, _pool: &'static str, layout: Layout) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        let live = self.live_bytes.fetch_add(layout.size(), Ordering::Relaxed) + layout.size();
        self.peak_bytes.fetch_max(live, Ordering::Relaxed);
    }

    fn deallocated(&self, _pool: &'static str, layout: Layout) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_sub(layout.size(), Ordering::Relaxed);
    }
}

/// Reports the release of a frame when dropped.
pub(crate) struct FrameGuard {
    tracker: Arc<dyn FrameTracker>,
    pool: &'static str,
    layout: Layout,
}

impl FrameGuard {
    pub(crate) fn new(tracker: Arc<dyn FrameTracker>, pool: &'static str, layout: Layout) -> Self {
        tracker.allocated(pool, layout);
        tracing::trace!(pool, size = layout.size(), "task frame allocated");

        Self {
            tracker,
            pool,
            layout,
        }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        self.tracker.deallocated(self.pool, self.layout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_follow_guards() {
        let stats = Arc::new(FrameStats::new());
        let layout = Layout::from_size_align(64, 8).unwrap();

        let first = FrameGuard::new(stats.clone(), "test", layout);
        let second = FrameGuard::new(stats.clone(), "test", layout);
        assert_eq!(stats.live_bytes(), 128);

        drop(first);
        assert_eq!(stats.live_bytes(), 64);
        drop(second);

        assert_eq!(stats.allocations(), 2);
        assert_eq!(stats.deallocations(), 2);
        assert_eq!(stats.live_bytes(), 0);
        assert_eq!(stats.peak_bytes(), 128);
    }
}
