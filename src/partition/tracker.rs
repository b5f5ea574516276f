use std::sync::atomic::{AtomicUsize, Ordering};

/// Wait-group style counter of buckets that have not reached a terminal state.
///
/// Unlike a barrier sized to the initial batch, it can grow while work is in
/// flight: a split adds its children before retiring the parent, so the count
/// only reaches zero once every transitively spawned bucket is done.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    pending: AtomicUsize,
    retired: AtomicUsize,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, count: usize) {
        self.pending.fetch_add(count, Ordering::AcqRel);
    }

    /// Retire one bucket.
    pub fn done(&self) {
        let previous = self.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "completion tracker underflow");
        self.retired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Buckets retired so far, counting split parents as well as leaves.
    pub fn retired(&self) -> usize {
        self.retired.load(Ordering::Relaxed)
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }
}
