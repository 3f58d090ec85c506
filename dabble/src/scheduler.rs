use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Coalesces redraw requests: any number of requests between two refresh ticks yield one redraw.
#[derive(Default, Debug)]
pub struct RedrawScheduler {
    pending: AtomicBool,
    requests: AtomicU64,
    redraws: AtomicU64,
}
impl RedrawScheduler {
    /// Ask for a redraw on the next tick. Returns false if one was already pending.
    pub fn request(&self) -> bool {
        self.requests.fetch_add(1, Ordering::Relaxed);
        !self.pending.swap(true, Ordering::AcqRel)
    }
    /// Consume the pending request, if any. Called once per refresh tick.
    pub fn take(&self) -> bool {
        let pending = self.pending.swap(false, Ordering::AcqRel);
        if pending {
            self.redraws.fetch_add(1, Ordering::Relaxed);
        }
        pending
    }
    /// Total requests and redraws granted so far.
    #[must_use]
    pub fn stats(&self) -> (u64, u64) {
        (
            self.requests.load(Ordering::Relaxed),
            self.redraws.load(Ordering::Relaxed),
        )
    }
}
