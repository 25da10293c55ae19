use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// Cooperative-yield primitive used by long running transfers.
pub trait TaskYield: Send + Sync {
    /// Marks the end of a measured execution span.
    fn perf_exit(&self, marker: u32);

    /// Marks the start of a measured execution span.
    fn perf_entry(&self, marker: u32);

    /// Suspends the calling task for a bounded time.
    fn delay(&self, millis: u32);
}

/// Sleeps the current thread and emits perf markers as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadYield;

impl TaskYield for ThreadYield {
    fn perf_exit(&self, marker: u32) {
        tracing::trace!(perf_marker = marker, "perf exit");
    }

    fn perf_entry(&self, marker: u32) {
        tracing::trace!(perf_marker = marker, "perf entry");
    }

    fn delay(&self, millis: u32) {
        thread::sleep(Duration::from_millis(u64::from(millis)));
    }
}

/// Counts yields without sleeping.
#[derive(Debug, Default)]
pub struct RecordingYield {
    exits: AtomicU64,
    entries: AtomicU64,
    delays: AtomicU64,
    delayed_ms: AtomicU64,
}

impl RecordingYield {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> u64 {
        self.delays.load(Ordering::Relaxed)
    }

    pub fn delayed_ms(&self) -> u64 {
        self.delayed_ms.load(Ordering::Relaxed)
    }

    /// Number of complete exit/entry marker pairs.
    pub fn marker_pairs(&self) -> u64 {
        self.exits
            .load(Ordering::Relaxed)
            .min(self.entries.load(Ordering::Relaxed))
    }
}

impl TaskYield for RecordingYield {
    fn perf_exit(&self, _marker: u32) {
        self.exits.fetch_add(1, Ordering::Relaxed);
    }

    fn perf_entry(&self, _marker: u32) {
        self.entries.fetch_add(1, Ordering::Relaxed);
    }

    fn delay(&self, millis: u32) {
        self.delays.fetch_add(1, Ordering::Relaxed);
        self.delayed_ms
            .fetch_add(u64::from(millis), Ordering::Relaxed);
    }
}
