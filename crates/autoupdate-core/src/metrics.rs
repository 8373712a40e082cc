//! Process-wide atomic counters for update activity.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the controller does this at finalize).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters without allocation or locking.
pub struct Metrics {
    cycles_started: AtomicU64,
    artifacts_staged: AtomicU64,
    retries_scheduled: AtomicU64,
    bytes_downloaded: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            cycles_started: AtomicU64::new(0),
            artifacts_staged: AtomicU64::new(0),
            retries_scheduled: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
        }
    }

    pub fn inc_cycles(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cycles_started", "counter incremented");
    }

    pub fn inc_staged(&self) {
        self.artifacts_staged.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "artifacts_staged", "counter incremented");
    }

    pub fn inc_retries(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "retries_scheduled", "counter incremented");
    }

    /// Add streamed body bytes (counted whether or not the download verifies).
    pub fn add_bytes(&self, n: u64) {
        self.bytes_downloaded.fetch_add(n, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            cycles_started = self.cycles_started(),
            artifacts_staged = self.artifacts_staged(),
            retries_scheduled = self.retries_scheduled(),
            bytes_downloaded = self.bytes_downloaded(),
        );
    }

    pub fn cycles_started(&self) -> u64 {
        self.cycles_started.load(Ordering::Relaxed)
    }

    pub fn artifacts_staged(&self) -> u64 {
        self.artifacts_staged.load(Ordering::Relaxed)
    }

    pub fn retries_scheduled(&self) -> u64 {
        self.retries_scheduled.load(Ordering::Relaxed)
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.cycles_started.store(0, Ordering::Relaxed);
        self.artifacts_staged.store(0, Ordering::Relaxed);
        self.retries_scheduled.store(0, Ordering::Relaxed);
        self.bytes_downloaded.store(0, Ordering::Relaxed);
    }
}
