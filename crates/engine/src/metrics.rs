//! Operation counters
//!
//! The counters use Relaxed ordering: they are observational and do not
//! synchronize any other memory operations.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a ModuleStore
#[derive(Debug, Default)]
pub struct StoreMetrics {
    writes: AtomicU64,
    recomputations: AtomicU64,
    publishes: AtomicU64,
    unpublishes: AtomicU64,
    exports: AtomicU64,
}

/// Point-in-time copy of [`StoreMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Mutating calls that changed a course
    pub writes: u64,
    /// Derived-metadata recomputation passes
    pub recomputations: u64,
    /// Successful publish calls
    pub publishes: u64,
    /// Successful unpublish calls
    pub unpublishes: u64,
    /// OLX exports written
    pub exports: u64,
}

impl StoreMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recomputation(&self) {
        self.recomputations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_publish(&self) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unpublish(&self) {
        self.unpublishes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_export(&self) {
        self.exports.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            writes: self.writes.load(Ordering::Relaxed),
            recomputations: self.recomputations.load(Ordering::Relaxed),
            publishes: self.publishes.load(Ordering::Relaxed),
            unpublishes: self.unpublishes.load(Ordering::Relaxed),
            exports: self.exports.load(Ordering::Relaxed),
        }
    }
}
