//! # Metrics
//!
//! Counters for monitoring the array engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Default, Debug)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default, Debug)]
struct MetricsInner {
    // Write path
    records_appended: AtomicU64,
    entry_rollovers: AtomicU64,
    inline_applies: AtomicU64,

    // Flush path
    entries_applied: AtomicU64,
    syncs: AtomicU64,

    // Lifecycle
    replayed_records: AtomicU64,
    expansions: AtomicU64,
}

/// Point-in-time view of all counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_appended: u64,
    pub entry_rollovers: u64,
    pub inline_applies: u64,
    pub entries_applied: u64,
    pub syncs: u64,
    pub replayed_records: u64,
    pub expansions: u64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_append(&self) {
        self.inner.records_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollover(&self) {
        self.inner.entry_rollovers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inline_apply(&self) {
        self.inner.inline_applies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entry_applied(&self) {
        self.inner.entries_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sync(&self) {
        self.inner.syncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replayed(&self, records: u64) {
        self.inner.replayed_records.fetch_add(records, Ordering::Relaxed);
    }

    pub fn record_expansion(&self) {
        self.inner.expansions.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_appended: self.inner.records_appended.load(Ordering::Relaxed),
            entry_rollovers: self.inner.entry_rollovers.load(Ordering::Relaxed),
            inline_applies: self.inner.inline_applies.load(Ordering::Relaxed),
            entries_applied: self.inner.entries_applied.load(Ordering::Relaxed),
            syncs: self.inner.syncs.load(Ordering::Relaxed),
            replayed_records: self.inner.replayed_records.load(Ordering::Relaxed),
            expansions: self.inner.expansions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_append();
        metrics.record_append();
        metrics.record_rollover();
        metrics.record_replayed(42);

        let snap = metrics.snapshot();
        assert_eq!(snap.records_appended, 2);
        assert_eq!(snap.entry_rollovers, 1);
        assert_eq!(snap.replayed_records, 42);
        assert_eq!(snap.syncs, 0);
    }
}
