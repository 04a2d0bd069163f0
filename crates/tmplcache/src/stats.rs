//! Cache counters.
//!
//! Background event handling never surfaces errors to callers, so dropped
//! events and watcher errors are counted here to keep staleness diagnosable.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared between lookups and the event processor.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    disk_reads: AtomicU64,
    events_applied: AtomicU64,
    events_ignored: AtomicU64,
    events_dropped: AtomicU64,
    watch_errors: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Lookups served from memory.
    pub hits: u64,
    /// Lookups that fell through to disk.
    pub disk_reads: u64,
    /// Events that mutated the store or the watch tree.
    pub events_applied: u64,
    /// Events discarded because of the ignore set.
    pub events_ignored: u64,
    /// Events skipped after a stat or read failure.
    pub events_dropped: u64,
    /// Errors reported by the watch mechanism itself.
    pub watch_errors: u64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_read(&self) {
        self.disk_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_watch_error(&self) {
        self.watch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            disk_reads: self.disk_reads.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            watch_errors: self.watch_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_disk_read();
        stats.record_dropped();
        stats.record_watch_error();

        let snap = stats.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.disk_reads, 1);
        assert_eq!(snap.events_dropped, 1);
        assert_eq!(snap.watch_errors, 1);
        assert_eq!(snap.events_applied, 0);
    }
}
