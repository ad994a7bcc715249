//! File statistics.
//!
//! Counters are shared by every handle on the same file.
//!
//! ```rust,ignore
//! let sg = SharedGroup::open("t.db", Durability::Full, false)?;
//! let stats = sg.stats()?;
//! println!("commits: {}", stats.commits);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Transaction and persistence counters for one file.
///
/// All counters are relaxed atomics and only ever increase.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    reads_begun: AtomicU64,
    writes_begun: AtomicU64,
    implicit_begun: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    advances: AtomicU64,
    promotions: AtomicU64,
    writer_waits: AtomicU64,
    stale_detections: AtomicU64,
    log_bytes_written: AtomicU64,
    compactions: AtomicU64,
}

impl DatabaseStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read_begin(&self) {
        self.reads_begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_begin(&self) {
        self.writes_begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_implicit_begin(&self) {
        self.implicit_begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self, bytes: u64) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.log_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_advance(&self) {
        self.advances.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_writer_wait(&self) {
        self.writer_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale(&self) {
        self.stale_detections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compaction(&self, bytes: u64) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
        self.log_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Returns the number of commits.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Returns the number of stale handle accesses detected.
    pub fn stale_detections(&self) -> u64 {
        self.stale_detections.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            reads_begun: load(&self.reads_begun),
            writes_begun: load(&self.writes_begun),
            implicit_begun: load(&self.implicit_begun),
            commits: load(&self.commits),
            rollbacks: load(&self.rollbacks),
            advances: load(&self.advances),
            promotions: load(&self.promotions),
            writer_waits: load(&self.writer_waits),
            stale_detections: load(&self.stale_detections),
            log_bytes_written: load(&self.log_bytes_written),
            compactions: load(&self.compactions),
            pinned_snapshots: 0,
        }
    }
}

/// A point-in-time copy of [`DatabaseStats`], plus the number of
/// transactions currently pinning a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Explicit read transactions begun.
    pub reads_begun: u64,
    /// Write transactions begun (explicit begin or promotion).
    pub writes_begun: u64,
    /// Implicit transactions begun.
    pub implicit_begun: u64,
    /// Successful commits.
    pub commits: u64,
    /// Rolled back write transactions.
    pub rollbacks: u64,
    /// Read advances that moved to a newer version.
    pub advances: u64,
    /// Promotions of implicit reads to writes.
    pub promotions: u64,
    /// Times a writer had to wait for the write lock.
    pub writer_waits: u64,
    /// Stale handle accesses detected.
    pub stale_detections: u64,
    /// Bytes appended to the commit log.
    pub log_bytes_written: u64,
    /// Log compactions.
    pub compactions: u64,
    /// Transactions holding a snapshot right now. Unlike the counters
    /// above, this goes down again.
    pub pinned_snapshots: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = DatabaseStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_transactions() {
        let stats = DatabaseStats::new();
        stats.record_write_begin();
        stats.record_commit(40);
        stats.record_write_begin();
        stats.record_rollback();
        stats.record_compaction(100);

        let snap = stats.snapshot();
        assert_eq!(snap.writes_begun, 2);
        assert_eq!(snap.commits, 1);
        assert_eq!(snap.rollbacks, 1);
        assert_eq!(snap.log_bytes_written, 140);
        assert_eq!(stats.commits(), 1);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(DatabaseStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.record_stale();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.stale_detections(), 800);
    }
}
