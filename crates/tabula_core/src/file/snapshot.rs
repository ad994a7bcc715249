//! Tracking of pinned versions.

use crate::types::Version;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Counts the open transactions pinned to each version of a file.
///
/// Every read or write transaction holds a [`SnapshotPin`] for the version it
/// started from. Used for diagnostics: the oldest pinned version is the
/// oldest state some transaction can still observe.
#[derive(Debug, Default)]
pub(crate) struct SnapshotTracker {
    pinned: Mutex<BTreeMap<Version, usize>>,
}

impl SnapshotTracker {
    /// Pins `version` until the returned guard is dropped.
    pub(crate) fn pin(self: &Arc<Self>, version: Version) -> SnapshotPin {
        *self.pinned.lock().entry(version).or_insert(0) += 1;
        SnapshotPin {
            tracker: Arc::clone(self),
            version,
        }
    }

    /// Oldest version with at least one pin.
    pub(crate) fn oldest_pinned(&self) -> Option<Version> {
        self.pinned.lock().keys().next().copied()
    }

    /// Total number of pins.
    pub(crate) fn pinned_count(&self) -> usize {
        self.pinned.lock().values().sum()
    }
}

/// Guard that unpins a version when dropped.
#[derive(Debug)]
pub(crate) struct SnapshotPin {
    tracker: Arc<SnapshotTracker>,
    version: Version,
}

impl Drop for SnapshotPin {
    fn drop(&mut self) {
        let mut pinned = self.tracker.pinned.lock();
        if let Some(count) = pinned.get_mut(&self.version) {
            *count -= 1;
            if *count == 0 {
                pinned.remove(&self.version);
            }
        }
    }
}
