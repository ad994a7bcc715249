//! The database file shared by every handle opened on the same path.
//!
//! A [`SharedFile`] owns the commit log, the latest committed snapshot, the
//! write lock that serializes writers, and the change feed. Handles hold it
//! through an `Arc`; the process-wide [`crate::Context`] makes sure there is
//! at most one per path.

mod lock;
mod snapshot;

pub(crate) use lock::FileLock;
pub(crate) use snapshot::{SnapshotPin, SnapshotTracker};

use crate::change_feed::{ChangeEvent, ChangeFeed};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::group::{GroupData, LogOp};
use crate::log::CommitLog;
use crate::stats::DatabaseStats;
use crate::types::Version;
use parking_lot::{Condvar, Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabula_storage::{FileBackend, InMemoryBackend, StorageBackend};
use tracing::{debug, info, warn};

/// A committed version and its data.
#[derive(Debug, Clone)]
pub(crate) struct Committed {
    pub(crate) version: Version,
    pub(crate) group: Arc<GroupData>,
}

/// State shared by all handles on one database file.
pub(crate) struct SharedFile {
    path: PathBuf,
    config: Config,
    committed: RwLock<Committed>,
    /// Session id of the current writer.
    writer: Mutex<Option<u64>>,
    writer_released: Condvar,
    log: Mutex<CommitLog>,
    /// Latest version, for [`SharedFile::wait_for_change`].
    changed: Mutex<Version>,
    changed_cv: Condvar,
    pub(crate) feed: ChangeFeed,
    pub(crate) stats: DatabaseStats,
    pub(crate) snapshots: Arc<SnapshotTracker>,
}

impl SharedFile {
    /// Opens the backend for `path` and replays its log.
    pub(crate) fn open(path: PathBuf, config: Config) -> CoreResult<Self> {
        let backend: Box<dyn StorageBackend> = if config.durability.is_persistent() {
            if !path.exists() && !config.create_if_missing {
                return Err(CoreError::cannot_open(&path, "file does not exist"));
            }
            let file = FileBackend::open(&path)
                .map_err(|e| CoreError::cannot_open(&path, e.to_string()))?;
            Box::new(file)
        } else {
            Box::new(InMemoryBackend::new())
        };

        let mut log = CommitLog::new(backend, config.durability);
        let recovered = log.recover()?;
        info!(
            path = %path.display(),
            version = recovered.version.as_u64(),
            records = recovered.records,
            discarded = recovered.discarded,
            durability = ?config.durability,
            "database file opened"
        );

        Ok(Self {
            feed: ChangeFeed::with_max_history(config.history_limit),
            path,
            config,
            committed: RwLock::new(Committed {
                version: recovered.version,
                group: Arc::new(recovered.group),
            }),
            writer: Mutex::new(None),
            writer_released: Condvar::new(),
            log: Mutex::new(log),
            changed: Mutex::new(recovered.version),
            changed_cv: Condvar::new(),
            stats: DatabaseStats::new(),
            snapshots: Arc::new(SnapshotTracker::default()),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// Latest committed version and data.
    pub(crate) fn latest(&self) -> Committed {
        self.committed.read().clone()
    }

    pub(crate) fn current_version(&self) -> Version {
        self.committed.read().version
    }

    /// Blocks until `session` holds the write lock.
    pub(crate) fn acquire_writer(&self, session: u64) {
        let mut owner = self.writer.lock();
        if owner.is_some() {
            self.stats.record_writer_wait();
            debug!(session, "waiting for write lock");
        }
        while owner.is_some() {
            self.writer_released.wait(&mut owner);
        }
        *owner = Some(session);
    }

    /// Takes the write lock if it is free.
    pub(crate) fn try_acquire_writer(&self, session: u64) -> bool {
        let mut owner = self.writer.lock();
        if owner.is_some() {
            return false;
        }
        *owner = Some(session);
        true
    }

    pub(crate) fn release_writer(&self, session: u64) {
        let mut owner = self.writer.lock();
        if *owner == Some(session) {
            *owner = None;
            self.writer_released.notify_one();
        }
    }

    /// Whether any session holds the write lock.
    #[cfg(test)]
    pub(crate) fn has_writer(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Persists and installs a new version. The caller must hold the write lock.
    ///
    /// The log append happens before the new version becomes visible, so a
    /// reader can never observe a version that is not in the log.
    pub(crate) fn publish(
        &self,
        ops: &[LogOp],
        group: GroupData,
        tables: Vec<String>,
    ) -> CoreResult<Committed> {
        let mut log = self.log.lock();
        let version = self.committed.read().version.next();
        let bytes = log.append_commit(version, ops)?;
        let committed = Committed {
            version,
            group: Arc::new(group),
        };
        *self.committed.write() = committed.clone();
        self.stats.record_commit(bytes);

        let max = self.config.max_log_size;
        if max > 0 && log.size().is_ok_and(|size| size > max) {
            if let Err(e) = self.compact_locked(&mut log, &committed) {
                warn!(error = %e, "auto-compaction failed");
            }
        }
        drop(log);

        *self.changed.lock() = version;
        self.changed_cv.notify_all();
        self.feed.emit(ChangeEvent { version, tables });
        Ok(committed)
    }

    /// Rewrites the log as one snapshot of the latest version.
    pub(crate) fn compact(&self) -> CoreResult<u64> {
        let mut log = self.log.lock();
        let committed = self.latest();
        self.compact_locked(&mut log, &committed)
    }

    fn compact_locked(&self, log: &mut CommitLog, committed: &Committed) -> CoreResult<u64> {
        let before = log.size()?;
        let after = log.compact(committed.version, &committed.group)?;
        self.stats.record_compaction(after);
        info!(
            path = %self.path.display(),
            version = committed.version.as_u64(),
            before,
            after,
            "log compacted"
        );
        Ok(after)
    }

    pub(crate) fn sync(&self) -> CoreResult<()> {
        self.log.lock().sync()
    }

    pub(crate) fn reserve(&self, bytes: u64) -> CoreResult<u64> {
        self.log.lock().reserve(bytes)
    }

    pub(crate) fn log_size(&self) -> CoreResult<u64> {
        self.log.lock().size()
    }

    /// Waits until a version newer than `since` is committed.
    ///
    /// Returns `false` on timeout.
    pub(crate) fn wait_for_change(&self, since: Version, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut latest = self.changed.lock();
        while *latest <= since {
            if self
                .changed_cv
                .wait_until(&mut latest, deadline)
                .timed_out()
            {
                return *latest > since;
            }
        }
        true
    }
}

impl Drop for SharedFile {
    fn drop(&mut self) {
        if let Err(e) = self.log.get_mut().sync() {
            warn!(path = %self.path.display(), error = %e, "sync on close failed");
        }
        debug!(path = %self.path.display(), "database file closed");
        crate::context::Context::global().release(&self.path);
    }
}
