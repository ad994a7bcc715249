//! Append side of the commit log.

use super::iterator::LogIterator;
use super::record::{encode_commit, encode_snapshot, LogRecord};
use crate::config::Durability;
use crate::error::{CoreError, CoreResult};
use crate::group::{GroupData, LogOp};
use crate::types::Version;
use tabula_storage::StorageBackend;
use tracing::{debug, warn};

/// State rebuilt from the log on open.
#[derive(Debug)]
pub(crate) struct Recovered {
    pub(crate) group: GroupData,
    pub(crate) version: Version,
    pub(crate) records: usize,
    /// Bytes cut from the tail (torn write or unused reservation).
    pub(crate) discarded: u64,
}

/// Append-only commit log over one storage backend.
pub(crate) struct CommitLog {
    backend: Box<dyn StorageBackend>,
    durability: Durability,
    unsynced: bool,
}

impl CommitLog {
    pub(crate) fn new(backend: Box<dyn StorageBackend>, durability: Durability) -> Self {
        Self {
            backend,
            durability,
            unsynced: false,
        }
    }

    /// Replays every record and cuts any unusable tail.
    pub(crate) fn recover(&mut self) -> CoreResult<Recovered> {
        let mut group = GroupData::default();
        let mut version = Version::INITIAL;
        let mut records = 0;

        let mut iter = LogIterator::new(self.backend.as_ref())?;
        for item in iter.by_ref() {
            let (offset, _, record) = item?;
            if records > 0 && record.version() <= version {
                return Err(CoreError::log_corruption(format!(
                    "version {} at offset {offset} does not follow {version}",
                    record.version()
                )));
            }
            match record {
                LogRecord::Snapshot { version: v, group: g } => {
                    group = g;
                    version = v;
                }
                LogRecord::Commit { version: v, ops } => {
                    for op in &ops {
                        group.apply(op).map_err(|e| {
                            CoreError::log_corruption(format!(
                                "cannot replay commit {v} at offset {offset}: {e}"
                            ))
                        })?;
                    }
                    version = v;
                }
            }
            records += 1;
        }
        let valid_end = iter.valid_end();
        let total = iter.total_size();

        let discarded = total - valid_end;
        if discarded > 0 {
            warn!(valid_end, discarded, "discarding unusable log tail");
            self.backend.truncate(valid_end)?;
        }
        debug!(records, version = version.as_u64(), "log replayed");
        Ok(Recovered {
            group,
            version,
            records,
            discarded,
        })
    }

    /// Appends one commit and makes it as durable as the policy requires.
    ///
    /// Returns the number of bytes written. On failure the log is cut back
    /// to its previous end, so the failed record is never replayed.
    pub(crate) fn append_commit(&mut self, version: Version, ops: &[LogOp]) -> CoreResult<u64> {
        let data = encode_commit(version, ops)?;
        let start = self.backend.size()?;
        if let Err(e) = self.write_durably(&data) {
            if let Err(cut) = self.backend.truncate(start) {
                warn!(start, error = %cut, "cannot cut failed commit from the log");
            }
            return Err(e);
        }
        Ok(data.len() as u64)
    }

    fn write_durably(&mut self, data: &[u8]) -> CoreResult<()> {
        self.backend.append(data)?;
        match self.durability {
            Durability::Full => {
                self.backend.flush()?;
                self.backend.sync()?;
            }
            Durability::Async => {
                self.backend.flush()?;
                self.unsynced = true;
            }
            Durability::MemOnly => {}
        }
        Ok(())
    }

    /// Replaces the log with one snapshot record.
    ///
    /// Returns the new log size.
    pub(crate) fn compact(&mut self, version: Version, group: &GroupData) -> CoreResult<u64> {
        let data = encode_snapshot(version, group)?;
        self.backend.rewrite(&data)?;
        self.unsynced = false;
        Ok(data.len() as u64)
    }

    /// Syncs deferred writes (only `Async` defers).
    pub(crate) fn sync(&mut self) -> CoreResult<()> {
        if self.unsynced {
            self.backend.sync()?;
            self.unsynced = false;
        }
        Ok(())
    }

    pub(crate) fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    pub(crate) fn reserve(&mut self, bytes: u64) -> CoreResult<u64> {
        Ok(self.backend.reserve(bytes)?)
    }
}
