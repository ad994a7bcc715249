//! Commit log: the persisted form of a database file.
//!
//! ## Record Format
//!
//! ```text
//! | magic "TBLG" (4) | format (2) | type (1) | length (4) | CBOR payload (N) | crc32 (4) |
//! ```
//!
//! A `Commit` record holds the ops of one write transaction and the version it
//! produced. A `Snapshot` record holds the whole group at one version and is
//! written by compaction and by `write_copy_to`.
//!
//! ## Recovery Policy
//!
//! Tolerated (clean end of log, tail is truncated):
//! - truncated header or payload from a crash mid-append
//! - zero-filled tail left by pre-allocation
//!
//! Fatal (open fails):
//! - CRC mismatch, bad magic, unknown record type, future format version
//! - a version that does not increase, or an op that cannot be replayed

mod iterator;
mod record;
mod writer;

pub use record::{compute_crc32, LogRecordKind};
pub(crate) use record::encode_snapshot;
pub(crate) use writer::{CommitLog, Recovered};

use crate::error::{CoreError, CoreResult};
use crate::types::Version;
use iterator::LogIterator;
use record::LogRecord;
use std::path::Path;
use tabula_storage::FileBackend;

/// Summary of one record, for inspection tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecordInfo {
    /// Byte offset of the record.
    pub offset: u64,
    /// Encoded length including envelope.
    pub len: usize,
    /// Record type.
    pub kind: LogRecordKind,
    /// Version the record produces.
    pub version: Version,
    /// Number of ops (commits only).
    pub ops: usize,
    /// Number of tables (snapshots only).
    pub tables: usize,
}

/// Result of scanning a log file without opening it as a database.
#[derive(Debug, Clone, Default)]
pub struct LogReport {
    /// Every readable record, in order.
    pub records: Vec<LogRecordInfo>,
    /// Offset just past the last readable record.
    pub valid_bytes: u64,
    /// File size.
    pub total_bytes: u64,
    /// The error that stopped the scan, if any.
    pub error: Option<String>,
}

impl LogReport {
    /// Whether every byte of the file belongs to a valid record.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.valid_bytes == self.total_bytes
    }

    /// Latest version in the log.
    #[must_use]
    pub fn last_version(&self) -> Option<Version> {
        self.records.last().map(|r| r.version)
    }
}

/// Scans the log at `path` and reports its records.
///
/// Corruption is reported in [`LogReport::error`], not returned as an error.
/// The file is not modified.
pub fn inspect_log(path: &Path) -> CoreResult<LogReport> {
    if !path.is_file() {
        return Err(CoreError::cannot_open(path, "file does not exist"));
    }
    let backend = FileBackend::open(path)?;
    let mut iter = LogIterator::new(&backend)?;
    let mut report = LogReport {
        total_bytes: iter.total_size(),
        ..LogReport::default()
    };
    for item in iter.by_ref() {
        match item {
            Ok((offset, len, record)) => {
                let (ops, tables) = match &record {
                    LogRecord::Commit { ops, .. } => (ops.len(), 0),
                    LogRecord::Snapshot { group, .. } => (0, group.tables.len()),
                };
                report.records.push(LogRecordInfo {
                    offset,
                    len,
                    kind: record.kind(),
                    version: record.version(),
                    ops,
                    tables,
                });
            }
            Err(e) => report.error = Some(e.to_string()),
        }
    }
    report.valid_bytes = iter.valid_end();
    Ok(report)
}
