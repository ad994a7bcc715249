//! Error types for the transactional core.

use crate::types::ColumnType;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Broad classes of failure, used to decide whether a caller can continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Wrong transaction phase, double begin, mutation during read.
    State,
    /// Bad index, bad argument, null where not allowed.
    Range,
    /// Handle outlived the snapshot or structure it was created against.
    Staleness,
    /// Open failure or resource exhaustion. The handle must not be reused.
    Resource,
    /// Persisted data failed validation.
    Corruption,
}

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] tabula_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation not permitted in the current transaction state.
    #[error("illegal state: {message}")]
    IllegalState {
        /// Why the call was rejected.
        message: String,
    },

    /// A transaction was touched from a thread other than the one that began it.
    #[error("transaction was begun on another thread")]
    WrongThread,

    /// The handle has been closed.
    #[error("database handle is closed")]
    DatabaseClosed,

    /// A positional argument is out of range.
    #[error("{what} index {index} out of bounds (size {len})")]
    IndexOutOfBounds {
        /// What was being indexed ("row", "column", "view position", ...).
        what: &'static str,
        /// The offending index.
        index: usize,
        /// The valid size.
        len: usize,
    },

    /// An argument is invalid.
    #[error("illegal argument: {message}")]
    IllegalArgument {
        /// Description of the problem.
        message: String,
    },

    /// A table lookup failed during a read transaction.
    #[error("table not found: {name}")]
    TableNotFound {
        /// Name of the table.
        name: String,
    },

    /// A typed accessor was used on a column of another type.
    #[error("column {column} has type {actual}, expected {expected}")]
    TypeMismatch {
        /// Column index.
        column: usize,
        /// Type the accessor works with.
        expected: ColumnType,
        /// Type of the column.
        actual: ColumnType,
    },

    /// Null written to a column that is not nullable.
    #[error("column {column} is not nullable")]
    NullNotAllowed {
        /// Column index.
        column: usize,
    },

    /// The handle refers to data invalidated by an advance or a structural change.
    #[error("stale handle: {message}")]
    Stale {
        /// What went stale.
        message: String,
    },

    /// The database file could not be opened.
    #[error("cannot open {path}: {reason}")]
    CannotOpen {
        /// Path that was being opened.
        path: PathBuf,
        /// Why it failed.
        reason: String,
    },

    /// Allocation failed while opening or growing the database.
    #[error("out of memory")]
    OutOfMemory,

    /// Another process holds the file lock.
    #[error("database locked: another process has the file open")]
    DatabaseLocked,

    /// The commit log is corrupted.
    #[error("log corruption: {message}")]
    LogCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch in a commit log record.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Record payload failed to encode or decode.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates an illegal argument error.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument {
            message: message.into(),
        }
    }

    /// Creates a staleness error.
    pub fn stale(message: impl Into<String>) -> Self {
        Self::Stale {
            message: message.into(),
        }
    }

    /// Creates an out-of-bounds error.
    pub fn out_of_bounds(what: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds { what, index, len }
    }

    /// Creates a log corruption error.
    pub fn log_corruption(message: impl Into<String>) -> Self {
        Self::LogCorruption {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a cannot-open error.
    pub fn cannot_open(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CannotOpen {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The mutation-during-read error.
    pub(crate) fn mutation_during_read() -> Self {
        Self::illegal_state("Mutable method call during read transaction")
    }

    /// Returns the class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IllegalState { .. } | Self::WrongThread | Self::DatabaseClosed => {
                ErrorKind::State
            }
            Self::IndexOutOfBounds { .. }
            | Self::IllegalArgument { .. }
            | Self::TableNotFound { .. }
            | Self::TypeMismatch { .. }
            | Self::NullNotAllowed { .. } => ErrorKind::Range,
            Self::Stale { .. } => ErrorKind::Staleness,
            Self::Storage(_)
            | Self::Io(_)
            | Self::CannotOpen { .. }
            | Self::OutOfMemory
            | Self::DatabaseLocked => ErrorKind::Resource,
            Self::LogCorruption { .. } | Self::ChecksumMismatch { .. } | Self::Codec { .. } => {
                ErrorKind::Corruption
            }
        }
    }

    /// Whether the session stays usable after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Resource | ErrorKind::Corruption)
    }
}
