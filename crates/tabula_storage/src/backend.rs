//! Storage backend trait definition.

use crate::error::StorageResult;

/// A byte store backing one database file.
///
/// # Invariants
///
/// - `append` writes at the current logical size and returns that offset
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - `size` is the logical size; space handed out by `reserve` is not part of it
/// - after `sync` returns, every appended byte survives power loss
/// - `rewrite` is all-or-nothing: readers see either the old or the new stream
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends past
    /// the logical size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data at the logical end and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    fn flush(&mut self) -> StorageResult<()>;

    /// Forces data and metadata to durable media.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the logical size in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Drops everything after `new_size`.
    ///
    /// Used to cut a torn tail after recovery and to clear the log.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Pre-allocates room for `bytes` more bytes past the logical end.
    ///
    /// Best effort: backends that cannot pre-allocate return `Ok(0)`.
    /// Returns the number of bytes now available past the logical end.
    fn reserve(&mut self, bytes: u64) -> StorageResult<u64> {
        let _ = bytes;
        Ok(0)
    }

    /// Atomically replaces the whole stream with `data`.
    fn rewrite(&mut self, data: &[u8]) -> StorageResult<()>;
}
