//! Record iterator used by recovery and inspection.

use super::record::{
    compute_crc32, LogRecord, LogRecordKind, CRC_SIZE, HEADER_SIZE, LOG_FORMAT_VERSION, LOG_MAGIC,
};
use crate::error::{CoreError, CoreResult};
use tabula_storage::StorageBackend;

/// Iterates over the records of a log from the start.
///
/// - A truncated header or payload ends iteration cleanly
/// - An all-zero header (space pre-allocated by `reserve`) ends iteration cleanly
/// - Bad magic, unknown type, future format version or CRC mismatch is an error
///
/// After iteration stops, [`LogIterator::valid_end`] is the offset just past
/// the last good record.
pub(crate) struct LogIterator<'a> {
    backend: &'a dyn StorageBackend,
    total_size: u64,
    offset: u64,
    buffer: Vec<u8>,
    finished: bool,
}

impl<'a> LogIterator<'a> {
    pub(crate) fn new(backend: &'a dyn StorageBackend) -> CoreResult<Self> {
        Ok(Self {
            total_size: backend.size()?,
            backend,
            offset: 0,
            buffer: Vec::new(),
            finished: false,
        })
    }

    /// Offset just past the last record returned.
    pub(crate) const fn valid_end(&self) -> u64 {
        self.offset
    }

    /// Total bytes in the backend when iteration started.
    pub(crate) const fn total_size(&self) -> u64 {
        self.total_size
    }

    fn remaining(&self) -> u64 {
        self.total_size - self.offset
    }

    fn read_next(&mut self) -> CoreResult<Option<(u64, usize, LogRecord)>> {
        let start = self.offset;
        if self.remaining() < HEADER_SIZE as u64 {
            return Ok(None);
        }
        let header = self.backend.read_at(start, HEADER_SIZE)?;
        if header.iter().all(|&b| b == 0) {
            return Ok(None);
        }
        if header[0..4] != LOG_MAGIC {
            return Err(CoreError::log_corruption(format!(
                "invalid magic at offset {start}"
            )));
        }
        let format = u16::from_le_bytes([header[4], header[5]]);
        if format > LOG_FORMAT_VERSION {
            return Err(CoreError::log_corruption(format!(
                "unsupported format version {format} at offset {start}"
            )));
        }
        let kind = LogRecordKind::from_byte(header[6]).ok_or_else(|| {
            CoreError::log_corruption(format!(
                "unknown record type {} at offset {start}",
                header[6]
            ))
        })?;
        let payload_len =
            u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
        let total_len = HEADER_SIZE + payload_len + CRC_SIZE;
        if self.remaining() < total_len as u64 {
            return Ok(None);
        }

        self.buffer.clear();
        self.buffer
            .try_reserve_exact(total_len)
            .map_err(|_| CoreError::OutOfMemory)?;
        self.buffer
            .extend_from_slice(&self.backend.read_at(start, total_len)?);

        let crc_at = HEADER_SIZE + payload_len;
        let stored = u32::from_le_bytes([
            self.buffer[crc_at],
            self.buffer[crc_at + 1],
            self.buffer[crc_at + 2],
            self.buffer[crc_at + 3],
        ]);
        let computed = compute_crc32(&self.buffer[..crc_at]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let record = LogRecord::decode(kind, &self.buffer[HEADER_SIZE..crc_at])?;
        self.offset += total_len as u64;
        Ok(Some((start, total_len, record)))
    }
}

impl Iterator for LogIterator<'_> {
    /// `(offset, encoded length, record)`
    type Item = CoreResult<(u64, usize, LogRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
