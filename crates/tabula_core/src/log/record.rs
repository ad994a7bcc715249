//! Commit log record types and envelope encoding.

use crate::error::{CoreError, CoreResult};
use crate::group::{GroupData, LogOp};
use crate::types::Version;

/// Magic bytes at the start of every record.
pub(crate) const LOG_MAGIC: [u8; 4] = *b"TBLG";

/// Current record format version.
pub(crate) const LOG_FORMAT_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

pub(crate) const CRC_SIZE: usize = 4;

/// Type of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordKind {
    /// The ops of one committed write transaction.
    Commit = 1,
    /// The complete state at one version.
    Snapshot = 2,
}

impl LogRecordKind {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Commit),
            2 => Some(Self::Snapshot),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A decoded log record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LogRecord {
    Commit { version: Version, ops: Vec<LogOp> },
    Snapshot { version: Version, group: GroupData },
}

impl LogRecord {
    pub(crate) const fn version(&self) -> Version {
        match self {
            Self::Commit { version, .. } | Self::Snapshot { version, .. } => *version,
        }
    }

    pub(crate) const fn kind(&self) -> LogRecordKind {
        match self {
            Self::Commit { .. } => LogRecordKind::Commit,
            Self::Snapshot { .. } => LogRecordKind::Snapshot,
        }
    }

    /// Decodes a CBOR payload of the given type.
    pub(crate) fn decode(kind: LogRecordKind, payload: &[u8]) -> CoreResult<Self> {
        let corrupt = |e: ciborium::de::Error<std::io::Error>| {
            CoreError::codec(format!("cannot decode {kind:?} record: {e}"))
        };
        Ok(match kind {
            LogRecordKind::Commit => {
                let (version, ops): (Version, Vec<LogOp>) =
                    ciborium::from_reader(payload).map_err(corrupt)?;
                Self::Commit { version, ops }
            }
            LogRecordKind::Snapshot => {
                let (version, group): (Version, GroupData) =
                    ciborium::from_reader(payload).map_err(corrupt)?;
                Self::Snapshot { version, group }
            }
        })
    }
}

/// Encodes a commit record, envelope included.
pub(crate) fn encode_commit(version: Version, ops: &[LogOp]) -> CoreResult<Vec<u8>> {
    encode(LogRecordKind::Commit, &(version, ops))
}

/// Encodes a snapshot record, envelope included.
pub(crate) fn encode_snapshot(version: Version, group: &GroupData) -> CoreResult<Vec<u8>> {
    encode(LogRecordKind::Snapshot, &(version, group))
}

fn encode<T: serde::Serialize>(kind: LogRecordKind, payload: &T) -> CoreResult<Vec<u8>> {
    let mut body = Vec::new();
    ciborium::into_writer(payload, &mut body)
        .map_err(|e| CoreError::codec(format!("cannot encode {kind:?} record: {e}")))?;
    let len = u32::try_from(body.len())
        .map_err(|_| CoreError::illegal_argument("log record payload too large"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + body.len() + CRC_SIZE);
    data.extend_from_slice(&LOG_MAGIC);
    data.extend_from_slice(&LOG_FORMAT_VERSION.to_le_bytes());
    data.push(kind.as_byte());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&body);
    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// CRC32 (IEEE polynomial) over `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}
