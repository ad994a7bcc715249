//! # Tabula Storage
//!
//! Byte-store backends underneath a Tabula database file.
//!
//! A backend is an **opaque, append-mostly byte stream**. It knows nothing
//! about commit records, tables or versions; `tabula_core` owns every byte
//! of interpretation. The only structural operations a backend offers are
//! the ones the commit log needs:
//!
//! - append a record and report where it landed
//! - read a range back for recovery
//! - flush / sync according to the durability policy
//! - truncate a torn tail after recovery
//! - pre-allocate room for growth (`reserve`)
//! - atomically replace the whole stream (`rewrite`, used by compaction)
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - `MemOnly` durability and tests
//! - [`FileBackend`] - persistent storage through OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use tabula_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"commit").unwrap();
//! assert_eq!(backend.read_at(offset, 6).unwrap(), b"commit");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
