//! # Tabula Core
//!
//! Multi-version transactional table store.
//!
//! A database file holds a set of named tables. Every committed write
//! transaction produces a new immutable version; readers pin a version and
//! keep seeing it no matter what writers do. One writer per file at a time.
//!
//! This crate provides:
//! - [`SharedGroup`]: a per-thread handle on a database file and its
//!   transaction state machine (explicit and implicit transactions)
//! - [`Group`] / [`Table`]: the snapshot a transaction sees
//! - [`Row`], [`View`], [`LinkView`], [`Query`]: accessors that detect when
//!   the snapshot or structure they were made against has moved
//! - a CRC-checked commit log with compaction and crash recovery
//!
//! ## Example
//!
//! ```rust,no_run
//! use tabula_core::{ColumnType, Durability, SharedGroup};
//! use std::path::Path;
//!
//! let db = SharedGroup::open(Path::new("people.tdb"), Durability::Full, false)?;
//! {
//!     let wt = db.begin_write()?;
//!     let people = wt.get_table("Person")?;
//!     let name = people.add_column(ColumnType::String, "name")?;
//!     let age = people.add_column(ColumnType::Int, "age")?;
//!     let row = people.add_empty_row()?;
//!     people.set_string(name, row, "Alice")?;
//!     people.set_long(age, row, 30)?;
//!     wt.commit()?;
//! }
//! let rt = db.begin_read()?;
//! let people = rt.get_table("Person")?;
//! assert_eq!(people.find_first_string(0, "Alice")?, Some(0));
//! # Ok::<(), tabula_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod config;
mod context;
mod error;
mod file;
mod group;
mod handle;
mod log;
mod query;
mod stats;
mod transaction;
pub mod types;
mod value;

pub use change_feed::ChangeEvent;
pub use config::{Config, Durability};
pub use context::{ArenaStats, Context, HandleKind};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use group::ColumnSpec;
pub use handle::{Group, LinkView, Row, Table, View};
pub use log::{compute_crc32, inspect_log, LogRecordInfo, LogRecordKind, LogReport};
pub use query::Query;
pub use stats::{DatabaseStats, StatsSnapshot};
pub use transaction::{ListenerId, ReadTransaction, SharedGroup, WriteTransaction};
pub use types::{Case, ColumnType, Order, TableKey, TransactionState, Version};
pub use value::{truncate_date, Mixed, Value};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
