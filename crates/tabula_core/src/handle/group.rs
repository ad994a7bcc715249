//! The table collection of one transaction.

use super::Table;
use crate::context::{ArenaTicket, HandleKind};
use crate::error::{CoreError, CoreResult};
use crate::group::{GroupData, LogOp, TablePath};
use crate::log::encode_snapshot;
use crate::transaction::{Session, SessionState};
use crate::types::{TableKey, Version};
use std::path::Path;
use std::sync::Arc;
use tabula_storage::{FileBackend, StorageBackend};
use tracing::{debug, info};

/// The tables of a file as one transaction sees them.
///
/// Obtained from [`crate::SharedGroup::begin_implicit_transaction`] or by
/// dereferencing a [`crate::ReadTransaction`] / [`crate::WriteTransaction`].
pub struct Group {
    session: Arc<Session>,
    serial: u64,
    _ticket: ArenaTicket,
}

impl Group {
    pub(crate) fn new(session: Arc<Session>, serial: u64) -> Self {
        let ticket = session.register(HandleKind::Group, session.epoch());
        Self {
            session,
            serial,
            _ticket: ticket,
        }
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    /// Whether the transaction this group was created for is still running.
    pub(crate) fn is_current(&self) -> bool {
        self.session
            .read(|s| {
                Ok(s.shared.is_some()
                    && s.serial == self.serial
                    && s.transaction_state().is_active())
            })
            .unwrap_or(false)
    }

    /// Fails with `Stale` unless this group's transaction is still running.
    pub(crate) fn ensure_current(&self) -> CoreResult<()> {
        self.session.read(|s| s.check_serial(self.serial))
    }

    fn read<R>(&self, f: impl FnOnce(&SessionState, &GroupData) -> CoreResult<R>) -> CoreResult<R> {
        self.session.read(|s| {
            s.check_serial(self.serial)?;
            f(s, s.group()?)
        })
    }

    fn table_handle(&self, key: TableKey, epoch: u64) -> Table {
        Table::new(
            Arc::clone(&self.session),
            TablePath::root(key),
            self.serial,
            None,
            epoch,
        )
    }

    /// Whether a table called `name` exists.
    pub fn has_table(&self, name: &str) -> CoreResult<bool> {
        self.read(|_, g| Ok(g.key_of(name).is_some()))
    }

    /// Returns the table called `name`.
    ///
    /// In a write transaction a missing table is created. In a read
    /// transaction it is an error.
    ///
    /// # Errors
    ///
    /// `TableNotFound` during a read if the table does not exist.
    pub fn get_table(&self, name: &str) -> CoreResult<Table> {
        let (key, epoch) = self.session.write(|s| {
            s.check_serial(self.serial)?;
            if let Some(key) = s.group()?.key_of(name) {
                return Ok((key, s.epoch));
            }
            if !s.transaction_state().is_write() {
                return Err(CoreError::TableNotFound {
                    name: name.to_owned(),
                });
            }
            let key = s.group()?.next_table_key();
            s.apply(LogOp::AddTable {
                key,
                name: name.to_owned(),
            })?;
            debug!(table = name, %key, "table created");
            Ok((key, s.epoch))
        })?;
        Ok(self.table_handle(key, epoch))
    }

    /// Number of tables.
    pub fn table_count(&self) -> CoreResult<usize> {
        self.read(|_, g| Ok(g.tables.len()))
    }

    /// Whether there are no tables.
    pub fn is_empty(&self) -> CoreResult<bool> {
        self.read(|_, g| Ok(g.tables.is_empty()))
    }

    /// Name of the table at `index`, in creation order.
    pub fn table_name(&self, index: usize) -> CoreResult<String> {
        self.read(|_, g| {
            g.tables
                .get(index)
                .map(|e| e.name.clone())
                .ok_or_else(|| CoreError::out_of_bounds("table", index, g.tables.len()))
        })
    }

    /// Removes a table.
    ///
    /// # Errors
    ///
    /// `IllegalState` if another table links to it.
    pub fn remove_table(&self, name: &str) -> CoreResult<()> {
        self.session.write(|s| {
            s.check_serial(self.serial)?;
            s.ensure_writable()?;
            let key = s.group()?.key_of(name).ok_or_else(|| CoreError::TableNotFound {
                name: name.to_owned(),
            })?;
            s.apply(LogOp::RemoveTable { key })
        })
    }

    /// Renames a table. Existing [`Table`] handles keep working.
    pub fn rename_table(&self, name: &str, new_name: &str) -> CoreResult<()> {
        self.session.write(|s| {
            s.check_serial(self.serial)?;
            s.ensure_writable()?;
            let key = s.group()?.key_of(name).ok_or_else(|| CoreError::TableNotFound {
                name: name.to_owned(),
            })?;
            s.apply(LogOp::RenameTable {
                key,
                name: new_name.to_owned(),
            })
        })
    }

    /// Version this transaction started from.
    pub fn version(&self) -> CoreResult<Version> {
        self.read(|s, _| Ok(s.pinned_version().unwrap_or(Version::INITIAL)))
    }

    /// Writes the tables as seen by this transaction to a new database file.
    ///
    /// Uncommitted changes of a write transaction are included.
    ///
    /// # Errors
    ///
    /// `IllegalArgument` if `path` already exists.
    pub fn write_copy_to(&self, path: &Path) -> CoreResult<()> {
        if path.exists() {
            return Err(CoreError::illegal_argument(format!(
                "{} already exists",
                path.display()
            )));
        }
        let (version, data) = self.read(|s, g| {
            let version = s.pinned_version().unwrap_or(Version::INITIAL);
            Ok((version, encode_snapshot(version, g)?))
        })?;
        let mut backend = FileBackend::open(path)?;
        backend.append(&data)?;
        backend.flush()?;
        backend.sync()?;
        info!(
            path = %path.display(),
            version = version.as_u64(),
            bytes = data.len(),
            "database copy written"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group").field("serial", &self.serial).finish()
    }
}
