//! Per-session transaction state.

use crate::error::{CoreError, CoreResult};
use crate::file::{SharedFile, SnapshotPin};
use crate::group::{Effect, GroupData, LogOp, TablePath};
use crate::types::{TableKey, TransactionState, Version};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::debug;

/// The open transaction of a session, if any.
pub(crate) enum Txn {
    Idle,
    Read {
        implicit: bool,
        version: Version,
        group: Arc<GroupData>,
        _pin: SnapshotPin,
    },
    Write {
        implicit: bool,
        base_version: Version,
        base: Arc<GroupData>,
        working: GroupData,
        ops: Vec<LogOp>,
        _pin: SnapshotPin,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    /// Rows at or after this index moved or disappeared.
    Rows(usize),
    Schema,
}

/// Structural changes made in the current epoch, per table.
///
/// A handle remembers the length of its table's entry list when it was
/// created (its generation) and is stale once a later entry touches a row it
/// refers to.
#[derive(Debug, Default)]
pub(crate) struct StructuralLog {
    tables: HashMap<TablePath, Vec<Change>>,
}

impl StructuralLog {
    pub(crate) fn record(&mut self, effect: Effect) {
        let (path, change) = match effect {
            Effect::None => return,
            Effect::Rows { table, from } => (table, Change::Rows(from)),
            Effect::Schema { table } => (TablePath::root(table), Change::Schema),
        };
        self.tables.entry(path).or_default().push(change);
    }

    pub(crate) fn generation(&self, path: TablePath) -> usize {
        self.tables.get(&path).map_or(0, Vec::len)
    }

    /// Whether no row change since `since` reached `max_row`.
    ///
    /// `None` means the handle refers to no rows and cannot go stale this way.
    pub(crate) fn rows_stable(&self, path: TablePath, since: usize, max_row: Option<usize>) -> bool {
        let Some(max_row) = max_row else {
            return true;
        };
        self.tables.get(&path).map_or(true, |changes| {
            changes.iter().skip(since).all(|c| match c {
                Change::Rows(from) => *from > max_row,
                Change::Schema => true,
            })
        })
    }

    pub(crate) fn schema_stable(&self, key: TableKey, since: usize) -> bool {
        self.tables
            .get(&TablePath::root(key))
            .map_or(true, |changes| {
                !changes.iter().skip(since).any(|c| *c == Change::Schema)
            })
    }

    fn clear(&mut self) {
        self.tables.clear();
    }
}

/// Everything a session guards with its mutex.
pub(crate) struct SessionState {
    pub(crate) shared: Option<Arc<SharedFile>>,
    pub(crate) txn: Txn,
    /// Thread the open transaction belongs to.
    pub(crate) owner: Option<ThreadId>,
    /// Bumped whenever row-level handles must become stale.
    pub(crate) epoch: u64,
    /// Bumped whenever a transaction begins or ends.
    pub(crate) serial: u64,
    /// Latest version this session has observed.
    pub(crate) last_seen: Version,
    pub(crate) log: StructuralLog,
}

impl SessionState {
    pub(crate) fn new(shared: Arc<SharedFile>) -> Self {
        Self {
            last_seen: shared.current_version(),
            shared: Some(shared),
            txn: Txn::Idle,
            owner: None,
            epoch: 0,
            serial: 0,
            log: StructuralLog::default(),
        }
    }

    pub(crate) fn transaction_state(&self) -> TransactionState {
        match &self.txn {
            Txn::Idle => TransactionState::Idle,
            Txn::Read { implicit: false, .. } => TransactionState::ReadActive,
            Txn::Read { implicit: true, .. } => TransactionState::ImplicitReadActive,
            Txn::Write { implicit: false, .. } => TransactionState::WriteActive,
            Txn::Write { implicit: true, .. } => TransactionState::ImplicitWriteActive,
        }
    }

    pub(crate) fn shared(&self) -> CoreResult<&Arc<SharedFile>> {
        self.shared.as_ref().ok_or(CoreError::DatabaseClosed)
    }

    pub(crate) fn check_thread(&self) -> CoreResult<()> {
        match self.owner {
            Some(owner) if owner != thread::current().id() => Err(CoreError::WrongThread),
            _ => Ok(()),
        }
    }

    pub(crate) fn ensure_idle(&self) -> CoreResult<()> {
        self.shared()?;
        if self.transaction_state().is_active() {
            return Err(CoreError::illegal_state(format!(
                "a {} transaction is already active on this handle",
                self.transaction_state()
            )));
        }
        Ok(())
    }

    /// Checks that the session is open, in `expected`, and on the owner thread.
    pub(crate) fn ensure_state(&self, expected: TransactionState) -> CoreResult<()> {
        self.shared()?;
        let actual = self.transaction_state();
        if actual != expected {
            return Err(CoreError::illegal_state(format!(
                "expected a {expected} transaction, but the handle is {actual}"
            )));
        }
        self.check_thread()
    }

    /// Checks that some transaction is open and owned by this thread.
    pub(crate) fn ensure_active(&self) -> CoreResult<()> {
        self.shared()?;
        if !self.transaction_state().is_active() {
            return Err(CoreError::illegal_state("no transaction is active"));
        }
        self.check_thread()
    }

    pub(crate) fn ensure_writable(&self) -> CoreResult<()> {
        self.ensure_active()?;
        if self.transaction_state().is_write() {
            Ok(())
        } else {
            Err(CoreError::mutation_during_read())
        }
    }

    /// Data visible to the open transaction.
    pub(crate) fn group(&self) -> CoreResult<&GroupData> {
        self.ensure_active()?;
        match &self.txn {
            Txn::Read { group, .. } => Ok(group),
            Txn::Write { working, .. } => Ok(working),
            Txn::Idle => Err(CoreError::illegal_state("no transaction is active")),
        }
    }

    /// Version the open transaction started from.
    pub(crate) fn pinned_version(&self) -> Option<Version> {
        match &self.txn {
            Txn::Idle => None,
            Txn::Read { version, .. } => Some(*version),
            Txn::Write { base_version, .. } => Some(*base_version),
        }
    }

    /// Applies a mutation to the working copy and records it.
    pub(crate) fn apply(&mut self, op: LogOp) -> CoreResult<()> {
        self.ensure_writable()?;
        let Self { txn, log, .. } = self;
        let Txn::Write { working, ops, .. } = txn else {
            return Err(CoreError::mutation_during_read());
        };
        let effect = working.apply(&op)?;
        log.record(effect);
        ops.push(op);
        Ok(())
    }

    /// Invalidates every row-level handle.
    pub(crate) fn bump_epoch(&mut self) {
        self.epoch += 1;
        self.log.clear();
    }

    /// Starts or ends a transaction: invalidates every handle.
    pub(crate) fn bump_serial(&mut self) {
        self.serial += 1;
        self.bump_epoch();
    }

    fn stale(&self, message: &str) -> CoreError {
        if let Some(shared) = &self.shared {
            shared.stats.record_stale();
        }
        debug!(message, "stale handle detected");
        CoreError::stale(message)
    }

    /// Validates a handle bound to transaction `serial`.
    pub(crate) fn check_serial(&self, serial: u64) -> CoreResult<()> {
        self.shared()?;
        if serial != self.serial {
            return Err(self.stale("handle belongs to a transaction that has ended"));
        }
        self.ensure_active()
    }

    /// Validates a handle bound to snapshot `epoch`.
    pub(crate) fn check_epoch(&self, epoch: u64) -> CoreResult<()> {
        self.ensure_active()?;
        if epoch == self.epoch {
            Ok(())
        } else {
            Err(self.stale("snapshot has advanced since the handle was created"))
        }
    }

    pub(crate) fn check_rows(
        &self,
        path: TablePath,
        generation: usize,
        max_row: Option<usize>,
    ) -> CoreResult<()> {
        if self.log.rows_stable(path, generation, max_row) {
            Ok(())
        } else {
            Err(self.stale("rows were inserted or removed before the handle's rows"))
        }
    }

    pub(crate) fn check_schema(&self, key: TableKey, generation: usize) -> CoreResult<()> {
        if self.log.schema_stable(key, generation) {
            Ok(())
        } else {
            Err(self.stale("table schema changed since the query was built"))
        }
    }
}
