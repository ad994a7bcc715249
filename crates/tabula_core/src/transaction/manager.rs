//! The database handle and transaction manager.

use super::guards::{ReadTransaction, WriteTransaction};
use super::session::Session;
use super::ListenerId;
use crate::change_feed::ChangeEvent;
use crate::config::{Config, Durability};
use crate::context::{ArenaStats, Context};
use crate::error::{CoreError, CoreResult};
use crate::handle::Group;
use crate::stats::StatsSnapshot;
use crate::types::{TransactionState, Version};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

/// A handle onto a database file and the transactions run through it.
///
/// Every `SharedGroup` runs at most one transaction at a time. Open several
/// handles on the same path, typically one per thread, to read concurrently.
/// Handles on the same path share one in-process file object (see
/// [`Context`]), so they see each other's commits and share one write lock.
///
/// # Explicit transactions
///
/// ```rust,ignore
/// use tabula_core::{ColumnType, Durability, SharedGroup};
/// use std::path::Path;
///
/// let db = SharedGroup::open(Path::new("t.db"), Durability::Full, false)?;
///
/// let wt = db.begin_write()?;
/// let person = wt.get_table("Person")?;
/// person.add_column(ColumnType::String, "name")?;
/// let row = person.add_empty_row()?;
/// person.set_string(0, row, "Alice")?;
/// wt.commit()?;
///
/// let rt = db.begin_read()?;
/// assert_eq!(rt.get_table("Person")?.get_string(0, 0)?.as_deref(), Some("Alice"));
/// ```
///
/// # Implicit transactions
///
/// [`SharedGroup::begin_implicit_transaction`] returns one [`Group`] that
/// stays usable while the handle moves between reading and writing with
/// [`SharedGroup::advance_read`], [`SharedGroup::promote_to_write`] and
/// [`SharedGroup::commit_and_continue_as_read`]. Rows, views, link views and
/// queries obtained from it go stale whenever the snapshot moves.
///
/// # Threads
///
/// A transaction belongs to the thread that began it. Calls from any other
/// thread fail with [`CoreError::WrongThread`].
pub struct SharedGroup {
    session: Arc<Session>,
}

impl SharedGroup {
    /// Opens the database at `path`.
    ///
    /// With `file_must_exist` the call fails with `CannotOpen` unless the file
    /// exists. For [`Durability::MemOnly`] "exists" means that another handle
    /// on the path is open in this process.
    ///
    /// # Errors
    ///
    /// - `CannotOpen` if the file is missing or unreadable
    /// - `DatabaseLocked` if another process holds the file
    /// - `IllegalArgument` if the path is already open with another durability
    /// - `LogCorruption`/`ChecksumMismatch` if recovery fails
    pub fn open(path: &Path, durability: Durability, file_must_exist: bool) -> CoreResult<Self> {
        let config = Config::default()
            .durability(durability)
            .create_if_missing(!file_must_exist);
        Self::open_with_config(path, config)
    }

    /// Opens the database at `path` with a custom configuration.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use tabula_core::{Config, Durability, SharedGroup};
    ///
    /// let config = Config::default()
    ///     .durability(Durability::Async)
    ///     .max_log_size(1 << 20);
    /// let db = SharedGroup::open_with_config(Path::new("t.db"), config)?;
    /// ```
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        if !config.create_if_missing {
            let exists = if config.durability.is_persistent() {
                path.exists()
            } else {
                Context::global().is_open(path)
            };
            if !exists {
                return Err(CoreError::cannot_open(path, "file does not exist"));
            }
        }
        let shared = Context::global().open_shared(path, &config)?;
        Ok(Self {
            session: Arc::new(Session::new(shared)),
        })
    }

    /// Detaches from the file.
    ///
    /// Idempotent. Fails with `IllegalState` while a transaction is active.
    /// Objects obtained from this handle fail with `DatabaseClosed` afterwards.
    pub fn close(&self) -> CoreResult<()> {
        self.session.close()
    }

    /// Whether [`SharedGroup::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    /// Canonical path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.session.path()
    }

    /// Durability the file was opened with.
    #[must_use]
    pub fn durability(&self) -> Durability {
        self.session.durability()
    }

    /// Whether another handle committed a version this one has not observed.
    pub fn has_changed(&self) -> CoreResult<bool> {
        self.session.has_changed()
    }

    /// Pre-allocates room for `bytes` more bytes of log. Best effort.
    pub fn reserve(&self, bytes: u64) -> CoreResult<()> {
        self.session.shared()?.reserve(bytes).map(|_| ())
    }

    /// Rewrites the log as a single snapshot. Returns the new log size.
    pub fn compact(&self) -> CoreResult<u64> {
        self.session.shared()?.compact()
    }

    /// Forces buffered commits to stable storage.
    pub fn sync(&self) -> CoreResult<()> {
        self.session.shared()?.sync()
    }

    /// Current size of the commit log in bytes.
    pub fn log_size(&self) -> CoreResult<u64> {
        self.session.shared()?.log_size()
    }

    /// Latest committed version of the file.
    pub fn current_version(&self) -> CoreResult<Version> {
        Ok(self.session.shared()?.current_version())
    }

    /// Version the active transaction reads from, if any.
    #[must_use]
    pub fn pinned_version(&self) -> Option<Version> {
        self.session.pinned_version()
    }

    /// Oldest version some transaction on this file still reads from.
    pub fn oldest_pinned_version(&self) -> CoreResult<Option<Version>> {
        Ok(self.session.shared()?.snapshots.oldest_pinned())
    }

    /// Current transaction state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.session.transaction_state()
    }

    /// Counters for the file, across all its handles.
    pub fn stats(&self) -> CoreResult<StatsSnapshot> {
        let shared = self.session.shared()?;
        let mut stats = shared.stats.snapshot();
        stats.pinned_snapshots = shared.snapshots.pinned_count();
        Ok(stats)
    }

    /// Counts of the objects this handle has issued.
    #[must_use]
    pub fn handle_stats(&self) -> ArenaStats {
        self.session.arena_stats()
    }

    // === Explicit transactions ===

    /// Starts a read transaction on the latest version.
    ///
    /// # Errors
    ///
    /// `IllegalState` if a transaction is already active on this handle.
    pub fn begin_read(&self) -> CoreResult<ReadTransaction> {
        let serial = self.session.begin_read(false)?;
        Ok(ReadTransaction::new(Group::new(
            Arc::clone(&self.session),
            serial,
        )))
    }

    /// Starts a write transaction, waiting for other writers on the file.
    ///
    /// # Errors
    ///
    /// `IllegalState` if a transaction is already active on this handle.
    pub fn begin_write(&self) -> CoreResult<WriteTransaction> {
        let serial = self.session.begin_write(true)?;
        Ok(WriteTransaction::new(Group::new(
            Arc::clone(&self.session),
            serial,
        )))
    }

    /// Starts a write transaction if no other handle is writing.
    ///
    /// # Errors
    ///
    /// `IllegalState` if a transaction is active here or a writer is active
    /// on the file.
    pub fn try_begin_write(&self) -> CoreResult<WriteTransaction> {
        let serial = self.session.begin_write(false)?;
        Ok(WriteTransaction::new(Group::new(
            Arc::clone(&self.session),
            serial,
        )))
    }

    /// Ends the active read transaction.
    pub fn end_read(&self) -> CoreResult<()> {
        self.session.end_read()
    }

    /// Commits the active write transaction and returns the new version.
    pub fn commit(&self) -> CoreResult<Version> {
        self.session.commit()
    }

    /// Discards the active write transaction.
    pub fn rollback(&self) -> CoreResult<()> {
        self.session.rollback()
    }

    // === Implicit transactions ===

    /// Starts an implicit read transaction and returns its group.
    pub fn begin_implicit_transaction(&self) -> CoreResult<Group> {
        let serial = self.session.begin_read(true)?;
        Ok(Group::new(Arc::clone(&self.session), serial))
    }

    /// Moves the implicit read to the latest version.
    ///
    /// Returns `false` without touching anything if there is no newer
    /// version. Otherwise rows, views, link views and queries obtained
    /// earlier become stale, and listeners are called.
    pub fn advance_read(&self) -> CoreResult<bool> {
        self.session.advance_read()
    }

    /// Turns the implicit read into a write on the latest version.
    ///
    /// # Errors
    ///
    /// `IllegalState` if another handle is writing to the file.
    pub fn promote_to_write(&self) -> CoreResult<()> {
        self.session.promote_to_write()
    }

    /// Commits the implicit write and continues reading the new version.
    pub fn commit_and_continue_as_read(&self) -> CoreResult<Version> {
        self.session.commit_and_continue_as_read()
    }

    /// Discards the implicit write and continues reading where it started.
    pub fn rollback_and_continue_as_read(&self) -> CoreResult<()> {
        self.session.rollback_and_continue_as_read()
    }

    // === Notifications ===

    /// Receives an event for every commit on the file, from any handle.
    pub fn subscribe(&self) -> CoreResult<Receiver<ChangeEvent>> {
        Ok(self.session.shared()?.feed.subscribe())
    }

    /// Registers a callback run when this handle observes newer commits.
    ///
    /// Listeners run on the thread that calls [`SharedGroup::advance_read`],
    /// [`SharedGroup::promote_to_write`] or [`SharedGroup::notify_listeners`].
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.session.add_listener(Arc::new(listener))
    }

    /// Unregisters a listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.session.remove_listener(id)
    }

    /// Calls listeners for commits not yet observed. Returns whether there were any.
    ///
    /// During an implicit read this advances the read first.
    pub fn notify_listeners(&self) -> CoreResult<bool> {
        self.session.notify_listeners()
    }

    /// Blocks until a commit not yet observed exists, or `timeout` passes.
    pub fn wait_for_change(&self, timeout: Duration) -> CoreResult<bool> {
        self.session.wait_for_change(timeout)
    }
}

impl Drop for SharedGroup {
    fn drop(&mut self) {
        self.session.shutdown();
    }
}

impl std::fmt::Debug for SharedGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedGroup")
            .field("path", &self.session.path())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn mem_path() -> PathBuf {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        PathBuf::from(format!(
            "/tmp/tabula-manager-{}-{}.db",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ))
    }

    fn open() -> SharedGroup {
        SharedGroup::open(&mem_path(), Durability::MemOnly, false).unwrap()
    }

    #[test]
    fn starts_idle() {
        let db = open();
        assert_eq!(db.state(), TransactionState::Idle);
        assert_eq!(db.pinned_version(), None);
        assert_eq!(db.current_version().unwrap(), Version::INITIAL);
    }

    #[test]
    fn double_begin_fails() {
        let db = open();
        let _rt = db.begin_read().unwrap();
        let err = db.begin_write().unwrap_err();
        assert!(matches!(err, CoreError::IllegalState { .. }));
        assert_eq!(db.state(), TransactionState::ReadActive);
    }

    #[test]
    fn commit_increments_and_rollback_does_not() {
        let db = open();
        let _wt = db.begin_write().unwrap();
        let v1 = db.commit().unwrap();
        let _wt = db.begin_write().unwrap();
        db.rollback().unwrap();
        assert_eq!(db.current_version().unwrap(), v1);
        let _wt = db.begin_write().unwrap();
        assert!(db.commit().unwrap() > v1);
    }

    #[test]
    fn wrong_phase_calls_fail() {
        let db = open();
        assert!(db.commit().is_err());
        assert!(db.end_read().is_err());
        assert!(db.advance_read().is_err());
        let _rt = db.begin_read().unwrap();
        assert!(db.commit().is_err());
        assert!(db.promote_to_write().is_err());
        assert!(db.rollback().is_err());
    }

    #[test]
    fn close_is_idempotent_and_refused_during_transaction() {
        let db = open();
        let _rt = db.begin_read().unwrap();
        assert!(db.close().is_err());
        db.end_read().unwrap();
        db.close().unwrap();
        db.close().unwrap();
        assert!(db.is_closed());
        assert!(matches!(db.begin_read(), Err(CoreError::DatabaseClosed)));
    }

    #[test]
    fn mem_only_must_exist_requires_open_handle() {
        let path = mem_path();
        let err = SharedGroup::open(&path, Durability::MemOnly, true).unwrap_err();
        assert!(matches!(err, CoreError::CannotOpen { .. }));

        let _first = SharedGroup::open(&path, Durability::MemOnly, false).unwrap();
        SharedGroup::open(&path, Durability::MemOnly, true).unwrap();
    }

    #[test]
    fn durability_mismatch_is_rejected() {
        let path = mem_path();
        let _first = SharedGroup::open(&path, Durability::MemOnly, false).unwrap();
        let err = SharedGroup::open(&path, Durability::Full, false).unwrap_err();
        assert!(matches!(err, CoreError::IllegalArgument { .. }));
    }

    #[test]
    fn implicit_cycle() {
        let path = mem_path();
        let db = SharedGroup::open(&path, Durability::MemOnly, false).unwrap();
        let other = SharedGroup::open(&path, Durability::MemOnly, false).unwrap();

        db.begin_implicit_transaction().unwrap();
        assert_eq!(db.state(), TransactionState::ImplicitReadActive);
        assert!(!db.advance_read().unwrap());

        let _wt = other.begin_write().unwrap();
        let v = other.commit().unwrap();
        assert!(db.has_changed().unwrap());
        assert!(db.advance_read().unwrap());
        assert_eq!(db.pinned_version(), Some(v));
        assert!(!db.has_changed().unwrap());

        db.promote_to_write().unwrap();
        assert_eq!(db.state(), TransactionState::ImplicitWriteActive);
        assert!(other.try_begin_write().is_err());
        let v2 = db.commit_and_continue_as_read().unwrap();
        assert_eq!(db.state(), TransactionState::ImplicitReadActive);
        assert_eq!(db.pinned_version(), Some(v2));

        db.promote_to_write().unwrap();
        db.rollback_and_continue_as_read().unwrap();
        assert_eq!(db.pinned_version(), Some(v2));
        db.end_read().unwrap();
        assert_eq!(db.state(), TransactionState::Idle);
    }

    #[test]
    fn promote_fails_while_other_handle_writes() {
        let path = mem_path();
        let db = SharedGroup::open(&path, Durability::MemOnly, false).unwrap();
        let other = SharedGroup::open(&path, Durability::MemOnly, false).unwrap();
        db.begin_implicit_transaction().unwrap();
        let _wt = other.begin_write().unwrap();
        let err = db.promote_to_write().unwrap_err();
        assert!(matches!(err, CoreError::IllegalState { .. }));
        assert_eq!(db.state(), TransactionState::ImplicitReadActive);
    }

    #[test]
    fn wrong_thread_is_rejected() {
        let db = Arc::new(open());
        let _rt = db.begin_read().unwrap();
        let remote = Arc::clone(&db);
        let err = std::thread::spawn(move || remote.end_read())
            .join()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, CoreError::WrongThread));
        db.end_read().unwrap();
    }

    #[test]
    fn dropping_handle_releases_write_lock() {
        let path = mem_path();
        let keep = SharedGroup::open(&path, Durability::MemOnly, false).unwrap();
        let db = SharedGroup::open(&path, Durability::MemOnly, false).unwrap();
        let wt = db.begin_write().unwrap();
        drop(db);
        let _kept = keep.try_begin_write().unwrap();
        drop(wt);
        assert_eq!(keep.state(), TransactionState::WriteActive);
    }
}
