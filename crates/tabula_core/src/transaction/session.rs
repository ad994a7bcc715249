//! The mutable core behind a [`super::SharedGroup`].

use super::state::{SessionState, Txn};
use super::ListenerId;
use crate::change_feed::ChangeEvent;
use crate::config::Durability;
use crate::context::{Arena, ArenaStats, ArenaTicket, Context, HandleKind};
use crate::error::{CoreError, CoreResult};
use crate::file::SharedFile;
use crate::group::{GroupData, LogOp};
use crate::types::{TransactionState, Version};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

pub(crate) type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Transaction state of one handle, shared with every object it hands out.
///
/// Groups, tables, rows, views and queries keep an `Arc<Session>` and check
/// their serial or epoch against it on every access.
pub(crate) struct Session {
    id: u64,
    path: PathBuf,
    durability: Durability,
    state: Mutex<SessionState>,
    arena: Arena,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl Session {
    pub(crate) fn new(shared: Arc<SharedFile>) -> Self {
        Self {
            id: Context::global().next_session_id(),
            path: shared.path().to_path_buf(),
            durability: shared.config().durability,
            state: Mutex::new(SessionState::new(shared)),
            arena: Arena::default(),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn durability(&self) -> Durability {
        self.durability
    }

    /// Runs `f` against the state.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&SessionState) -> CoreResult<R>) -> CoreResult<R> {
        f(&self.state.lock())
    }

    /// Runs `f` against the state, mutably.
    pub(crate) fn write<R>(
        &self,
        f: impl FnOnce(&mut SessionState) -> CoreResult<R>,
    ) -> CoreResult<R> {
        f(&mut self.state.lock())
    }

    /// Current epoch. Must not be called from inside [`Session::read`].
    pub(crate) fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    pub(crate) fn register(&self, kind: HandleKind, epoch: u64) -> ArenaTicket {
        self.arena.register(kind, epoch)
    }

    pub(crate) fn arena_stats(&self) -> ArenaStats {
        let epoch = self.state.lock().epoch;
        self.arena.stats(epoch)
    }

    pub(crate) fn shared(&self) -> CoreResult<Arc<SharedFile>> {
        self.state.lock().shared().cloned()
    }

    pub(crate) fn transaction_state(&self) -> TransactionState {
        self.state.lock().transaction_state()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().shared.is_none()
    }

    pub(crate) fn pinned_version(&self) -> Option<Version> {
        self.state.lock().pinned_version()
    }

    // === Explicit transactions ===

    /// Starts a read transaction. Returns its serial.
    pub(crate) fn begin_read(&self, implicit: bool) -> CoreResult<u64> {
        let mut state = self.state.lock();
        state.ensure_idle()?;
        let shared = Arc::clone(state.shared()?);
        let committed = shared.latest();
        state.txn = Txn::Read {
            implicit,
            version: committed.version,
            _pin: shared.snapshots.pin(committed.version),
            group: committed.group,
        };
        state.owner = Some(thread::current().id());
        state.last_seen = committed.version;
        state.bump_serial();
        if implicit {
            shared.stats.record_implicit_begin();
        } else {
            shared.stats.record_read_begin();
        }
        debug!(
            session = self.id,
            version = committed.version.as_u64(),
            implicit,
            "read transaction started"
        );
        let serial = state.serial;
        drop(state);
        self.arena.reap();
        Ok(serial)
    }

    /// Ends a read transaction, explicit or implicit.
    pub(crate) fn end_read(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        state.ensure_active()?;
        if state.transaction_state().is_write() {
            return Err(CoreError::illegal_state(
                "end_read called during a write transaction",
            ));
        }
        state.txn = Txn::Idle;
        state.owner = None;
        state.bump_serial();
        debug!(session = self.id, "read transaction ended");
        drop(state);
        self.arena.reap();
        Ok(())
    }

    /// Starts a write transaction. Returns its serial.
    ///
    /// With `blocking` the call waits for the file's write lock; otherwise it
    /// fails with `IllegalState` when another handle holds it.
    pub(crate) fn begin_write(&self, blocking: bool) -> CoreResult<u64> {
        let shared = {
            let state = self.state.lock();
            state.ensure_idle()?;
            Arc::clone(state.shared()?)
        };
        self.acquire_writer(&shared, blocking)?;

        let mut state = self.state.lock();
        if let Err(e) = state.ensure_idle() {
            shared.release_writer(self.id);
            return Err(e);
        }
        let committed = shared.latest();
        state.txn = Txn::Write {
            implicit: false,
            base_version: committed.version,
            working: GroupData::clone(&committed.group),
            base: committed.group,
            ops: Vec::new(),
            _pin: shared.snapshots.pin(committed.version),
        };
        state.owner = Some(thread::current().id());
        state.last_seen = committed.version;
        state.bump_serial();
        shared.stats.record_write_begin();
        debug!(
            session = self.id,
            version = committed.version.as_u64(),
            "write transaction started"
        );
        let serial = state.serial;
        drop(state);
        self.arena.reap();
        Ok(serial)
    }

    fn acquire_writer(&self, shared: &SharedFile, blocking: bool) -> CoreResult<()> {
        if blocking {
            shared.acquire_writer(self.id);
            Ok(())
        } else if shared.try_acquire_writer(self.id) {
            Ok(())
        } else {
            Err(CoreError::illegal_state(
                "another write transaction is active on this file",
            ))
        }
    }

    /// Commits an explicit write transaction.
    pub(crate) fn commit(&self) -> CoreResult<Version> {
        let mut state = self.state.lock();
        state.ensure_state(TransactionState::WriteActive)?;
        let shared = Arc::clone(state.shared()?);
        let Txn::Write {
            ops, working, base, ..
        } = std::mem::replace(&mut state.txn, Txn::Idle)
        else {
            return Err(CoreError::illegal_state("no write transaction is active"));
        };
        let tables = changed_tables(&ops, &base, &working);
        let result = shared.publish(&ops, working, tables);
        shared.release_writer(self.id);
        state.owner = None;
        state.bump_serial();
        let committed = result?;
        state.last_seen = committed.version;
        info!(
            session = self.id,
            version = committed.version.as_u64(),
            ops = ops.len(),
            "transaction committed"
        );
        drop(state);
        self.arena.reap();
        Ok(committed.version)
    }

    /// Discards a write transaction, explicit or implicit.
    pub(crate) fn rollback(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        state.ensure_active()?;
        if !state.transaction_state().is_write() {
            return Err(CoreError::illegal_state(
                "rollback called outside a write transaction",
            ));
        }
        let shared = Arc::clone(state.shared()?);
        state.txn = Txn::Idle;
        state.owner = None;
        state.bump_serial();
        shared.release_writer(self.id);
        shared.stats.record_rollback();
        debug!(session = self.id, "transaction rolled back");
        drop(state);
        self.arena.reap();
        Ok(())
    }

    // === Implicit transactions ===

    /// Moves an implicit read to the latest version. Returns whether it moved.
    pub(crate) fn advance_read(&self) -> CoreResult<bool> {
        let mut state = self.state.lock();
        state.ensure_state(TransactionState::ImplicitReadActive)?;
        let shared = Arc::clone(state.shared()?);
        let from = state.pinned_version().unwrap_or(Version::INITIAL);
        let latest = shared.latest();
        if latest.version == from {
            return Ok(false);
        }
        state.txn = Txn::Read {
            implicit: true,
            version: latest.version,
            _pin: shared.snapshots.pin(latest.version),
            group: latest.group,
        };
        state.last_seen = latest.version;
        state.bump_epoch();
        shared.stats.record_advance();
        debug!(
            session = self.id,
            from = from.as_u64(),
            to = latest.version.as_u64(),
            "read transaction advanced"
        );
        drop(state);
        self.arena.reap();
        self.fire(events(&shared, from, latest.version));
        Ok(true)
    }

    /// Turns an implicit read into a write on the latest version.
    pub(crate) fn promote_to_write(&self) -> CoreResult<()> {
        let shared = {
            let state = self.state.lock();
            state.ensure_state(TransactionState::ImplicitReadActive)?;
            Arc::clone(state.shared()?)
        };
        self.acquire_writer(&shared, false)?;

        let mut state = self.state.lock();
        if let Err(e) = state.ensure_state(TransactionState::ImplicitReadActive) {
            shared.release_writer(self.id);
            return Err(e);
        }
        let from = state.pinned_version().unwrap_or(Version::INITIAL);
        let latest = shared.latest();
        state.txn = Txn::Write {
            implicit: true,
            base_version: latest.version,
            working: GroupData::clone(&latest.group),
            base: latest.group,
            ops: Vec::new(),
            _pin: shared.snapshots.pin(latest.version),
        };
        let advanced = latest.version != from;
        if advanced {
            state.last_seen = latest.version;
            state.bump_epoch();
        }
        shared.stats.record_promotion();
        debug!(
            session = self.id,
            version = latest.version.as_u64(),
            advanced,
            "read transaction promoted to write"
        );
        drop(state);
        if advanced {
            self.fire(events(&shared, from, latest.version));
        }
        Ok(())
    }

    /// Commits an implicit write and keeps reading the new version.
    ///
    /// Handles stay valid: the data they see is exactly what was committed.
    pub(crate) fn commit_and_continue_as_read(&self) -> CoreResult<Version> {
        let mut state = self.state.lock();
        state.ensure_state(TransactionState::ImplicitWriteActive)?;
        let shared = Arc::clone(state.shared()?);
        let Txn::Write {
            ops,
            working,
            base,
            base_version,
            ..
        } = std::mem::replace(&mut state.txn, Txn::Idle)
        else {
            return Err(CoreError::illegal_state("no write transaction is active"));
        };
        let tables = changed_tables(&ops, &base, &working);
        let result = shared.publish(&ops, working, tables);
        shared.release_writer(self.id);
        match result {
            Ok(committed) => {
                state.txn = Txn::Read {
                    implicit: true,
                    version: committed.version,
                    _pin: shared.snapshots.pin(committed.version),
                    group: committed.group,
                };
                state.last_seen = committed.version;
                info!(
                    session = self.id,
                    version = committed.version.as_u64(),
                    ops = ops.len(),
                    "transaction committed, continuing as read"
                );
                Ok(committed.version)
            }
            Err(e) => {
                state.txn = Txn::Read {
                    implicit: true,
                    version: base_version,
                    _pin: shared.snapshots.pin(base_version),
                    group: base,
                };
                state.bump_epoch();
                Err(e)
            }
        }
    }

    /// Discards an implicit write and goes back to reading its base version.
    pub(crate) fn rollback_and_continue_as_read(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        state.ensure_state(TransactionState::ImplicitWriteActive)?;
        let shared = Arc::clone(state.shared()?);
        let Txn::Write {
            ops,
            base,
            base_version,
            ..
        } = std::mem::replace(&mut state.txn, Txn::Idle)
        else {
            return Err(CoreError::illegal_state("no write transaction is active"));
        };
        state.txn = Txn::Read {
            implicit: true,
            version: base_version,
            _pin: shared.snapshots.pin(base_version),
            group: base,
        };
        if !ops.is_empty() {
            state.bump_epoch();
        }
        shared.release_writer(self.id);
        shared.stats.record_rollback();
        debug!(
            session = self.id,
            discarded = ops.len(),
            "transaction rolled back, continuing as read"
        );
        Ok(())
    }

    // === Lifecycle ===

    /// Detaches from the file. Fails while a transaction is active.
    pub(crate) fn close(&self) -> CoreResult<()> {
        let shared = {
            let mut state = self.state.lock();
            if state.shared.is_none() {
                return Ok(());
            }
            if state.transaction_state().is_active() {
                return Err(CoreError::illegal_state(
                    "cannot close while a transaction is active",
                ));
            }
            state.bump_serial();
            state.shared.take()
        };
        self.arena.reap();
        debug!(session = self.id, path = %self.path.display(), "handle closed");
        drop(shared);
        Ok(())
    }

    /// Ends whatever is active and detaches. Used when the handle is dropped.
    pub(crate) fn shutdown(&self) {
        let shared = {
            let mut state = self.state.lock();
            let Some(shared) = state.shared.take() else {
                return;
            };
            if state.transaction_state().is_write() {
                warn!(
                    session = self.id,
                    "handle dropped during a write transaction, rolling back"
                );
                shared.release_writer(self.id);
                shared.stats.record_rollback();
            }
            state.txn = Txn::Idle;
            state.owner = None;
            state.bump_serial();
            shared
        };
        self.arena.reap();
        drop(shared);
    }

    // === Notifications ===

    /// Whether a version newer than the last one observed has been committed.
    pub(crate) fn has_changed(&self) -> CoreResult<bool> {
        let state = self.state.lock();
        Ok(state.shared()?.current_version() > state.last_seen)
    }

    /// Waits up to `timeout` for a commit newer than the last one observed.
    pub(crate) fn wait_for_change(&self, timeout: Duration) -> CoreResult<bool> {
        let (shared, since) = {
            let state = self.state.lock();
            (Arc::clone(state.shared()?), state.last_seen)
        };
        Ok(shared.wait_for_change(since, timeout))
    }

    /// Delivers pending changes to listeners.
    ///
    /// An implicit read is advanced first. Returns whether anything changed.
    pub(crate) fn notify_listeners(&self) -> CoreResult<bool> {
        if self.transaction_state() == TransactionState::ImplicitReadActive {
            return self.advance_read();
        }
        let (shared, from, to) = {
            let mut state = self.state.lock();
            let shared = Arc::clone(state.shared()?);
            let from = state.last_seen;
            let to = shared.current_version();
            if to <= from {
                return Ok(false);
            }
            state.last_seen = to;
            (shared, from, to)
        };
        self.fire(events(&shared, from, to));
        Ok(true)
    }

    pub(crate) fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(l, _)| *l != id);
        listeners.len() != before
    }

    fn fire(&self, events: Vec<ChangeEvent>) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        if listeners.is_empty() {
            return;
        }
        for event in &events {
            for listener in &listeners {
                listener(event);
            }
        }
    }
}

/// Events for the versions in `(from, to]`, or one summary event if the
/// history no longer covers them.
fn events(shared: &SharedFile, from: Version, to: Version) -> Vec<ChangeEvent> {
    let events = shared.feed.between(from, to);
    if events.is_empty() {
        vec![ChangeEvent {
            version: to,
            tables: Vec::new(),
        }]
    } else {
        events
    }
}

/// Sorted names of the tables touched by `ops`.
fn changed_tables(ops: &[LogOp], base: &GroupData, working: &GroupData) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for op in ops {
        let key = op.table_key();
        let name = working.name_of(key).or_else(|_| base.name_of(key));
        if let Ok(name) = name {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_owned());
            }
        }
    }
    names.sort();
    names
}
