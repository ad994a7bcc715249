//! Process-wide registry of open files, and the per-session handle arena.
//!
//! Every handle opened on the same path shares one [`SharedFile`], so
//! writers on different handles serialize on the same lock and readers see
//! the same versions. The [`Context`] keeps the path-to-file map.
//!
//! The [`Arena`] records every handle a session hands out. Dropping a handle
//! only queues its slot; slots are reclaimed in batches at transaction
//! boundaries, so releasing many handles never contends with the
//! transaction in progress.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::file::{FileLock, SharedFile};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, trace};

/// Released slots that trigger an immediate reap.
const REAP_THRESHOLD: usize = 256;

struct Entry {
    shared: Weak<SharedFile>,
    /// Held by the entry so a file being torn down can be reopened at once.
    lock: Option<FileLock>,
}

/// Registry of the database files open in this process.
pub struct Context {
    files: Mutex<HashMap<PathBuf, Entry>>,
    next_session: AtomicU64,
}

impl Context {
    fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
        }
    }

    /// The process-wide context.
    pub fn global() -> &'static Context {
        static CONTEXT: OnceLock<Context> = OnceLock::new();
        CONTEXT.get_or_init(Context::new)
    }

    pub(crate) fn next_session_id(&self) -> u64 {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the shared file for `path`, opening it if needed.
    pub(crate) fn open_shared(&self, path: &Path, config: &Config) -> CoreResult<Arc<SharedFile>> {
        let key = canonical_key(path)?;
        let mut files = self.files.lock();

        if let Some(shared) = files.get(&key).and_then(|e| e.shared.upgrade()) {
            let durability = shared.config().durability;
            if durability != config.durability {
                drop(files);
                return Err(CoreError::illegal_argument(format!(
                    "{} is already open with durability {durability:?}",
                    key.display()
                )));
            }
            return Ok(shared);
        }

        let lock = match files.get_mut(&key).and_then(|e| e.lock.take()) {
            Some(lock) => Some(lock),
            None if config.durability.is_persistent() => Some(FileLock::acquire(&key)?),
            None => None,
        };
        let shared = Arc::new(SharedFile::open(key.clone(), config.clone())?);
        files.insert(
            key,
            Entry {
                shared: Arc::downgrade(&shared),
                lock,
            },
        );
        Ok(shared)
    }

    /// Whether a live shared file exists for `path`.
    pub fn is_open(&self, path: &Path) -> bool {
        canonical_key(path).is_ok_and(|key| {
            self.files
                .lock()
                .get(&key)
                .is_some_and(|e| e.shared.strong_count() > 0)
        })
    }

    /// Paths with a live shared file.
    pub fn open_paths(&self) -> Vec<PathBuf> {
        self.files
            .lock()
            .iter()
            .filter(|(_, e)| e.shared.strong_count() > 0)
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Drops entries whose file is no longer open. Returns how many went.
    pub fn reap(&self) -> usize {
        let mut files = self.files.lock();
        let before = files.len();
        files.retain(|_, e| e.shared.strong_count() > 0);
        before - files.len()
    }

    /// Called by a shared file as it is dropped.
    pub(crate) fn release(&self, path: &Path) {
        let mut files = self.files.lock();
        if files
            .get(path)
            .is_some_and(|e| e.shared.strong_count() == 0)
        {
            files.remove(path);
            debug!(path = %path.display(), "file lock released");
        }
    }
}

/// Registry key: the canonical path, or the canonical parent plus file name
/// for a file that does not exist yet.
fn canonical_key(path: &Path) -> CoreResult<PathBuf> {
    if let Ok(p) = path.canonicalize() {
        return Ok(p);
    }
    let absolute = std::path::absolute(path)?;
    let key = match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(parent) => parent.join(name),
            Err(_) => absolute,
        },
        _ => absolute,
    };
    Ok(key)
}

/// What kind of handle an arena slot records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// [`crate::Group`]
    Group,
    /// [`crate::Table`]
    Table,
    /// [`crate::Row`]
    Row,
    /// [`crate::View`]
    View,
    /// [`crate::LinkView`]
    LinkView,
    /// [`crate::Query`]
    Query,
}

#[derive(Debug, Clone, Copy)]
struct HandleRecord {
    thread: ThreadId,
    epoch: u64,
}

#[derive(Debug, Default)]
struct Slots {
    records: Vec<Option<HandleRecord>>,
    free: Vec<usize>,
}

#[derive(Debug, Default)]
struct ArenaInner {
    slots: Mutex<Slots>,
    released: Mutex<Vec<usize>>,
}

impl ArenaInner {
    fn reap(&self) -> usize {
        let released = std::mem::take(&mut *self.released.lock());
        let mut slots = self.slots.lock();
        for &slot in &released {
            slots.records[slot] = None;
            slots.free.push(slot);
        }
        released.len()
    }
}

/// Counts reported by [`Arena::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaStats {
    /// Handles still referenced.
    pub live: usize,
    /// Dropped handles whose slot has not been reclaimed yet.
    pub pending: usize,
    /// Live handles created under an earlier epoch (certain to be stale).
    pub outdated: usize,
    /// Live handles created on a thread other than the caller's.
    pub foreign: usize,
}

/// Per-session record of issued handles with deferred release.
#[derive(Debug, Default)]
pub(crate) struct Arena {
    inner: Arc<ArenaInner>,
}

impl Arena {
    pub(crate) fn register(&self, kind: HandleKind, epoch: u64) -> ArenaTicket {
        let record = HandleRecord {
            thread: thread::current().id(),
            epoch,
        };
        let mut slots = self.inner.slots.lock();
        let slot = match slots.free.pop() {
            Some(slot) => {
                slots.records[slot] = Some(record);
                slot
            }
            None => {
                slots.records.push(Some(record));
                slots.records.len() - 1
            }
        };
        trace!(?kind, slot, "handle registered");
        ArenaTicket {
            inner: Arc::clone(&self.inner),
            slot,
        }
    }

    /// Reclaims released slots. Returns how many.
    pub(crate) fn reap(&self) -> usize {
        let reaped = self.inner.reap();
        if reaped > 0 {
            trace!(reaped, "arena reaped");
        }
        reaped
    }

    pub(crate) fn pending(&self) -> usize {
        self.inner.released.lock().len()
    }

    pub(crate) fn live(&self) -> usize {
        let occupied = self
            .inner
            .slots
            .lock()
            .records
            .iter()
            .filter(|r| r.is_some())
            .count();
        occupied - self.pending()
    }

    pub(crate) fn stats(&self, current_epoch: u64) -> ArenaStats {
        let released = self.inner.released.lock().clone();
        let slots = self.inner.slots.lock();
        let me = thread::current().id();
        let mut stats = ArenaStats {
            pending: released.len(),
            ..ArenaStats::default()
        };
        for (slot, record) in slots.records.iter().enumerate() {
            let Some(record) = record else { continue };
            if released.contains(&slot) {
                continue;
            }
            stats.live += 1;
            if record.epoch < current_epoch {
                stats.outdated += 1;
            }
            if record.thread != me {
                stats.foreign += 1;
            }
        }
        stats
    }
}

/// Slot of one handle. Dropping it queues the slot for release.
#[derive(Debug)]
pub(crate) struct ArenaTicket {
    inner: Arc<ArenaInner>,
    slot: usize,
}

impl Drop for ArenaTicket {
    fn drop(&mut self) {
        let pending = {
            let mut released = self.inner.released.lock();
            released.push(self.slot);
            released.len()
        };
        if pending >= REAP_THRESHOLD {
            self.inner.reap();
        }
    }
}
