//! Cross-process exclusion for a database file.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock on `<database>.lock`.
///
/// Held for as long as the file is open anywhere in this process. The lock is
/// released when this value is dropped (the descriptor is closed).
#[derive(Debug)]
pub(crate) struct FileLock {
    path: PathBuf,
    _file: File,
}

impl FileLock {
    /// Takes the lock for the database at `db_path` without blocking.
    ///
    /// Returns [`CoreError::DatabaseLocked`] if another process holds it.
    pub(crate) fn acquire(db_path: &Path) -> CoreResult<Self> {
        let path = lock_path(db_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| CoreError::cannot_open(&path, e.to_string()))?;
        file.try_lock_exclusive()
            .map_err(|_| CoreError::DatabaseLocked)?;
        Ok(Self { path, _file: file })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

/// `t.db` -> `t.db.lock`
pub(crate) fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
