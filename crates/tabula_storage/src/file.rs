//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-based storage backend.
///
/// The backend tracks a *logical* size separately from the file length so
/// that space pre-allocated with [`StorageBackend::reserve`] is never read
/// back as data. Appends always land at the logical end.
///
/// # Durability
///
/// - `flush()` hands buffered bytes to the OS
/// - `sync()` calls `File::sync_all()`
///
/// # Example
///
/// ```no_run
/// use tabula_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("people.tdb")).unwrap();
/// backend.append(b"record").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    /// Offset where the next append goes.
    logical_size: u64,
    /// Physical length including reserved space.
    allocated: u64,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// The logical size starts out as the file length; the caller is
    /// expected to [`truncate`](StorageBackend::truncate) any trailing
    /// reserved space it finds during recovery.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = Self::open_file(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileState {
                file,
                logical_size: len,
                allocated: len,
            }),
        })
    }

    /// Opens or creates a file backend, creating parent directories if needed.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the physical file length, reserved space included.
    #[must_use]
    pub fn allocated(&self) -> u64 {
        self.inner.lock().allocated
    }

    fn open_file(path: &Path) -> StorageResult<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?)
    }

    fn rewrite_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("tabula"));
        name.push(".rewrite");
        self.path.with_file_name(name)
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut state = self.inner.lock();
        let size = state.logical_size;
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        state.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        state.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let state = self.inner.get_mut();
        let offset = state.logical_size;
        if data.is_empty() {
            return Ok(offset);
        }

        state.file.seek(SeekFrom::Start(offset))?;
        state.file.write_all(data)?;
        state.logical_size += data.len() as u64;
        state.allocated = state.allocated.max(state.logical_size);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.get_mut().file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        let state = self.inner.get_mut();
        state.file.flush()?;
        state.file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().logical_size)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let state = self.inner.get_mut();
        if new_size > state.allocated {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: state.logical_size,
            });
        }

        state.file.set_len(new_size)?;
        state.file.sync_all()?;
        state.logical_size = new_size;
        state.allocated = new_size;
        Ok(())
    }

    fn reserve(&mut self, bytes: u64) -> StorageResult<u64> {
        let state = self.inner.get_mut();
        let wanted = state.logical_size.saturating_add(bytes);
        if wanted > state.allocated {
            state.file.allocate(wanted)?;
            state.allocated = wanted;
        }
        Ok(state.allocated - state.logical_size)
    }

    fn rewrite(&mut self, data: &[u8]) -> StorageResult<()> {
        let tmp_path = self.rewrite_path();
        {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            tmp.write_all(data)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = Self::open_file(&self.path)?;
        let len = file.metadata()?.len();
        let state = self.inner.get_mut();
        state.file = file;
        state.logical_size = len;
        state.allocated = len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tdb");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn file_append_and_read() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("t.tdb")).unwrap();

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.read_at(0, 11).unwrap(), b"hello world");
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");
    }

    #[test]
    fn file_read_past_end_fails() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("t.tdb")).unwrap();
        backend.append(b"hello").unwrap();

        let result = backend.read_at(3, 5);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tdb");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"persistent data").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 15);
        assert_eq!(backend.read_at(0, 15).unwrap(), b"persistent data");
    }

    #[test]
    fn reserve_keeps_logical_size() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("t.tdb")).unwrap();
        backend.append(b"abc").unwrap();

        let room = backend.reserve(4096).unwrap();
        assert_eq!(room, 4096);
        assert_eq!(backend.size().unwrap(), 3);
        assert_eq!(backend.allocated(), 4099);

        // Appends land at the logical end, not after the reservation.
        assert_eq!(backend.append(b"def").unwrap(), 3);
        assert_eq!(backend.read_at(0, 6).unwrap(), b"abcdef");
    }

    #[test]
    fn reserved_space_is_visible_after_reopen_until_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tdb");
        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"abc").unwrap();
            backend.reserve(100).unwrap();
            backend.sync().unwrap();
        }

        let mut backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 103);
        backend.truncate(3).unwrap();
        assert_eq!(backend.size().unwrap(), 3);
    }

    #[test]
    fn truncate_beyond_end_fails() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("t.tdb")).unwrap();
        backend.append(b"hello").unwrap();

        let result = backend.truncate(100);
        assert!(matches!(result, Err(StorageError::TruncateBeyondEnd { .. })));
    }

    #[test]
    fn rewrite_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tdb");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"a long history of records").unwrap();

        backend.rewrite(b"compact").unwrap();
        assert_eq!(backend.size().unwrap(), 7);
        assert_eq!(backend.read_at(0, 7).unwrap(), b"compact");
        assert!(!dir.path().join("t.tdb.rewrite").exists());

        drop(backend);
        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.read_at(0, 7).unwrap(), b"compact");
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("t.tdb");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.path(), path);
        assert!(path.exists());
    }
}
