//! File-based snapshot backend for persistent replicas.

use crate::backend::SnapshotBackend;
use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A snapshot backend that keeps the snapshot in a single file.
///
/// ```text
/// <dir>/
/// ├─ tasks.json        # committed snapshot
/// ├─ tasks.json.tmp    # in-flight write, renamed over the snapshot
/// └─ tasks.json.lock   # advisory lock for single-writer
/// ```
///
/// # Durability
///
/// Every `store` writes the temporary file, calls `sync_all`, then renames it
/// over the snapshot. A crash mid-write leaves the previous snapshot intact.
///
/// # Locking
///
/// The backend holds an exclusive advisory lock for its whole lifetime; a
/// second `open` of the same path fails with [`StoreError::Locked`].
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    write_guard: Mutex<()>,
    _lock_file: File,
}

impl FileBackend {
    /// Opens or creates a backend at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or another
    /// process holds the lock.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = sibling(path, "lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(lock_path));
        }

        Ok(Self {
            path: path.to_path_buf(),
            write_guard: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Returns the snapshot path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotBackend for FileBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        read_optional(&self.path)
    }

    fn store(&self, snapshot: &[u8]) -> StoreResult<()> {
        let _guard = self.write_guard.lock();
        write_atomic(&self.path, snapshot)
    }
}

/// Reads a file, returning `None` if it does not exist.
pub(crate) fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replaces `path` with `bytes` via a synced temporary file and a rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let temp_path = sibling(path, "tmp");
    {
        let mut temp = File::create(&temp_path)?;
        temp.write_all(bytes)?;
        temp.sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

pub(crate) fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}
