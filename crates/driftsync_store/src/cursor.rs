//! Sync cursors and device identity.
//!
//! A replica keeps one `last_pull_timestamp` per table next to its device
//! identifier. Both live outside the record tables.

use crate::error::{StoreError, StoreResult};
use crate::file::{read_optional, sibling, write_atomic};
use driftsync_protocol::{DeviceId, Timestamp};
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Persistence for per-table cursors and the device identity.
pub trait CursorStore: Send + Sync {
    /// The replica's device identifier.
    fn device_id(&self) -> DeviceId;

    /// Cursor for `table`, `0` if the table was never synced.
    fn load(&self, table: &str) -> StoreResult<Timestamp>;

    /// Durably stores the cursor for `table`.
    fn save(&self, table: &str, cursor: Timestamp) -> StoreResult<()>;

    /// Forgets the cursor for `table`, forcing the next pull to be a full one.
    fn reset(&self, table: &str) -> StoreResult<()>;
}

impl<C: CursorStore + ?Sized> CursorStore for Arc<C> {
    fn device_id(&self) -> DeviceId {
        (**self).device_id()
    }

    fn load(&self, table: &str) -> StoreResult<Timestamp> {
        (**self).load(table)
    }

    fn save(&self, table: &str, cursor: Timestamp) -> StoreResult<()> {
        (**self).save(table, cursor)
    }

    fn reset(&self, table: &str) -> StoreResult<()> {
        (**self).reset(table)
    }
}

/// On-disk layout of the sync state document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SyncStateDoc {
    device_id: DeviceId,
    #[serde(default)]
    cursors: BTreeMap<String, Timestamp>,
}

impl SyncStateDoc {
    fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            cursors: BTreeMap::new(),
        }
    }
}

/// Cursor store kept in memory.
#[derive(Debug)]
pub struct MemoryCursorStore {
    state: RwLock<SyncStateDoc>,
}

impl MemoryCursorStore {
    /// Creates a store for `device_id` with no cursors.
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            state: RwLock::new(SyncStateDoc::new(device_id)),
        }
    }
}

impl Default for MemoryCursorStore {
    fn default() -> Self {
        Self::new(DeviceId::generate())
    }
}

impl CursorStore for MemoryCursorStore {
    fn device_id(&self) -> DeviceId {
        self.state.read().device_id.clone()
    }

    fn load(&self, table: &str) -> StoreResult<Timestamp> {
        Ok(self.state.read().cursors.get(table).copied().unwrap_or(0))
    }

    fn save(&self, table: &str, cursor: Timestamp) -> StoreResult<()> {
        self.state.write().cursors.insert(table.to_string(), cursor);
        Ok(())
    }

    fn reset(&self, table: &str) -> StoreResult<()> {
        self.state.write().cursors.remove(table);
        Ok(())
    }
}

/// Cursor store backed by a JSON document.
///
/// ```json
/// { "device_id": "5b0c…", "cursors": { "tasks": 1718000000000 } }
/// ```
///
/// The device identifier is generated the first time the file is created and
/// is never rewritten afterwards.
#[derive(Debug)]
pub struct FileCursorStore {
    path: PathBuf,
    state: RwLock<SyncStateDoc>,
    _lock_file: File,
}

impl FileCursorStore {
    /// Opens the state file at `path`, creating it with a fresh device id if
    /// it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, corrupted or locked.
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

        let state = match read_optional(path)? {
            Some(bytes) => serde_json::from_slice::<SyncStateDoc>(&bytes)
                .map_err(|e| StoreError::Corrupted(format!("unreadable sync state: {e}")))?,
            None => {
                let state = SyncStateDoc::new(DeviceId::generate());
                write_atomic(path, &serde_json::to_vec_pretty(&state)?)?;
                info!(device_id = %state.device_id, path = %path.display(), "created device identity");
                state
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(state),
            _lock_file: lock_file,
        })
    }

    /// Returns the state file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, f: impl FnOnce(&mut SyncStateDoc)) -> StoreResult<()> {
        let mut state = self.state.write();
        let mut next = state.clone();
        f(&mut next);
        write_atomic(&self.path, &serde_json::to_vec_pretty(&next)?)?;
        *state = next;
        Ok(())
    }
}

impl CursorStore for FileCursorStore {
    fn device_id(&self) -> DeviceId {
        self.state.read().device_id.clone()
    }

    fn load(&self, table: &str) -> StoreResult<Timestamp> {
        Ok(self.state.read().cursors.get(table).copied().unwrap_or(0))
    }

    fn save(&self, table: &str, cursor: Timestamp) -> StoreResult<()> {
        debug!(table, cursor, "saving cursor");
        self.update(|state| {
            state.cursors.insert(table.to_string(), cursor);
        })
    }

    fn reset(&self, table: &str) -> StoreResult<()> {
        debug!(table, "resetting cursor");
        self.update(|state| {
            state.cursors.remove(table);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_cursors_default_to_zero() {
        let store = MemoryCursorStore::new(DeviceId::new("d1"));
        assert_eq!(store.load("tasks").unwrap(), 0);

        store.save("tasks", 1000).unwrap();
        store.save("notes", 7).unwrap();
        assert_eq!(store.load("tasks").unwrap(), 1000);

        store.reset("tasks").unwrap();
        assert_eq!(store.load("tasks").unwrap(), 0);
        assert_eq!(store.load("notes").unwrap(), 7);
    }

    #[test]
    fn file_store_keeps_identity_and_cursors_across_restarts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync_state.json");

        let device = {
            let store = FileCursorStore::open(&path).unwrap();
            store.save("tasks", 1234).unwrap();
            store.device_id()
        };

        let store = FileCursorStore::open(&path).unwrap();
        assert_eq!(store.device_id(), device);
        assert_eq!(store.load("tasks").unwrap(), 1234);
    }

    #[test]
    fn file_store_writes_cursor_next_to_device_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync_state.json");
        let store = FileCursorStore::open(&path).unwrap();
        store.save("tasks", 99).unwrap();

        let doc: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc["device_id"], store.device_id().as_str());
        assert_eq!(doc["cursors"]["tasks"], 99);
    }

    #[test]
    fn file_store_is_single_writer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync_state.json");
        let _first = FileCursorStore::open(&path).unwrap();
        assert!(matches!(
            FileCursorStore::open(&path),
            Err(StoreError::Locked(_))
        ));
    }

    #[test]
    fn corrupted_state_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync_state.json");
        fs::write(&path, b"garbage").unwrap();
        assert!(matches!(
            FileCursorStore::open(&path),
            Err(StoreError::Corrupted(_))
        ));
    }
}
