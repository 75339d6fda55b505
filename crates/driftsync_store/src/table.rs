//! Keyed record tables with all-or-nothing transactions.

use crate::backend::SnapshotBackend;
use crate::error::{StoreError, StoreResult};
use crate::filter::RecordFilter;
use driftsync_protocol::SyncRecord;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// The Record Store contract consumed by the coordinator and the reconciler.
pub trait RecordStore<R: SyncRecord>: Send + Sync {
    /// Point lookup by id.
    fn get(&self, id: &str) -> StoreResult<Option<R>>;

    /// Batch select, ordered by id.
    fn select(&self, filter: &RecordFilter) -> StoreResult<Vec<R>>;

    /// Number of stored records, tombstones included.
    fn count(&self) -> StoreResult<usize>;

    /// Runs `f` inside a transaction.
    ///
    /// Writes made through the transaction are applied and persisted together
    /// when `f` returns `Ok`. If `f` returns `Err`, or persisting fails, none
    /// of them are applied.
    fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut StoreTransaction<'_, R>) -> StoreResult<T>;
}

impl<R: SyncRecord, S: RecordStore<R>> RecordStore<R> for Arc<S> {
    fn get(&self, id: &str) -> StoreResult<Option<R>> {
        (**self).get(id)
    }

    fn select(&self, filter: &RecordFilter) -> StoreResult<Vec<R>> {
        (**self).select(filter)
    }

    fn count(&self) -> StoreResult<usize> {
        (**self).count()
    }

    fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut StoreTransaction<'_, R>) -> StoreResult<T>,
    {
        (**self).transaction(f)
    }
}

/// Result of a conditional upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The id was absent and the record was inserted.
    Inserted,
    /// The stored record was older and was replaced.
    Updated,
    /// The stored record was at least as new; nothing changed.
    Skipped,
}

/// Staged view over a table's committed rows.
///
/// Reads see committed rows overlaid with this transaction's own writes.
pub struct StoreTransaction<'a, R> {
    committed: &'a BTreeMap<String, R>,
    staged: BTreeMap<String, R>,
}

impl<'a, R: SyncRecord> StoreTransaction<'a, R> {
    fn new(committed: &'a BTreeMap<String, R>) -> Self {
        Self {
            committed,
            staged: BTreeMap::new(),
        }
    }

    /// Looks up a record by id.
    pub fn get(&self, id: &str) -> Option<R> {
        self.staged
            .get(id)
            .or_else(|| self.committed.get(id))
            .cloned()
    }

    /// Returns true if the id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.staged.contains_key(id) || self.committed.contains_key(id)
    }

    /// Selects records matching `filter`, ordered by id.
    pub fn select(&self, filter: &RecordFilter) -> Vec<R> {
        let mut merged: BTreeMap<&str, &R> = self
            .committed
            .iter()
            .map(|(id, record)| (id.as_str(), record))
            .collect();
        for (id, record) in &self.staged {
            merged.insert(id.as_str(), record);
        }
        merged
            .into_values()
            .filter(|record| filter.matches(*record))
            .cloned()
            .collect()
    }

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if the id is taken.
    pub fn insert(&mut self, record: R) -> StoreResult<()> {
        if self.contains(record.id()) {
            return Err(StoreError::AlreadyExists(record.id().to_string()));
        }
        self.staged.insert(record.id().to_string(), record);
        Ok(())
    }

    /// Inserts or replaces a record unconditionally.
    pub fn put(&mut self, record: R) {
        self.staged.insert(record.id().to_string(), record);
    }

    /// Inserts the record, or replaces the stored one only if the incoming
    /// `updated_at` is strictly newer.
    pub fn upsert_if_newer(&mut self, record: R) -> StoreResult<UpsertOutcome> {
        let outcome = match self.get(record.id()) {
            None => UpsertOutcome::Inserted,
            Some(existing) if record.updated_at() > existing.updated_at() => {
                UpsertOutcome::Updated
            }
            Some(_) => return Ok(UpsertOutcome::Skipped),
        };
        self.put(record);
        Ok(outcome)
    }
}

/// A durable keyed table over a [`SnapshotBackend`].
///
/// Readers never block each other; transactions are serialized by a writer
/// lock so one batch never interleaves with another.
pub struct Table<R, B> {
    name: String,
    backend: B,
    rows: RwLock<BTreeMap<String, R>>,
    writer: Mutex<()>,
}

impl<R: SyncRecord, B: SnapshotBackend> Table<R, B> {
    /// Opens a table, loading the backend's last snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or decoded.
    pub fn open(name: impl Into<String>, backend: B) -> StoreResult<Self> {
        let name = name.into();
        let rows = match backend.load()? {
            Some(bytes) => decode_snapshot::<R>(&bytes)?,
            None => BTreeMap::new(),
        };
        debug!(table = %name, rows = rows.len(), "opened table");

        Ok(Self {
            name,
            backend,
            rows: RwLock::new(rows),
            writer: Mutex::new(()),
        })
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<R: SyncRecord, B: SnapshotBackend> RecordStore<R> for Table<R, B> {
    fn get(&self, id: &str) -> StoreResult<Option<R>> {
        Ok(self.rows.read().get(id).cloned())
    }

    fn select(&self, filter: &RecordFilter) -> StoreResult<Vec<R>> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|record| filter.matches(*record))
            .cloned()
            .collect())
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.rows.read().len())
    }

    fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut StoreTransaction<'_, R>) -> StoreResult<T>,
    {
        let _writer = self.writer.lock();

        let (value, next) = {
            let committed = self.rows.read();
            let mut txn = StoreTransaction::new(&*committed);
            let value = f(&mut txn)?;

            if txn.staged.is_empty() {
                return Ok(value);
            }

            let writes = txn.staged.len();
            let mut next = committed.clone();
            next.extend(txn.staged);
            trace!(table = %self.name, writes, "committing transaction");
            (value, next)
        };

        self.backend.store(&encode_snapshot(&next)?)?;
        *self.rows.write() = next;
        Ok(value)
    }
}

fn encode_snapshot<R: SyncRecord>(rows: &BTreeMap<String, R>) -> StoreResult<Vec<u8>> {
    let records: Vec<&R> = rows.values().collect();
    Ok(serde_json::to_vec_pretty(&records)?)
}

fn decode_snapshot<R: SyncRecord>(bytes: &[u8]) -> StoreResult<BTreeMap<String, R>> {
    let records: Vec<R> = serde_json::from_slice(bytes)
        .map_err(|e| StoreError::Corrupted(format!("unreadable snapshot: {e}")))?;

    let mut rows = BTreeMap::new();
    for record in records {
        let id = record.id().to_string();
        if rows.insert(id.clone(), record).is_some() {
            return Err(StoreError::Corrupted(format!("duplicate id in snapshot: {id}")));
        }
    }
    Ok(rows)
}
