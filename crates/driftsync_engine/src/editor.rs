//! Local write path.

use driftsync_protocol::{
    next_stamp, Clock, DeviceId, SyncRecord, SyncStatus, SystemClock, Timestamp,
};
use driftsync_store::{LocalRecord, RecordFilter, RecordStore, StoreError, StoreResult};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Applies user edits to the local replica.
///
/// Every edit restamps `updated_at` (strictly after the previous value),
/// attributes the write to this device and marks the record `modified`, in
/// one store transaction.
pub struct LocalEditor<R, S> {
    store: S,
    device_id: DeviceId,
    clock: Arc<dyn Clock>,
    _record: PhantomData<fn() -> R>,
}

impl<R, S> LocalEditor<R, S>
where
    R: SyncRecord,
    S: RecordStore<LocalRecord<R>>,
{
    /// Creates an editor using the system clock.
    pub fn new(store: S, device_id: DeviceId) -> Self {
        Self {
            store,
            device_id,
            clock: Arc::new(SystemClock),
            _record: PhantomData,
        }
    }

    /// Replaces the clock used for stamps.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Returns the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidRecord`] if the record does not validate,
    /// [`StoreError::AlreadyExists`] if the id is taken.
    pub fn create(&self, mut record: R) -> StoreResult<LocalRecord<R>> {
        validate(&record)?;
        let device = Some(self.device_id.to_string());
        record.set_updated_at(next_stamp(self.clock.now(), record.updated_at()));
        record.set_created_by(device.clone());
        record.set_updated_by(device);

        let local = LocalRecord::modified(record);
        self.store.transaction(|txn| txn.insert(local.clone()))?;
        debug!(id = %local.id(), updated_at = local.updated_at(), "created record");
        Ok(local)
    }

    /// Applies `edit` to the record with `id`.
    ///
    /// The edit may not change the id.
    pub fn update<F>(&self, id: &str, edit: F) -> StoreResult<LocalRecord<R>>
    where
        F: FnOnce(&mut R),
    {
        let updated = self.store.transaction(|txn| {
            let mut local = txn
                .get(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            let previous = local.updated_at();

            edit(&mut local.record);
            if local.id() != id {
                return Err(StoreError::InvalidRecord {
                    id: id.to_string(),
                    reason: "id cannot change".into(),
                });
            }
            validate(&local.record)?;

            self.stamp(&mut local, previous);
            txn.put(local.clone());
            Ok(local)
        })?;
        debug!(id, updated_at = updated.updated_at(), "updated record");
        Ok(updated)
    }

    /// Marks the record with `id` deleted. Deleting a tombstone is a no-op.
    pub fn soft_delete(&self, id: &str) -> StoreResult<LocalRecord<R>> {
        let deleted = self.store.transaction(|txn| {
            let mut local = txn
                .get(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            if local.is_deleted() {
                return Ok(local);
            }

            let previous = local.updated_at();
            self.stamp(&mut local, previous);
            local.set_deleted_at(Some(local.updated_at()));
            local.set_deleted_by(Some(self.device_id.to_string()));
            txn.put(local.clone());
            Ok(local)
        })?;
        debug!(id, deleted_at = ?deleted.deleted_at(), "soft-deleted record");
        Ok(deleted)
    }

    /// Looks up a record, tombstones included.
    pub fn get(&self, id: &str) -> StoreResult<Option<LocalRecord<R>>> {
        self.store.get(id)
    }

    /// Records that are not soft-deleted, ordered by id.
    pub fn list_visible(&self) -> StoreResult<Vec<LocalRecord<R>>> {
        let mut records = self.store.select(&RecordFilter::all())?;
        records.retain(|record| !record.is_deleted());
        Ok(records)
    }

    /// Records waiting to be pushed.
    pub fn pending(&self) -> StoreResult<Vec<LocalRecord<R>>> {
        self.store
            .select(&RecordFilter::all().status(SyncStatus::Modified))
    }

    fn stamp(&self, local: &mut LocalRecord<R>, previous: Timestamp) {
        local.set_updated_at(next_stamp(self.clock.now(), previous));
        local.set_updated_by(Some(self.device_id.to_string()));
        local.sync_status = SyncStatus::Modified;
    }
}

fn validate<R: SyncRecord>(record: &R) -> StoreResult<()> {
    record.validate().map_err(|reason| StoreError::InvalidRecord {
        id: record.id().to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_protocol::{ManualClock, Task};
    use driftsync_store::{InMemoryBackend, Table};

    type Editor = LocalEditor<Task, Table<LocalRecord<Task>, InMemoryBackend>>;

    fn editor(clock: &ManualClock) -> Editor {
        let table = Table::open("tasks", InMemoryBackend::new()).unwrap();
        LocalEditor::new(table, DeviceId::new("laptop")).with_clock(clock.clone())
    }

    #[test]
    fn create_stamps_and_attributes() {
        let clock = ManualClock::new(1_000);
        let editor = editor(&clock);

        let created = editor.create(Task::new("t1", "Buy milk")).unwrap();

        assert_eq!(created.updated_at(), 1_000);
        assert_eq!(created.created_by(), Some("laptop"));
        assert_eq!(created.updated_by(), Some("laptop"));
        assert!(created.is_modified());
        assert_eq!(editor.pending().unwrap().len(), 1);
    }

    #[test]
    fn create_rejects_invalid_and_duplicate_records() {
        let clock = ManualClock::new(1_000);
        let editor = editor(&clock);

        let untitled = Task {
            id: "t0".into(),
            ..Task::default()
        };
        assert!(matches!(
            editor.create(untitled),
            Err(StoreError::InvalidRecord { .. })
        ));

        editor.create(Task::new("t1", "A")).unwrap();
        assert!(matches!(
            editor.create(Task::new("t1", "B")),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn update_stamp_is_strictly_increasing() {
        let clock = ManualClock::new(1_000);
        let editor = editor(&clock);
        editor.create(Task::new("t1", "A")).unwrap();

        // Clock did not move: the stamp still advances.
        let updated = editor
            .update("t1", |task| task.title = Some("B".into()))
            .unwrap();
        assert_eq!(updated.updated_at(), 1_001);

        clock.set(500);
        let updated = editor
            .update("t1", |task| task.description = Some("later".into()))
            .unwrap();
        assert_eq!(updated.updated_at(), 1_002);
    }

    #[test]
    fn update_marks_synced_record_modified() {
        let clock = ManualClock::new(1_000);
        let editor = editor(&clock);
        editor
            .store()
            .transaction(|txn| {
                txn.put(LocalRecord::synced(Task::new("t1", "server").at(900)));
                Ok(())
            })
            .unwrap();

        let updated = editor
            .update("t1", |task| task.title = Some("mine".into()))
            .unwrap();
        assert!(updated.is_modified());
        assert_eq!(updated.updated_by(), Some("laptop"));
        assert!(matches!(
            editor.update("t1", |task| task.id = "other".into()),
            Err(StoreError::InvalidRecord { .. })
        ));
        assert!(matches!(
            editor.update("missing", |_| {}),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn soft_delete_keeps_a_tombstone() {
        let clock = ManualClock::new(1_000);
        let editor = editor(&clock);
        editor.create(Task::new("t1", "A")).unwrap();
        clock.advance(10);

        let deleted = editor.soft_delete("t1").unwrap();
        assert_eq!(deleted.deleted_at(), Some(1_010));
        assert_eq!(deleted.deleted_by(), Some("laptop"));
        assert_eq!(deleted.updated_at(), 1_010);

        assert!(editor.list_visible().unwrap().is_empty());
        assert!(editor.get("t1").unwrap().is_some());

        clock.advance(10);
        let again = editor.soft_delete("t1").unwrap();
        assert_eq!(again.updated_at(), 1_010);
    }
}
