//! The canonical replica's pull and push rules.

use crate::error::ServerResult;
use driftsync_protocol::{
    decide_push, next_stamp, Clock, DeviceId, FailureReason, PullRequest, PullResponse,
    PushDecision, PushFailure, PushRequest, PushResponse, SyncRecord, SystemClock, Timestamp,
};
use driftsync_store::{RecordFilter, RecordStore};
use parking_lot::Mutex;
use std::marker::PhantomData;
use tracing::{debug, info, warn};

/// Serves pulls and applies pushes against the server store.
///
/// Every push batch is one store transaction stamped with one server time.
/// Stamps strictly increase across batches even if the wall clock goes
/// backwards.
pub struct Reconciler<R, S> {
    store: S,
    clock: Box<dyn Clock>,
    high_water: Mutex<Timestamp>,
    _record: PhantomData<fn() -> R>,
}

impl<R, S> Reconciler<R, S>
where
    R: SyncRecord,
    S: RecordStore<R>,
{
    /// Opens a reconciler over `store`, seeding the stamp high-water mark
    /// from the newest stored record.
    pub fn open(store: S) -> ServerResult<Self> {
        let high_water = store
            .select(&RecordFilter::all())?
            .iter()
            .map(SyncRecord::updated_at)
            .max()
            .unwrap_or(0);
        debug!(high_water, "reconciler opened");

        Ok(Self {
            store,
            clock: Box::new(SystemClock),
            high_water: Mutex::new(high_water),
            _record: PhantomData,
        })
    }

    /// Replaces the clock used for server stamps.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Returns the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Largest stamp issued so far.
    pub fn high_water(&self) -> Timestamp {
        *self.high_water.lock()
    }

    /// Records changed since the request cursor.
    ///
    /// An initial pull returns everything. Otherwise records last written by
    /// the requesting device are left out; it already has them.
    pub fn pull(&self, request: &PullRequest) -> ServerResult<PullResponse<R>> {
        let filter = if request.is_initial() {
            RecordFilter::all()
        } else {
            RecordFilter::all()
                .updated_after(request.since())
                .exclude_updated_by(request.device_id.as_str())
        };

        let data = self.store.select(&filter)?;
        debug!(
            since = request.since(),
            device_id = %request.device_id,
            records = data.len(),
            "served pull"
        );
        Ok(PullResponse::new(data))
    }

    /// Applies a typed push request.
    pub fn push(&self, request: &PushRequest<R>) -> ServerResult<PushResponse> {
        let items = request.data.iter().cloned().map(Ok).collect();
        self.push_items(request.device_id.as_ref(), items)
    }

    /// Applies a push batch whose items were decoded one by one.
    ///
    /// Items that failed to decode are passed through as failures. The batch
    /// is all-or-nothing at the store level: if the transaction fails no item
    /// is applied and the error is returned.
    pub fn push_items(
        &self,
        device_id: Option<&DeviceId>,
        items: Vec<Result<R, PushFailure>>,
    ) -> ServerResult<PushResponse> {
        let mut high_water = self.high_water.lock();
        let server_now = next_stamp(self.clock.now(), *high_water);
        let device = device_id.map(|id| id.as_str().to_string());

        let response = self.store.transaction(|txn| {
            let mut response = PushResponse::new();

            for item in items {
                let mut record = match item {
                    Ok(record) => record,
                    Err(failure) => {
                        response.failed.push(failure);
                        continue;
                    }
                };

                if let Err(reason) = record.validate() {
                    let id = if record.id().is_empty() {
                        PushFailure::UNKNOWN_ID
                    } else {
                        record.id()
                    };
                    debug!(id, %reason, "rejecting invalid record");
                    response.reject(id, FailureReason::Validation);
                    continue;
                }

                let existing = txn.get(record.id()).map(|stored| stored.updated_at());
                let decision = decide_push(existing, record.updated_at());
                if decision == PushDecision::Reject {
                    debug!(
                        id = record.id(),
                        incoming = record.updated_at(),
                        stored = ?existing,
                        "rejecting stale record"
                    );
                    response.reject(record.id(), FailureReason::Conflict);
                    continue;
                }

                record.set_updated_at(server_now);
                if let Some(device) = &device {
                    record.set_updated_by(Some(device.clone()));
                    if decision == PushDecision::Insert && record.created_by().is_none() {
                        record.set_created_by(Some(device.clone()));
                    }
                    if record.is_deleted() && record.deleted_by().map_or(true, str::is_empty) {
                        record.set_deleted_by(Some(device.clone()));
                    }
                }

                response.accept(record.id(), server_now);
                txn.put(record);
            }

            Ok(response)
        })?;

        if !response.success.is_empty() {
            *high_water = server_now;
        }
        if !response.failed.is_empty() {
            warn!(
                accepted = response.success.len(),
                failed = response.failed.len(),
                "push partially rejected"
            );
        }
        info!(
            server_now,
            accepted = response.success.len(),
            failed = response.failed.len(),
            device_id = device.as_deref().unwrap_or("-"),
            "applied push batch"
        );
        Ok(response)
    }

    /// Every stored record, tombstones included.
    pub fn list(&self) -> ServerResult<Vec<R>> {
        Ok(self.store.select(&RecordFilter::all())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use driftsync_protocol::{ManualClock, Task};
    use driftsync_store::{FailingBackend, InMemoryBackend, StoreError, Table};

    type ServerTable = Table<Task, InMemoryBackend>;

    fn reconciler(clock: &ManualClock, seed: Vec<Task>) -> Reconciler<Task, ServerTable> {
        let table = Table::open("tasks", InMemoryBackend::new()).unwrap();
        table
            .transaction(|txn| {
                for task in seed {
                    txn.put(task);
                }
                Ok(())
            })
            .unwrap();
        Reconciler::open(table).unwrap().with_clock(clock.clone())
    }

    fn stored(reconciler: &Reconciler<Task, ServerTable>, id: &str) -> Task {
        reconciler.store().get(id).unwrap().unwrap()
    }

    #[test]
    fn newer_push_is_accepted_and_restamped() {
        let clock = ManualClock::new(500);
        let reconciler = reconciler(&clock, vec![Task::new("item-1", "old").at(50)]);

        let response = reconciler
            .push(&PushRequest::new(vec![Task::new("item-1", "new").at(100)], None))
            .unwrap();

        assert_eq!(response.success.len(), 1);
        assert_eq!(response.success[0].id, "item-1");
        assert_eq!(response.success[0].new_updated_at, 500);
        assert!(response.failed.is_empty());

        let item = stored(&reconciler, "item-1");
        assert_eq!(item.updated_at, 500);
        assert_eq!(item.title.as_deref(), Some("new"));
    }

    #[test]
    fn stale_push_is_rejected() {
        let clock = ManualClock::new(500);
        let reconciler = reconciler(&clock, vec![Task::new("item-2", "server").at(200)]);

        let response = reconciler
            .push(&PushRequest::new(vec![Task::new("item-2", "client").at(100)], None))
            .unwrap();

        assert!(response.success.is_empty());
        assert_eq!(response.failed[0].id, "item-2");
        assert_eq!(response.failed[0].reason, FailureReason::Conflict);
        assert_eq!(stored(&reconciler, "item-2").title.as_deref(), Some("server"));
    }

    #[test]
    fn equal_timestamp_push_is_accepted() {
        let clock = ManualClock::new(500);
        let reconciler = reconciler(&clock, vec![Task::new("a", "v1").at(300)]);

        let response = reconciler
            .push(&PushRequest::new(vec![Task::new("a", "v1").at(300)], None))
            .unwrap();

        assert_eq!(response.success.len(), 1);
    }

    #[test]
    fn invalid_items_are_rejected_without_insert() {
        let clock = ManualClock::new(500);
        let reconciler = reconciler(&clock, Vec::new());
        let untitled = Task {
            id: "item-3".into(),
            updated_at: 10,
            ..Task::default()
        };

        let response = reconciler
            .push(&PushRequest::new(
                vec![untitled, Task::new("", "no id"), Task::new("ok", "fine")],
                None,
            ))
            .unwrap();

        let failed: Vec<_> = response.failed.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(failed, ["item-3", "unknown"]);
        assert!(response
            .failed
            .iter()
            .all(|f| f.reason == FailureReason::Validation));
        assert_eq!(reconciler.list().unwrap().len(), 1);
    }

    #[test]
    fn one_stamp_per_batch_and_monotonic_across_batches() {
        let clock = ManualClock::new(1_000);
        let reconciler = reconciler(&clock, Vec::new());

        let first = reconciler
            .push(&PushRequest::new(
                vec![Task::new("a", "A").at(1), Task::new("b", "B").at(1)],
                None,
            ))
            .unwrap();
        assert!(first.success.iter().all(|ack| ack.new_updated_at == 1_000));

        clock.set(900);
        let second = reconciler
            .push(&PushRequest::new(vec![Task::new("c", "C").at(1)], None))
            .unwrap();
        assert_eq!(second.success[0].new_updated_at, 1_001);
        assert_eq!(reconciler.high_water(), 1_001);
    }

    #[test]
    fn high_water_is_seeded_from_store() {
        let clock = ManualClock::new(100);
        let reconciler = reconciler(&clock, vec![Task::new("a", "A").at(5_000)]);
        assert_eq!(reconciler.high_water(), 5_000);

        let response = reconciler
            .push(&PushRequest::new(vec![Task::new("b", "B").at(1)], None))
            .unwrap();
        assert_eq!(response.success[0].new_updated_at, 5_001);
    }

    #[test]
    fn device_id_attributes_writes() {
        let clock = ManualClock::new(500);
        let reconciler = reconciler(&clock, Vec::new());
        let mut tombstone = Task::new("gone", "bye").at(10);
        tombstone.deleted_at = Some(10);

        reconciler
            .push(&PushRequest::new(
                vec![Task::new("a", "A").at(10), tombstone],
                Some(DeviceId::new("phone")),
            ))
            .unwrap();

        let a = stored(&reconciler, "a");
        assert_eq!(a.updated_by.as_deref(), Some("phone"));
        assert_eq!(a.created_by.as_deref(), Some("phone"));
        assert_eq!(stored(&reconciler, "gone").deleted_by.as_deref(), Some("phone"));
    }

    #[test]
    fn pull_filters_by_cursor_and_device() {
        let clock = ManualClock::new(500);
        let mut mine = Task::new("mine", "A").at(300);
        mine.updated_by = Some("phone".into());
        let mut theirs = Task::new("theirs", "B").at(300);
        theirs.updated_by = Some("laptop".into());
        let old = Task::new("old", "C").at(100);
        let reconciler = reconciler(&clock, vec![mine, theirs, old]);

        let initial = reconciler
            .pull(&PullRequest::new(0, DeviceId::new("phone")))
            .unwrap();
        assert_eq!(initial.data.len(), 3);

        let delta = reconciler
            .pull(&PullRequest::new(200, DeviceId::new("phone")))
            .unwrap();
        let ids: Vec<_> = delta.data.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["theirs"]);
        assert!(delta.server_changed);

        let empty = reconciler
            .pull(&PullRequest::new(300, DeviceId::new("phone")))
            .unwrap();
        assert!(empty.data.is_empty());
        assert!(!empty.server_changed);
    }

    #[test]
    fn failed_batch_applies_nothing() {
        let clock = ManualClock::new(500);
        let backend = FailingBackend::new(InMemoryBackend::new());
        let table: Table<Task, _> = Table::open("tasks", backend).unwrap();
        let reconciler: Reconciler<Task, _> = Reconciler::open(table).unwrap().with_clock(clock);

        reconciler.store().backend().arm();
        let err = reconciler
            .push(&PushRequest::new(vec![Task::new("a", "A").at(1)], None))
            .unwrap_err();

        assert!(matches!(err, ServerError::Store(StoreError::WriteFailed(_))));
        assert_eq!(reconciler.list().unwrap().len(), 0);
        assert_eq!(reconciler.high_water(), 0);
    }
}
