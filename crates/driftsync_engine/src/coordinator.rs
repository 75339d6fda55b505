//! Sync coordinator: the client-side cycle.
//!
//! A cycle runs five phases in order, each committing before the next:
//!
//! ```text
//! pull -> merge -> identify -> push -> acknowledge
//! ```
//!
//! The cursor handed to the next cycle is the wall-clock time captured when
//! this cycle started. It is committable as soon as merge has succeeded,
//! whatever happens to the push.

use crate::cancel::CancelToken;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use driftsync_protocol::{
    decide_merge, Clock, Conflict, DeviceId, MergeDecision, PullRequest, PushFailure, PushRequest,
    PushResponse, SyncRecord, SyncStatus, SystemClock, Timestamp,
};
use driftsync_store::{CursorStore, LocalRecord, RecordFilter, RecordStore};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The phase the coordinator is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle has run yet.
    Idle,
    /// Waiting for the remote delta.
    Pulling,
    /// Applying the delta locally.
    Merging,
    /// Selecting modified records.
    Identifying,
    /// Waiting for the push response.
    Pushing,
    /// Marking accepted records as synced.
    Acknowledging,
    /// The last cycle completed.
    Synced,
    /// The last cycle failed.
    Error,
}

impl SyncState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Pulling
                | SyncState::Merging
                | SyncState::Identifying
                | SyncState::Pushing
                | SyncState::Acknowledging
        )
    }
}

/// Cumulative statistics across cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that reached the cursor commit point.
    pub cycles_completed: u64,
    /// Cycles that failed before it.
    pub cycles_failed: u64,
    /// Records received from pulls.
    pub records_pulled: u64,
    /// Records sent in pushes.
    pub records_pushed: u64,
    /// Records marked synced after a push.
    pub records_acknowledged: u64,
    /// Pulled records that lost to an unpushed local edit.
    pub conflicts: u64,
    /// Items the server rejected.
    pub push_failures: u64,
    /// Retries performed by [`SyncCoordinator::sync_with_retry`].
    pub retries: u64,
    /// Last completed cycle.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// What one cycle did.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Cursor the cycle pulled from.
    pub previous_cursor: Timestamp,
    /// Cursor for the next cycle.
    pub new_cursor: Timestamp,
    /// Records received.
    pub pulled: usize,
    /// Pulled records that were new locally.
    pub inserted: usize,
    /// Pulled records that replaced an older local copy.
    pub overwritten: usize,
    /// Pulled records that lost to an unpushed local edit.
    pub conflicts: Vec<Conflict>,
    /// Records sent to the server.
    pub pushed: usize,
    /// Records marked synced.
    pub acknowledged: usize,
    /// Items the server rejected; they stay modified.
    pub push_failures: Vec<PushFailure>,
    /// Why push or acknowledge did not complete, if they did not.
    pub push_error: Option<String>,
    /// Wall time of the cycle.
    pub duration: Duration,
}

impl SyncReport {
    fn new(previous_cursor: Timestamp, new_cursor: Timestamp) -> Self {
        Self {
            previous_cursor,
            new_cursor,
            pulled: 0,
            inserted: 0,
            overwritten: 0,
            conflicts: Vec::new(),
            pushed: 0,
            acknowledged: 0,
            push_failures: Vec::new(),
            push_error: None,
            duration: Duration::ZERO,
        }
    }

    /// Returns true if everything pushed was acknowledged.
    pub fn is_complete(&self) -> bool {
        self.push_error.is_none() && self.push_failures.is_empty()
    }
}

#[derive(Debug, Default)]
struct MergeSummary {
    inserted: usize,
    overwritten: usize,
    conflicts: Vec<Conflict>,
}

/// Drives sync cycles for one table of one replica.
///
/// At most one cycle runs at a time: [`sync`](Self::sync) waits for a running
/// cycle to finish, [`try_sync`](Self::try_sync) returns immediately.
pub struct SyncCoordinator<R, S, C, T> {
    config: SyncConfig,
    store: S,
    cursors: C,
    transport: T,
    clock: Box<dyn Clock>,
    device_id: DeviceId,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    in_flight: Mutex<()>,
    _record: PhantomData<fn() -> R>,
}

impl<R, S, C, T> SyncCoordinator<R, S, C, T>
where
    R: SyncRecord,
    S: RecordStore<LocalRecord<R>>,
    C: CursorStore,
    T: SyncTransport<R>,
{
    /// Creates a coordinator using the system clock.
    ///
    /// The device id is taken from the cursor store.
    pub fn new(config: SyncConfig, store: S, cursors: C, transport: T) -> Self {
        let device_id = cursors.device_id();
        Self {
            config,
            store,
            cursors,
            transport,
            clock: Box::new(SystemClock),
            device_id,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            in_flight: Mutex::new(()),
            _record: PhantomData,
        }
    }

    /// Replaces the clock used for the cycle start time.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the local store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns this replica's device id.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Returns the persisted cursor for the configured table.
    pub fn cursor(&self) -> SyncResult<Timestamp> {
        Ok(self.cursors.load(&self.config.table)?)
    }

    /// Runs one cycle from an explicit cursor.
    ///
    /// Nothing is persisted for the cursor; the caller stores
    /// `report.new_cursor` itself.
    ///
    /// # Errors
    ///
    /// Fails if pull or merge fails (store and cursor are then unchanged) or
    /// if cancelled before merge. Push problems are reported in
    /// [`SyncReport::push_error`] instead.
    pub fn sync_from(
        &self,
        previous_cursor: Timestamp,
        cancel: &CancelToken,
    ) -> SyncResult<SyncReport> {
        let _cycle = self.in_flight.lock();
        let report = self.run_cycle(previous_cursor, cancel)?;
        self.record_success(&report);
        Ok(report)
    }

    /// Runs one cycle from the persisted cursor and persists the new one.
    ///
    /// Waits for a running cycle to finish first.
    pub fn sync(&self, cancel: &CancelToken) -> SyncResult<SyncReport> {
        let _cycle = self.in_flight.lock();
        self.sync_locked(cancel)
    }

    /// Like [`sync`](Self::sync) but returns `Ok(None)` if a cycle is already
    /// running.
    pub fn try_sync(&self, cancel: &CancelToken) -> SyncResult<Option<SyncReport>> {
        let Some(_cycle) = self.in_flight.try_lock() else {
            debug!(table = %self.config.table, "sync already in progress, skipping");
            return Ok(None);
        };
        self.sync_locked(cancel).map(Some)
    }

    /// Forgets the cursor and runs a full cycle.
    ///
    /// Local records are kept: the full pull merges by timestamp like any
    /// other, so unpushed edits survive.
    pub fn resync(&self, cancel: &CancelToken) -> SyncResult<SyncReport> {
        let _cycle = self.in_flight.lock();
        info!(table = %self.config.table, "resetting cursor for full resync");
        self.cursors.reset(&self.config.table)?;
        self.sync_locked(cancel)
    }

    /// Performs a sync with retry on transient errors.
    pub fn sync_with_retry(&self, cancel: &CancelToken) -> SyncResult<SyncReport> {
        let retry_config = &self.config.retry;
        let mut last_error = None;

        for attempt in 0..retry_config.max_attempts {
            if attempt > 0 {
                let delay = retry_config.delay_for_attempt(attempt);
                debug!(attempt, ?delay, "waiting before retry");
                std::thread::sleep(delay);
                self.stats.write().retries += 1;
            }

            cancel.check()?;

            match self.sync(cancel) {
                Ok(report) => return Ok(report),
                Err(e) => {
                    if e.is_retryable() && attempt + 1 < retry_config.max_attempts {
                        warn!(attempt, error = %e, "sync failed, retrying");
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SyncError::Protocol("no sync attempts made".into())))
    }

    fn sync_locked(&self, cancel: &CancelToken) -> SyncResult<SyncReport> {
        let previous = self.cursors.load(&self.config.table)?;
        let report = self.run_cycle(previous, cancel)?;
        self.cursors
            .save(&self.config.table, report.new_cursor)
            .map_err(|e| self.fail(e.into()))?;
        debug!(table = %self.config.table, cursor = report.new_cursor, "cursor committed");
        self.record_success(&report);
        Ok(report)
    }

    fn run_cycle(&self, previous_cursor: Timestamp, cancel: &CancelToken) -> SyncResult<SyncReport> {
        let start = Instant::now();
        let cycle_start = self.clock.now();
        let table = self.config.table.as_str();
        let mut report = SyncReport::new(previous_cursor, cycle_start);

        debug!(table, cursor = previous_cursor, "sync cycle starting");

        let pulled = self
            .pull_phase(previous_cursor, cancel)
            .map_err(|e| self.fail(e))?;
        report.pulled = pulled.len();

        let merged = cancel
            .check()
            .and_then(|()| self.merge_phase(pulled))
            .map_err(|e| self.fail(e))?;
        report.inserted = merged.inserted;
        report.overwritten = merged.overwritten;
        report.conflicts = merged.conflicts;

        if let Err(e) = self.push_phase(cancel, &mut report) {
            warn!(table, error = %e, "push incomplete, records stay modified");
            report.push_error = Some(e.to_string());
        }

        report.duration = start.elapsed();
        Ok(report)
    }

    fn record_success(&self, report: &SyncReport) {
        info!(
            table = %self.config.table,
            cursor = report.new_cursor,
            pulled = report.pulled,
            inserted = report.inserted,
            overwritten = report.overwritten,
            conflicts = report.conflicts.len(),
            pushed = report.pushed,
            acknowledged = report.acknowledged,
            failed = report.push_failures.len(),
            "sync cycle finished"
        );

        self.set_state(if report.push_error.is_none() {
            SyncState::Synced
        } else {
            SyncState::Error
        });

        let mut stats = self.stats.write();
        stats.cycles_completed += 1;
        stats.records_pulled += report.pulled as u64;
        stats.records_pushed += report.pushed as u64;
        stats.records_acknowledged += report.acknowledged as u64;
        stats.conflicts += report.conflicts.len() as u64;
        stats.push_failures += report.push_failures.len() as u64;
        stats.last_sync_time = Some(Instant::now());
        stats.last_error = report.push_error.clone();
    }

    fn pull_phase(
        &self,
        previous_cursor: Timestamp,
        cancel: &CancelToken,
    ) -> SyncResult<Vec<R>> {
        cancel.check()?;
        self.set_state(SyncState::Pulling);
        let request = PullRequest::new(previous_cursor, self.device_id.clone());
        let response = self.transport.pull(&request)?;
        debug!(
            table = %self.config.table,
            pulled = response.data.len(),
            server_changed = response.server_changed,
            "pull complete"
        );
        Ok(response.data)
    }

    fn merge_phase(&self, pulled: Vec<R>) -> SyncResult<MergeSummary> {
        self.set_state(SyncState::Merging);
        if pulled.is_empty() {
            return Ok(MergeSummary::default());
        }

        let summary = self.store.transaction(|txn| {
            let mut summary = MergeSummary::default();
            for remote in pulled {
                let local = txn.get(remote.id());
                let local_state = local
                    .as_ref()
                    .map(|record| (record.updated_at(), record.sync_status));

                match decide_merge(local_state, remote.updated_at()) {
                    MergeDecision::Insert => {
                        txn.put(LocalRecord::synced(remote));
                        summary.inserted += 1;
                    }
                    MergeDecision::Overwrite => {
                        txn.put(LocalRecord::synced(remote));
                        summary.overwritten += 1;
                    }
                    MergeDecision::Conflict => {
                        let local_at = local.as_ref().map_or(0, |record| record.updated_at());
                        summary
                            .conflicts
                            .push(Conflict::new(remote.id(), local_at, remote.updated_at()));
                    }
                    MergeDecision::Skip => {}
                }
            }
            Ok(summary)
        })?;

        for conflict in &summary.conflicts {
            warn!(
                table = %self.config.table,
                id = %conflict.id,
                local_updated_at = conflict.local_updated_at,
                remote_updated_at = conflict.remote_updated_at,
                "conflict: keeping unpushed local edit"
            );
        }
        Ok(summary)
    }

    /// Identify, push and acknowledge. Errors here never roll back the merge.
    fn push_phase(&self, cancel: &CancelToken, report: &mut SyncReport) -> SyncResult<()> {
        cancel.check()?;
        self.set_state(SyncState::Identifying);
        let pending = self
            .store
            .select(&RecordFilter::all().status(SyncStatus::Modified))?;
        if pending.is_empty() {
            debug!(table = %self.config.table, "nothing to push");
            return Ok(());
        }

        cancel.check()?;
        self.set_state(SyncState::Pushing);
        let pushed_at: HashMap<String, Timestamp> = pending
            .iter()
            .map(|record| (record.id().to_string(), record.updated_at()))
            .collect();
        let request = PushRequest::new(
            pending.into_iter().map(LocalRecord::into_inner).collect(),
            Some(self.device_id.clone()),
        );
        report.pushed = request.data.len();
        let response = self.transport.push(&request)?;

        for failure in &response.failed {
            warn!(
                table = %self.config.table,
                id = %failure.id,
                reason = %failure.reason,
                "server rejected record"
            );
        }
        report.push_failures = response.failed.clone();

        self.set_state(SyncState::Acknowledging);
        report.acknowledged = self.acknowledge(&pushed_at, &response)?;
        Ok(())
    }

    fn acknowledge(
        &self,
        pushed_at: &HashMap<String, Timestamp>,
        response: &PushResponse,
    ) -> SyncResult<usize> {
        if response.success.is_empty() {
            return Ok(0);
        }

        let acknowledged = self.store.transaction(|txn| {
            let mut acknowledged = 0;
            for ack in &response.success {
                let Some(&sent) = pushed_at.get(&ack.id) else {
                    debug!(id = %ack.id, "ignoring acknowledgment for a record not pushed");
                    continue;
                };
                let Some(mut local) = txn.get(&ack.id) else {
                    continue;
                };
                if local.updated_at() != sent {
                    debug!(id = %ack.id, "record edited during push, keeping it modified");
                    continue;
                }
                local.acknowledge(ack.new_updated_at);
                txn.put(local);
                acknowledged += 1;
            }
            Ok(acknowledged)
        })?;
        Ok(acknowledged)
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn fail(&self, error: SyncError) -> SyncError {
        warn!(table = %self.config.table, error = %error, "sync cycle failed");
        self.set_state(SyncState::Error);
        let mut stats = self.stats.write();
        stats.cycles_failed += 1;
        stats.last_error = Some(error.to_string());
        error
    }
}
