//! Periodic background sync.

use crate::cancel::CancelToken;
use crate::coordinator::SyncCoordinator;
use crate::transport::SyncTransport;
use driftsync_protocol::SyncRecord;
use driftsync_store::{CursorStore, LocalRecord, RecordStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Runs [`SyncCoordinator::try_sync`] on an interval until stopped.
///
/// Cycles run on the blocking pool. A tick that finds a cycle still running
/// is skipped rather than queued.
pub struct SyncScheduler {
    handle: JoinHandle<()>,
    cancel: CancelToken,
}

impl SyncScheduler {
    /// Spawns the scheduler on the current tokio runtime.
    ///
    /// The first cycle starts immediately.
    pub fn spawn<R, S, C, T>(
        coordinator: Arc<SyncCoordinator<R, S, C, T>>,
        interval: Duration,
        cancel: CancelToken,
    ) -> Self
    where
        R: SyncRecord,
        S: RecordStore<LocalRecord<R>> + 'static,
        C: CursorStore + 'static,
        T: SyncTransport<R> + 'static,
    {
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(table = %coordinator.config().table, ?interval, "sync scheduler started");

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let coordinator = Arc::clone(&coordinator);
                        let cycle_token = token.clone();
                        let outcome = tokio::task::spawn_blocking(move || {
                            coordinator.try_sync(&cycle_token)
                        })
                        .await;

                        match outcome {
                            Ok(Ok(Some(report))) => debug!(
                                cursor = report.new_cursor,
                                pulled = report.pulled,
                                pushed = report.pushed,
                                "scheduled sync finished"
                            ),
                            Ok(Ok(None)) => debug!("scheduled sync skipped, cycle in progress"),
                            Ok(Err(e)) => warn!(error = %e, "scheduled sync failed"),
                            Err(e) => error!(error = %e, "scheduled sync panicked"),
                        }
                    }
                }
            }

            info!("sync scheduler stopped");
        });

        Self { handle, cancel }
    }

    /// Spawns with the interval from the coordinator's configuration.
    pub fn spawn_configured<R, S, C, T>(
        coordinator: Arc<SyncCoordinator<R, S, C, T>>,
        cancel: CancelToken,
    ) -> Self
    where
        R: SyncRecord,
        S: RecordStore<LocalRecord<R>> + 'static,
        C: CursorStore + 'static,
        T: SyncTransport<R> + 'static,
    {
        let interval = coordinator.config().effective_sync_interval();
        Self::spawn(coordinator, interval, cancel)
    }

    /// Returns true until the loop has exited.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancels the loop and waits for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "sync scheduler task failed");
        }
    }
}
