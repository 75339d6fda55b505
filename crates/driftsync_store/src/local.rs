//! Client-side record schema.

use driftsync_protocol::{SyncRecord, SyncStatus, Timestamp};
use serde::{Deserialize, Serialize};

/// A record as the client stores it: the shared record plus the local-only
/// sync status column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "R: SyncRecord")]
pub struct LocalRecord<R> {
    /// The synchronized fields.
    #[serde(flatten)]
    pub record: R,
    /// Local bookkeeping.
    pub sync_status: SyncStatus,
}

impl<R: SyncRecord> LocalRecord<R> {
    /// Wraps a locally edited record.
    pub fn modified(record: R) -> Self {
        Self {
            record,
            sync_status: SyncStatus::Modified,
        }
    }

    /// Wraps a record received from, or acknowledged by, the server.
    pub fn synced(record: R) -> Self {
        Self {
            record,
            sync_status: SyncStatus::Synced,
        }
    }

    /// Returns true if the record waits to be pushed.
    pub fn is_modified(&self) -> bool {
        self.sync_status == SyncStatus::Modified
    }

    /// Applies a push acknowledgment.
    pub fn acknowledge(&mut self, new_updated_at: Timestamp) {
        self.record.set_updated_at(new_updated_at);
        self.sync_status = SyncStatus::Synced;
    }

    /// Unwraps the shared record.
    pub fn into_inner(self) -> R {
        self.record
    }
}

impl<R: SyncRecord> SyncRecord for LocalRecord<R> {
    fn id(&self) -> &str {
        self.record.id()
    }

    fn updated_at(&self) -> Timestamp {
        self.record.updated_at()
    }

    fn set_updated_at(&mut self, at: Timestamp) {
        self.record.set_updated_at(at);
    }

    fn deleted_at(&self) -> Option<Timestamp> {
        self.record.deleted_at()
    }

    fn set_deleted_at(&mut self, at: Option<Timestamp>) {
        self.record.set_deleted_at(at);
    }

    fn created_by(&self) -> Option<&str> {
        self.record.created_by()
    }

    fn set_created_by(&mut self, device: Option<String>) {
        self.record.set_created_by(device);
    }

    fn updated_by(&self) -> Option<&str> {
        self.record.updated_by()
    }

    fn set_updated_by(&mut self, device: Option<String>) {
        self.record.set_updated_by(device);
    }

    fn deleted_by(&self) -> Option<&str> {
        self.record.deleted_by()
    }

    fn set_deleted_by(&mut self, device: Option<String>) {
        self.record.set_deleted_by(device);
    }

    fn sync_status(&self) -> Option<SyncStatus> {
        Some(self.sync_status)
    }

    fn validate(&self) -> Result<(), String> {
        self.record.validate()
    }
}
