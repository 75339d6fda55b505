//! Record model shared by every synchronized table.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Client-local sync bookkeeping.
///
/// Never stored by the server and never sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local content has not been acknowledged by the server.
    Modified,
    /// Local content matches what the server acknowledged or sent.
    Synced,
}

impl SyncStatus {
    /// Returns the wire/storage name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Modified => "modified",
            SyncStatus::Synced => "synced",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable per-install identifier used for write attribution and echo
/// suppression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A row of a synchronized table.
///
/// Payload fields are opaque to the sync engine; only the identity,
/// timestamps and attribution fields below are interpreted.
pub trait SyncRecord:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Stable, globally unique identifier.
    fn id(&self) -> &str;

    /// Logical clock used for last-write-wins.
    fn updated_at(&self) -> Timestamp;

    /// Sets the logical clock.
    fn set_updated_at(&mut self, at: Timestamp);

    /// Soft-delete tombstone timestamp.
    fn deleted_at(&self) -> Option<Timestamp>;

    /// Sets or clears the tombstone.
    fn set_deleted_at(&mut self, at: Option<Timestamp>);

    /// Device that created the record.
    fn created_by(&self) -> Option<&str>;

    /// Sets the creating device.
    fn set_created_by(&mut self, device: Option<String>);

    /// Device that last wrote the record.
    fn updated_by(&self) -> Option<&str>;

    /// Sets the last writing device.
    fn set_updated_by(&mut self, device: Option<String>);

    /// Device that soft-deleted the record.
    fn deleted_by(&self) -> Option<&str>;

    /// Sets the deleting device.
    fn set_deleted_by(&mut self, device: Option<String>);

    /// Client-local sync status, `None` for server-side records.
    fn sync_status(&self) -> Option<SyncStatus> {
        None
    }

    /// Checks the fields a push needs before the record can be stored.
    fn validate(&self) -> Result<(), String> {
        if self.id().trim().is_empty() {
            return Err("missing id".into());
        }
        Ok(())
    }

    /// Returns true if the record is a tombstone.
    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}
