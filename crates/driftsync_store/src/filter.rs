//! Record selection predicates.

use driftsync_protocol::{SyncRecord, SyncStatus, Timestamp};

/// Predicate for batch selects. An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Only records with `updated_at` strictly greater than this.
    pub updated_after: Option<Timestamp>,
    /// Only records with this sync status. Records without a status (server
    /// side) never match a status filter.
    pub status: Option<SyncStatus>,
    /// Skip records last written by this device.
    pub exclude_updated_by: Option<String>,
}

impl RecordFilter {
    /// Creates a filter that matches everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to records written after `at`.
    pub fn updated_after(mut self, at: Timestamp) -> Self {
        self.updated_after = Some(at);
        self
    }

    /// Restricts to records with `status`.
    pub fn status(mut self, status: SyncStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Excludes records last written by `device`.
    pub fn exclude_updated_by(mut self, device: impl Into<String>) -> Self {
        self.exclude_updated_by = Some(device.into());
        self
    }

    /// Returns true if `record` satisfies every set condition.
    pub fn matches<R: SyncRecord>(&self, record: &R) -> bool {
        if let Some(after) = self.updated_after {
            if record.updated_at() <= after {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.sync_status() != Some(status) {
                return false;
            }
        }
        if let Some(device) = &self.exclude_updated_by {
            if record.updated_by() == Some(device.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalRecord;
    use driftsync_protocol::Task;

    fn task(id: &str, at: Timestamp, by: Option<&str>) -> Task {
        let mut task = Task::new(id, id).at(at);
        task.updated_by = by.map(String::from);
        task
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(RecordFilter::all().matches(&task("a", 0, None)));
    }

    #[test]
    fn timestamp_bound_is_exclusive() {
        let filter = RecordFilter::all().updated_after(100);
        assert!(!filter.matches(&task("a", 100, None)));
        assert!(filter.matches(&task("a", 101, None)));
    }

    #[test]
    fn device_exclusion_keeps_unattributed_records() {
        let filter = RecordFilter::all().exclude_updated_by("phone");
        assert!(!filter.matches(&task("a", 1, Some("phone"))));
        assert!(filter.matches(&task("b", 1, Some("laptop"))));
        assert!(filter.matches(&task("c", 1, None)));
    }

    #[test]
    fn status_filter_needs_a_status() {
        let filter = RecordFilter::all().status(SyncStatus::Modified);
        assert!(!filter.matches(&task("a", 1, None)));
        assert!(filter.matches(&LocalRecord::modified(task("a", 1, None))));
        assert!(!filter.matches(&LocalRecord::synced(task("a", 1, None))));
    }
}
