//! Last-write-wins decisions.
//!
//! Both sides of the protocol compare `updated_at` values only. The client
//! merge is strict (equal timestamps are a no-op) while the server push guard
//! admits equal timestamps so a retried push of already-applied content is
//! accepted again.

use crate::record::{SyncStatus, Timestamp};
use serde::{Deserialize, Serialize};

/// Outcome of merging one pulled record into the local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// No local copy: insert as synced.
    Insert,
    /// Remote is newer: overwrite and mark synced.
    Overwrite,
    /// Local is newer and unpushed: keep local.
    Conflict,
    /// Nothing to do.
    Skip,
}

/// Decides how a pulled record with `remote` timestamp merges into a local
/// copy described by `local`.
pub fn decide_merge(local: Option<(Timestamp, SyncStatus)>, remote: Timestamp) -> MergeDecision {
    match local {
        None => MergeDecision::Insert,
        Some((local_at, _)) if remote > local_at => MergeDecision::Overwrite,
        Some((local_at, SyncStatus::Modified)) if remote < local_at => MergeDecision::Conflict,
        Some(_) => MergeDecision::Skip,
    }
}

/// Outcome of applying one pushed record to the canonical replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDecision {
    /// Not stored yet: insert.
    Insert,
    /// Incoming is at least as new: overwrite.
    Accept,
    /// Server holds a newer version.
    Reject,
}

/// Decides whether a pushed record with `incoming` timestamp replaces the
/// stored version whose timestamp is `existing`.
pub fn decide_push(existing: Option<Timestamp>, incoming: Timestamp) -> PushDecision {
    match existing {
        None => PushDecision::Insert,
        Some(existing_at) if incoming >= existing_at => PushDecision::Accept,
        Some(_) => PushDecision::Reject,
    }
}

/// A pulled record that lost to an unpushed local edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Record id.
    pub id: String,
    /// Local `updated_at`, kept.
    pub local_updated_at: Timestamp,
    /// Remote `updated_at`, discarded for this cycle.
    pub remote_updated_at: Timestamp,
}

impl Conflict {
    /// Creates a conflict entry.
    pub fn new(id: impl Into<String>, local_updated_at: Timestamp, remote_updated_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            local_updated_at,
            remote_updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn merge_table() {
        use MergeDecision::*;
        use SyncStatus::*;

        assert_eq!(decide_merge(None, 10), Insert);
        assert_eq!(decide_merge(Some((5, Synced)), 10), Overwrite);
        assert_eq!(decide_merge(Some((5, Modified)), 10), Overwrite);
        assert_eq!(decide_merge(Some((310, Modified)), 300), Conflict);
        assert_eq!(decide_merge(Some((310, Synced)), 300), Skip);
        assert_eq!(decide_merge(Some((300, Modified)), 300), Skip);
        assert_eq!(decide_merge(Some((300, Synced)), 300), Skip);
    }

    #[test]
    fn push_table() {
        assert_eq!(decide_push(None, 100), PushDecision::Insert);
        assert_eq!(decide_push(Some(50), 100), PushDecision::Accept);
        assert_eq!(decide_push(Some(100), 100), PushDecision::Accept);
        assert_eq!(decide_push(Some(101), 100), PushDecision::Reject);
    }

    fn status() -> impl Strategy<Value = SyncStatus> {
        prop_oneof![Just(SyncStatus::Modified), Just(SyncStatus::Synced)]
    }

    proptest! {
        #[test]
        fn larger_timestamp_wins_merge(a in 0i64..1_000_000, b in 0i64..1_000_000, s in status()) {
            prop_assume!(a != b);
            let decision = decide_merge(Some((a, s)), b);
            if b > a {
                prop_assert_eq!(decision, MergeDecision::Overwrite);
            } else {
                prop_assert_ne!(decision, MergeDecision::Overwrite);
            }
        }

        #[test]
        fn larger_timestamp_wins_push(a in 0i64..1_000_000, b in 0i64..1_000_000) {
            prop_assume!(a != b);
            let decision = decide_push(Some(a), b);
            prop_assert_eq!(decision == PushDecision::Accept, b > a);
        }

        #[test]
        fn equal_timestamps_accept_on_push_and_skip_on_pull(t in 0i64..1_000_000, s in status()) {
            prop_assert_eq!(decide_push(Some(t), t), PushDecision::Accept);
            prop_assert_eq!(decide_merge(Some((t, s)), t), MergeDecision::Skip);
        }
    }
}
