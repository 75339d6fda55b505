//! Snapshot backend trait.

use crate::error::StoreResult;

/// Durable home of a table's committed snapshot.
///
/// Backends are opaque byte stores: they never interpret the snapshot.
/// `store` must be all-or-nothing; after it returns `Ok` the new snapshot
/// survives a restart, after it returns `Err` the previous snapshot is intact.
pub trait SnapshotBackend: Send + Sync {
    /// Loads the last stored snapshot, `None` if nothing was stored yet.
    fn load(&self) -> StoreResult<Option<Vec<u8>>>;

    /// Replaces the stored snapshot.
    fn store(&self, snapshot: &[u8]) -> StoreResult<()>;
}

impl<B: SnapshotBackend + ?Sized> SnapshotBackend for Box<B> {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        (**self).load()
    }

    fn store(&self, snapshot: &[u8]) -> StoreResult<()> {
        (**self).store(snapshot)
    }
}
