//! In-memory snapshot backends.

use crate::backend::SnapshotBackend;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An in-memory snapshot backend.
///
/// Suitable for unit tests, integration tests and replicas that do not need
/// to survive a restart. Clones share the same snapshot, which lets a test
/// reopen a table over the "same disk".
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    snapshot: Arc<RwLock<Option<Vec<u8>>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the stored snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.snapshot.read().clone()
    }
}

impl SnapshotBackend for InMemoryBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.snapshot.read().clone())
    }

    fn store(&self, snapshot: &[u8]) -> StoreResult<()> {
        *self.snapshot.write() = Some(snapshot.to_vec());
        Ok(())
    }
}

/// Wraps a backend and refuses writes while armed.
///
/// Used to exercise the all-or-nothing guarantee of transactions.
#[derive(Debug, Clone)]
pub struct FailingBackend<B> {
    inner: B,
    armed: Arc<AtomicBool>,
}

impl<B: SnapshotBackend> FailingBackend<B> {
    /// Wraps `inner`, initially disarmed.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            armed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every subsequent write fail.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Lets writes through again.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }
}

impl<B: SnapshotBackend> SnapshotBackend for FailingBackend<B> {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        self.inner.load()
    }

    fn store(&self, snapshot: &[u8]) -> StoreResult<()> {
        if self.armed.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("injected failure".into()));
        }
        self.inner.store(snapshot)
    }
}
