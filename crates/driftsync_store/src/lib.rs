//! # DriftSync Store
//!
//! Record Store contract and its implementation for DriftSync.
//!
//! Both replicas keep their records in a [`Table`]: a keyed collection with
//! point lookups, filtered selects and closure-scoped transactions. Writes
//! inside a transaction are staged and become visible only when the whole
//! batch has been persisted by the table's [`SnapshotBackend`].
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral replicas
//! - [`FileBackend`] - JSON snapshot on disk, replaced atomically on commit
//! - [`FailingBackend`] - Wrapper that fails writes on demand (fault injection)
//!
//! ## Example
//!
//! ```rust
//! use driftsync_protocol::Task;
//! use driftsync_store::{InMemoryBackend, RecordStore, Table, UpsertOutcome};
//!
//! let table: Table<Task, _> = Table::open("tasks", InMemoryBackend::new()).unwrap();
//! let outcome = table
//!     .transaction(|txn| txn.upsert_if_newer(Task::new("t1", "Write docs").at(10)))
//!     .unwrap();
//! assert_eq!(outcome, UpsertOutcome::Inserted);
//! assert!(table.get("t1").unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cursor;
mod error;
mod file;
mod filter;
mod local;
mod memory;
mod table;

pub use backend::SnapshotBackend;
pub use cursor::{CursorStore, FileCursorStore, MemoryCursorStore};
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use filter::RecordFilter;
pub use local::LocalRecord;
pub use memory::{FailingBackend, InMemoryBackend};
pub use table::{RecordStore, StoreTransaction, Table, UpsertOutcome};
