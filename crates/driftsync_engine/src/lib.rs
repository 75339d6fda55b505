//! # DriftSync Engine
//!
//! Client side of DriftSync.
//!
//! This crate provides:
//! - [`SyncCoordinator`], the five-phase sync cycle
//! - [`LocalEditor`], the local write path that keeps records pushable
//! - [`SyncScheduler`], periodic background sync on tokio
//! - Retry with exponential backoff
//! - HTTP transport abstraction with a loopback client
//!
//! ## Architecture
//!
//! Every cycle is **pull-then-push**:
//! 1. Pull records changed on the server since the cursor
//! 2. Merge them locally by last-write-wins on `updated_at`
//! 3. Identify records whose `sync_status` is `modified`
//! 4. Push them to the server
//! 5. Acknowledge accepted records with the server timestamp
//!
//! ## Key Invariants
//!
//! - Merge completes before identify, so the push batch never contains
//!   anything the pull just delivered
//! - A cycle that fails in pull or merge changes nothing
//! - A failed push never loses a local edit: rejected and unsent records
//!   stay `modified` and go out again next cycle
//! - Only one cycle runs per coordinator at a time

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod config;
mod coordinator;
mod editor;
mod error;
mod http;
mod scheduler;
mod transport;

pub use cancel::CancelToken;
pub use config::{RetryConfig, SyncConfig};
pub use coordinator::{SyncCoordinator, SyncReport, SyncState, SyncStats};
pub use editor::LocalEditor;
pub use error::{SyncError, SyncResult};
pub use http::{ClientError, HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use scheduler::SyncScheduler;
pub use transport::{MockTransport, SyncTransport};
