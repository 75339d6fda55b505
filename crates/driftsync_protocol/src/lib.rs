//! # DriftSync Protocol
//!
//! Record model and wire protocol for DriftSync.
//!
//! This crate provides:
//! - [`SyncRecord`], the shape every synchronized table exposes
//! - [`SyncStatus`], the client-local bookkeeping flag
//! - Protocol messages (Pull, Push) encoded as JSON
//! - Last-write-wins decisions shared by client merge and server push
//! - Clocks that hand out millisecond timestamps
//! - The HTTP envelope ([`HttpResponse`]) shared by server and client
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod conflict;
mod error;
mod http;
mod messages;
mod record;
mod task;

pub use clock::{next_stamp, Clock, ManualClock, SystemClock};
pub use conflict::{decide_merge, decide_push, Conflict, MergeDecision, PushDecision};
pub use error::{ProtocolError, ProtocolResult};
pub use http::{ErrorBody, HttpMethod, HttpResponse};
pub use messages::{
    FailureReason, PullRequest, PullResponse, PushAck, PushFailure, PushRequest, PushResponse,
};
pub use record::{DeviceId, SyncRecord, SyncStatus, Timestamp};
pub use task::Task;
