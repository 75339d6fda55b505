//! # DriftSync Server
//!
//! The canonical replica of DriftSync.
//!
//! This crate provides:
//! - [`Reconciler`]: pull deltas and last-write-wins push batches
//! - [`SyncServer`]: the `/api/<table>` routes over the reconciler
//! - Server-assigned timestamps, one per batch and strictly increasing
//!
//! # Protocol
//!
//! 1. Client pulls records with `updated_at` greater than its cursor, minus
//!    the ones it wrote itself
//! 2. Client pushes its modified records
//! 3. Server accepts each record whose `updated_at` is not older than the
//!    stored one, restamps it, and reports per-item success or failure
//!
//! The server never deletes records; soft-deletes are ordinary updates that
//! set `deleted_at`.
//!
//! The router is transport-agnostic: [`SyncServer::handle`] takes a method,
//! a path and a body, so any HTTP front end (or an in-process loopback) can
//! drive it.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod reconciler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use reconciler::Reconciler;
pub use server::SyncServer;
