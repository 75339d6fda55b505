//! CLI command implementations.

pub mod replica;
pub mod sync;
pub mod tasks;
