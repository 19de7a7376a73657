//! Offline till agent: a local SQLite cache plus the loop that syncs it.

pub mod client;
pub mod store;
pub mod sync;
