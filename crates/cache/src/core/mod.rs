//! Coalesced-expiry cache implementation
//!
//! This module provides the blocked cache:
//! - Entries are appended to the current block whose horizon covers them
//! - One reclamation task per block, never per entry
//! - Reads check each entry's own expiry, so a live block never leaks stale values
//! - Block set behind a `parking_lot` lock, key index in a `DashMap`

pub mod internal;

// Private modules
mod builder;
mod cleanup;
mod operations;
mod types;

pub use internal::CacheStatistics;
pub use operations::misc::{BlockSnapshot, CacheSnapshot};
pub use types::Cache;

#[cfg(test)]
mod tests;
