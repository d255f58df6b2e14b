//! Miscellaneous cache operations

mod snapshot;
mod stats;

pub use snapshot::{BlockSnapshot, CacheSnapshot};

use crate::core::types::Cache;
use crate::errors::{CacheError, Result};
use std::hash::Hash;
use std::time::Duration;

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Number of entries held by live blocks
    ///
    /// Counts raw block members: entries past their own expiry, superseded by
    /// a newer `add`, or removed from the index all still count until their
    /// block is reclaimed.
    pub fn size(&self) -> Result<usize> {
        if self.inner.is_destroyed() {
            return Err(CacheError::Destroyed);
        }
        Ok(self.inner.blocks.read().member_count())
    }

    /// Number of live blocks, which is also the number of outstanding
    /// reclamation tasks plus any parked blocks
    pub fn live_blocks(&self) -> Result<usize> {
        if self.inner.is_destroyed() {
            return Err(CacheError::Destroyed);
        }
        Ok(self.inner.blocks.read().len())
    }

    /// Drop index mappings that can no longer produce a value
    ///
    /// Returns how many mappings were dropped. Block contents are untouched.
    pub fn compact(&self) -> Result<usize> {
        if self.inner.is_destroyed() {
            return Err(CacheError::Destroyed);
        }

        let now = self.inner.clock.now_millis();
        let dropped = self.inner.index.retain_live(now);
        tracing::debug!(dropped, remaining = self.inner.index.len(), "compacted key index");
        Ok(dropped)
    }

    pub fn max_entry_life(&self) -> Duration {
        self.inner.max_entry_life
    }

    pub fn block_width(&self) -> u32 {
        self.inner.block_width
    }

    /// Whether `destroy` shuts down the scheduler
    pub fn owns_scheduler(&self) -> bool {
        self.inner.owns_scheduler
    }
}
