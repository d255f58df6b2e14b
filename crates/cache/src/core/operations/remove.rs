//! Cache remove operations

use crate::errors::{CacheError, Result};
use std::hash::Hash;

use crate::core::types::Cache;

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Remove the mapping for `key`
    ///
    /// Returns the value only if it had not expired yet. The entry itself
    /// stays in its block until the block is reclaimed.
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        let inner = &self.inner;
        if inner.is_destroyed() {
            return Err(CacheError::Destroyed);
        }

        let now = inner.clock.now_millis();
        match inner.index.remove(key) {
            Some(entry) if entry.is_live_at(now) => {
                inner.stats.record_removal();
                Ok(Some(entry.value().clone()))
            }
            _ => Ok(None),
        }
    }
}
