//! Cache get operations

use crate::errors::{CacheError, Result};
use std::hash::Hash;

use crate::core::types::Cache;

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Get a value from the cache
    ///
    /// Entries past their own expiry read as absent even while their block
    /// is still live. The index is never modified here.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let inner = &self.inner;
        if inner.is_destroyed() {
            return Err(CacheError::Destroyed);
        }

        let now = inner.clock.now_millis();
        match inner.index.lookup(key) {
            Some(entry) if entry.is_live_at(now) => {
                inner.stats.record_hit();
                Ok(Some(entry.value().clone()))
            }
            Some(entry) => {
                tracing::trace!(expires_at = entry.expires_at(), now, "lookup hit expired entry");
                inner.stats.record_miss();
                Ok(None)
            }
            None => {
                inner.stats.record_miss();
                Ok(None)
            }
        }
    }

    /// Check if a live value exists for `key`
    pub fn contains(&self, key: &K) -> Result<bool> {
        if self.inner.is_destroyed() {
            return Err(CacheError::Destroyed);
        }

        let now = self.inner.clock.now_millis();
        Ok(self
            .inner
            .index
            .lookup(key)
            .is_some_and(|entry| entry.is_live_at(now)))
    }
}
