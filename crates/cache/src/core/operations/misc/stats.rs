//! Cache statistics operations

use crate::core::internal::CacheStatistics;
use crate::core::types::Cache;
use std::hash::Hash;

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Get cache statistics
    ///
    /// Counters survive `destroy`, so this never fails.
    pub fn statistics(&self) -> CacheStatistics {
        self.inner.stats.snapshot()
    }
}
