//! Core cache types and structures

use crate::block::BlockSet;
use crate::clock::Clock;
use crate::index::KeyIndex;
use crate::scheduler::TaskScheduler;
use parking_lot::RwLock;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::internal::CacheStats;

/// Coalesced-expiry TTL cache
///
/// Cloning is cheap and yields another handle to the same cache.
pub struct Cache<K, V>
where
    K: Eq + Hash,
{
    pub(super) inner: Arc<CacheInner<K, V>>,
}

impl<K, V> Clone for Cache<K, V>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(super) struct CacheInner<K, V>
where
    K: Eq + Hash,
{
    /// Exclusive upper bound on entry lifetimes
    pub max_entry_life: Duration,
    /// How long a block stays live: `block_width * max_entry_life`
    pub block_span_ms: u64,
    pub block_width: u32,
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<dyn TaskScheduler>,
    /// Whether `destroy` may shut the scheduler down
    pub owns_scheduler: bool,
    /// Authoritative owner of every entry
    pub blocks: RwLock<BlockSet<V>>,
    /// Non-owning key lookup
    pub index: KeyIndex<K, V>,
    pub stats: CacheStats,
    pub destroyed: AtomicBool,
}

impl<K, V> CacheInner<K, V>
where
    K: Eq + Hash,
{
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl<K, V> Drop for CacheInner<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        // Outstanding reclamation tasks only hold weak references, but an
        // owned scheduler has no other user left
        if self.owns_scheduler && !self.scheduler.is_shutdown() {
            self.scheduler.shutdown();
        }
    }
}

impl<K, V> std::fmt::Debug for Cache<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let blocks = self.inner.blocks.read();
        f.debug_struct("Cache")
            .field("max_entry_life", &self.inner.max_entry_life)
            .field("block_width", &self.inner.block_width)
            .field("live_blocks", &blocks.len())
            .field("indexed_keys", &self.inner.index.len())
            .field("destroyed", &self.inner.is_destroyed())
            .finish()
    }
}
