//! Cache construction

use crate::block::BlockSet;
use crate::config::{CacheBuilder, ResolvedConfig};
use crate::errors::Result;
use crate::index::KeyIndex;
use parking_lot::RwLock;
use std::hash::Hash;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use super::internal::CacheStats;
use super::types::{Cache, CacheInner};

impl CacheBuilder {
    /// Builds a coalesced-expiry cache
    pub fn build<K, V>(self) -> Result<Cache<K, V>>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.resolve().map(Cache::from_resolved)
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Cache with default block width, wall clock and an owned tokio scheduler
    pub fn new(max_entry_life: Duration) -> Result<Self> {
        CacheBuilder::new()
            .with_max_entry_life(max_entry_life)
            .build()
    }

    pub fn builder() -> CacheBuilder {
        CacheBuilder::new()
    }

    fn from_resolved(resolved: ResolvedConfig) -> Self {
        let ResolvedConfig {
            settings,
            clock,
            scheduler,
            owns_scheduler,
        } = resolved;

        // validate() has already rejected an overflowing span
        let block_span_ms = settings.block_span_ms().unwrap_or(u64::MAX);

        tracing::debug!(
            max_entry_life_ms = settings.max_entry_life_ms,
            block_width = settings.block_width,
            block_span_ms,
            owns_scheduler,
            "created blocked cache"
        );

        Self {
            inner: Arc::new(CacheInner {
                max_entry_life: settings.max_entry_life(),
                block_span_ms,
                block_width: settings.block_width,
                clock,
                scheduler,
                owns_scheduler,
                blocks: RwLock::new(BlockSet::new()),
                index: KeyIndex::new(),
                stats: CacheStats::default(),
                destroyed: AtomicBool::new(false),
            }),
        }
    }
}
