//! Cache insert operation and block placement

use crate::entry::Entry;
use crate::errors::{CacheError, Result};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::core::cleanup::schedule_reclaim;
use crate::core::types::Cache;

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Store `value` under `key` for `lifetime`
    ///
    /// `lifetime` must be non-zero and strictly below the configured maximum
    /// entry life; anything else is rejected with
    /// [`CacheError::InvalidLifetime`] and leaves the cache untouched. The
    /// expiry is rounded up to the next whole millisecond, so an entry is
    /// never dropped early. A previous value for `key` becomes unreachable
    /// immediately.
    pub fn add(&self, key: K, value: V, lifetime: Duration) -> Result<()> {
        let inner = &self.inner;
        if inner.is_destroyed() {
            return Err(CacheError::Destroyed);
        }

        if lifetime.is_zero() || lifetime >= inner.max_entry_life {
            inner.stats.record_rejected();
            return Err(CacheError::InvalidLifetime {
                lifetime,
                max_entry_life: inner.max_entry_life,
            });
        }

        // Strictly below max_entry_life, so rounding up stays within it
        let lifetime_ms = lifetime.as_nanos().div_ceil(1_000_000) as u64;
        let now = inner.clock.now_millis();
        let expires_at = now.saturating_add(lifetime_ms);
        let entry = Arc::new(Entry::new(value, expires_at));

        // Fast path: the current block covers this entry. Holding the read
        // lock keeps the block from being reclaimed until the entry is in.
        let has_pending = {
            let blocks = inner.blocks.read();
            if !blocks.has_pending() {
                if let Some(block) = blocks.accepting(expires_at) {
                    block.push(Arc::clone(&entry));
                    inner.index.insert(key, &entry);
                    inner.stats.record_insert();
                    return Ok(());
                }
            }
            blocks.has_pending()
        };

        if has_pending {
            Self::service_pending(inner, now);
        }

        let (block, created) = {
            let mut blocks = inner.blocks.write();
            // destroy() swaps the block set out under this lock
            if inner.is_destroyed() {
                return Err(CacheError::Destroyed);
            }
            let (block, created) = blocks.place(now, expires_at, inner.block_span_ms);
            block.push(Arc::clone(&entry));
            inner.index.insert(key, &entry);
            (block, created)
        };
        inner.stats.record_insert();

        if created {
            inner.stats.record_block_created();
            tracing::debug!(
                block = block.id(),
                created_at = block.created_at(),
                horizon = block.horizon(),
                "opened block"
            );
            schedule_reclaim(inner, &block, now);
        }

        Ok(())
    }
}
