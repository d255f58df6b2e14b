//! Block reclamation and cache shutdown

mod background;

pub(super) use background::schedule_reclaim;

use crate::block::BlockId;
use crate::clock::Timestamp;
use std::hash::Hash;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::types::{Cache, CacheInner};

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Drop a block whose horizon has been reached
    pub(super) fn reclaim_block(inner: &CacheInner<K, V>, id: BlockId) {
        // The whole block leaves the set under the write lock, so no reader
        // or writer ever sees it half removed
        let reclaimed = inner.blocks.write().reclaim(id);

        match reclaimed {
            Some(block) => {
                inner.stats.record_block_reclaimed();
                tracing::debug!(
                    block = id,
                    horizon = block.horizon(),
                    members = block.len(),
                    "reclaimed block"
                );
                // Members must be gone before the sweep or their keys survive it
                drop(block);
                Self::sweep_index(inner, inner.clock.now_millis());
            }
            None => {
                tracing::trace!(block = id, "block already reclaimed");
            }
        }
    }

    /// Drop index mappings left behind by reclaimed blocks
    fn sweep_index(inner: &CacheInner<K, V>, now: Timestamp) {
        if inner.index.is_empty() {
            return;
        }
        let dropped = inner.index.retain_live(now);
        if dropped > 0 {
            tracing::debug!(dropped, remaining = inner.index.len(), "swept key index");
        }
    }

    /// Retry parked blocks, reclaiming directly those already past their horizon
    pub(super) fn service_pending(inner: &Arc<CacheInner<K, V>>, now: Timestamp) {
        let (overdue, retry) = {
            let mut blocks = inner.blocks.write();
            let mut overdue = Vec::new();
            let mut retry = Vec::new();

            for id in blocks.take_pending() {
                let Some(block) = blocks.get(id).cloned() else {
                    continue;
                };
                if block.horizon() <= now {
                    if let Some(block) = blocks.reclaim(id) {
                        overdue.push(block);
                    }
                } else {
                    retry.push(block);
                }
            }
            (overdue, retry)
        };

        let swept = !overdue.is_empty();
        for block in overdue {
            inner.stats.record_block_reclaimed();
            tracing::warn!(
                block = block.id(),
                horizon = block.horizon(),
                members = block.len(),
                "reclaimed unscheduled block on insert"
            );
        }
        if swept {
            Self::sweep_index(inner, now);
        }

        for block in retry {
            schedule_reclaim(inner, &block, now);
        }
    }

    /// Shut the cache down
    ///
    /// Outstanding reclamation tasks are cancelled: an owned scheduler is shut
    /// down, while a caller-supplied one only has this cache's tasks cancelled.
    /// Every later operation fails with [`crate::CacheError::Destroyed`].
    /// Calling this more than once is harmless.
    pub fn destroy(&self) {
        let inner = &self.inner;
        if inner.destroyed.swap(true, Ordering::AcqRel) {
            tracing::trace!("cache already destroyed");
            return;
        }

        let blocks = std::mem::take(&mut *inner.blocks.write());
        if inner.owns_scheduler {
            inner.scheduler.shutdown();
        } else {
            for block in blocks.blocks() {
                block.cancel_reclaim();
            }
        }
        inner.index.clear();

        tracing::info!(
            live_blocks = blocks.len(),
            members = blocks.member_count(),
            owns_scheduler = inner.owns_scheduler,
            "destroyed cache"
        );
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }
}
