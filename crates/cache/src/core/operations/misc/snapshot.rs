//! Diagnostic snapshots of the block set

use crate::block::BlockId;
use crate::clock::Timestamp;
use crate::core::internal::CacheStatistics;
use crate::core::types::Cache;
use crate::errors::{CacheError, Result};
use serde::Serialize;
use std::hash::Hash;

/// State of one live block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockSnapshot {
    pub id: BlockId,
    pub created_at: Timestamp,
    pub horizon: Timestamp,
    /// Raw member count
    pub members: usize,
    /// Members already past their own expiry
    pub expired_members: usize,
}

/// Point-in-time view of the cache
#[derive(Debug, Clone, Serialize)]
pub struct CacheSnapshot {
    pub now: Timestamp,
    /// Live blocks ordered by id, oldest first
    pub blocks: Vec<BlockSnapshot>,
    pub current_block: Option<BlockId>,
    /// Index mappings, stale ones included
    pub indexed_keys: usize,
    /// Blocks waiting for a reclamation task
    pub pending_blocks: usize,
    pub stats: CacheStatistics,
}

impl CacheSnapshot {
    pub fn live_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn members(&self) -> usize {
        self.blocks.iter().map(|block| block.members).sum()
    }

    pub fn expired_members(&self) -> usize {
        self.blocks.iter().map(|block| block.expired_members).sum()
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn snapshot(&self) -> Result<CacheSnapshot> {
        let inner = &self.inner;
        if inner.is_destroyed() {
            return Err(CacheError::Destroyed);
        }

        let now = inner.clock.now_millis();
        let blocks = inner.blocks.read();
        let mut block_snapshots: Vec<BlockSnapshot> = blocks
            .blocks()
            .map(|block| BlockSnapshot {
                id: block.id(),
                created_at: block.created_at(),
                horizon: block.horizon(),
                members: block.len(),
                expired_members: block.expired_members(now),
            })
            .collect();
        block_snapshots.sort_by_key(|block| block.id);

        Ok(CacheSnapshot {
            now,
            blocks: block_snapshots,
            current_block: blocks.current_id(),
            indexed_keys: inner.index.len(),
            pending_blocks: blocks.pending_len(),
            stats: inner.stats.snapshot(),
        })
    }
}
