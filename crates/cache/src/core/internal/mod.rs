//! Internal statistics for the blocked cache

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Internal cache statistics with atomic counters
#[derive(Debug, Default)]
pub struct CacheStats {
    pub inserts: AtomicU64,
    pub rejected: AtomicU64,
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub removals: AtomicU64,
    pub blocks_created: AtomicU64,
    pub blocks_reclaimed: AtomicU64,
    pub schedule_failures: AtomicU64,
}

impl CacheStats {
    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block_created(&self) {
        self.blocks_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block_reclaimed(&self) {
        self.blocks_reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_schedule_failure(&self) {
        self.schedule_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatistics {
        CacheStatistics {
            inserts: self.inserts.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            blocks_created: self.blocks_created.load(Ordering::Relaxed),
            blocks_reclaimed: self.blocks_reclaimed.load(Ordering::Relaxed),
            schedule_failures: self.schedule_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub inserts: u64,
    pub rejected: u64,
    pub hits: u64,
    pub misses: u64,
    pub removals: u64,
    pub blocks_created: u64,
    pub blocks_reclaimed: u64,
    pub schedule_failures: u64,
}

impl CacheStatistics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
