//! Background reclamation task management

use std::hash::Hash;
use std::sync::Arc;

use crate::block::Block;
use crate::clock::Timestamp;
use crate::core::types::{Cache, CacheInner};
use crate::scheduler::Job;

/// Schedule the one-shot task that drops `block` at its horizon.
///
/// On failure the block is parked so the next insert can retry or reclaim it.
/// Returns whether a task was scheduled.
pub(in crate::core) fn schedule_reclaim<K, V>(
    inner: &Arc<CacheInner<K, V>>,
    block: &Arc<Block<V>>,
    now: Timestamp,
) -> bool
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let id = block.id();
    let delay = block.reclaim_delay(now);
    let weak = Arc::downgrade(inner);

    // The task must not keep a dropped cache alive
    let job: Job = Box::new(move || {
        if let Some(inner) = weak.upgrade() {
            Cache::reclaim_block(&inner, id);
        }
    });

    match inner.scheduler.schedule(delay, job) {
        Ok(handle) => {
            block.set_reclaim_task(handle);
            // destroy may have emptied the block set before the handle landed
            if inner.is_destroyed() {
                block.cancel_reclaim();
                tracing::trace!(block = id, "cache destroyed while scheduling, task cancelled");
                return false;
            }
            tracing::trace!(block = id, delay_ms = delay.as_millis() as u64, "scheduled block reclamation");
            true
        }
        Err(e) if inner.is_destroyed() => {
            tracing::trace!(block = id, error = %e, "cache destroyed while scheduling");
            false
        }
        Err(e) => {
            inner.stats.record_schedule_failure();
            tracing::warn!(
                block = id,
                horizon = block.horizon(),
                error = %e,
                "failed to schedule block reclamation, parking block until next insert"
            );
            inner.blocks.write().park(id);
            false
        }
    }
}
