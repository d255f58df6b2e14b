//! One-timer-per-key TTL cache
//!
//! Every insert schedules its own removal task. This is the layout the
//! blocked [`crate::Cache`] avoids; it is kept as a baseline for simulations
//! and benchmarks.

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;

use crate::clock::{Clock, Timestamp};
use crate::config::{CacheBuilder, ResolvedConfig};
use crate::core::internal::{CacheStats, CacheStatistics};
use crate::errors::{CacheError, Result};
use crate::scheduler::{Job, TaskHandle, TaskScheduler};

struct Slot<V> {
    value: V,
    expires_at: Timestamp,
    generation: u64,
    timer: TaskHandle,
}

struct TimerInner<K, V>
where
    K: Eq + Hash,
{
    max_entry_life: Duration,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn TaskScheduler>,
    owns_scheduler: bool,
    slots: DashMap<K, Slot<V>>,
    next_generation: AtomicU64,
    stats: CacheStats,
    destroyed: AtomicBool,
}

impl<K, V> TimerInner<K, V>
where
    K: Eq + Hash,
{
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    // Runs from the scheduler; a newer insert under the same key wins
    fn expire(&self, key: &K, generation: u64) {
        if self
            .slots
            .remove_if(key, |_, slot| slot.generation == generation)
            .is_some()
        {
            tracing::trace!(generation, "timer removed key");
        }
    }
}

impl<K, V> Drop for TimerInner<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if self.owns_scheduler && !self.scheduler.is_shutdown() {
            self.scheduler.shutdown();
        }
    }
}

/// TTL cache with one scheduled removal per key
pub struct TimerCache<K, V>
where
    K: Eq + Hash,
{
    inner: Arc<TimerInner<K, V>>,
}

impl<K, V> Clone for TimerCache<K, V>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl CacheBuilder {
    /// Builds the per-key timer baseline; `block_width` is ignored
    pub fn build_timer<K, V>(self) -> Result<TimerCache<K, V>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let ResolvedConfig {
            settings,
            clock,
            scheduler,
            owns_scheduler,
        } = self.resolve()?;

        tracing::debug!(
            max_entry_life_ms = settings.max_entry_life_ms,
            owns_scheduler,
            "created timer cache"
        );

        Ok(TimerCache {
            inner: Arc::new(TimerInner {
                max_entry_life: settings.max_entry_life(),
                clock,
                scheduler,
                owns_scheduler,
                slots: DashMap::new(),
                next_generation: AtomicU64::new(0),
                stats: CacheStats::default(),
                destroyed: AtomicBool::new(false),
            }),
        })
    }
}

impl<K, V> TimerCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(max_entry_life: Duration) -> Result<Self> {
        CacheBuilder::new()
            .with_max_entry_life(max_entry_life)
            .build_timer()
    }

    /// Store `value` under `key` and schedule its removal
    ///
    /// Lifetime rules match [`crate::Cache::add`]. If the removal task cannot
    /// be scheduled the insert is undone: a previous value that is still live
    /// comes back with its own timer, otherwise the key reads as absent.
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
        let lifetime_ms = lifetime.as_nanos().div_ceil(1_000_000) as u64;

        let now = inner.clock.now_millis();
        let generation = inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let slot = Slot {
            value,
            expires_at: now.saturating_add(lifetime_ms),
            generation,
            timer: TaskHandle::default(),
        };
        // The previous timer stays armed until the new one is scheduled
        let previous = inner.slots.insert(key.clone(), slot);

        let weak: Weak<TimerInner<K, V>> = Arc::downgrade(inner);
        let timer_key = key.clone();
        let job: Job = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.expire(&timer_key, generation);
            }
        });

        match inner
            .scheduler
            .schedule(Duration::from_millis(lifetime_ms), job)
        {
            Ok(handle) => {
                if let Some(previous) = previous {
                    previous.timer.cancel();
                }
                match inner.slots.get_mut(&key) {
                    Some(mut slot) if slot.generation == generation => slot.timer = handle,
                    // Already replaced or expired
                    _ => handle.cancel(),
                }
                inner.stats.record_insert();
                Ok(())
            }
            Err(e) => {
                inner
                    .slots
                    .remove_if(&key, |_, slot| slot.generation == generation);
                // A concurrent insert that landed meanwhile wins over the restore
                if let Some(previous) = previous.filter(|slot| now < slot.expires_at) {
                    inner.slots.entry(key).or_insert(previous);
                }
                inner.stats.record_schedule_failure();
                tracing::warn!(error = %e, "failed to schedule key timer, insert rolled back");
                Err(CacheError::Scheduler(e))
            }
        }
    }

    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let inner = &self.inner;
        if inner.is_destroyed() {
            return Err(CacheError::Destroyed);
        }

        // Timers may run late, so expiry is still checked on read
        let now = inner.clock.now_millis();
        match inner.slots.get(key) {
            Some(slot) if now < slot.expires_at => {
                inner.stats.record_hit();
                Ok(Some(slot.value.clone()))
            }
            _ => {
                inner.stats.record_miss();
                Ok(None)
            }
        }
    }

    /// Remove `key` and cancel its timer
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        let inner = &self.inner;
        if inner.is_destroyed() {
            return Err(CacheError::Destroyed);
        }

        let now = inner.clock.now_millis();
        match inner.slots.remove(key) {
            Some((_, slot)) => {
                slot.timer.cancel();
                if now < slot.expires_at {
                    inner.stats.record_removal();
                    Ok(Some(slot.value))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// Keys currently held, expired ones whose timer has not run included
    pub fn len(&self) -> Result<usize> {
        if self.inner.is_destroyed() {
            return Err(CacheError::Destroyed);
        }
        Ok(self.inner.slots.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Removal tasks scheduled and not yet run or cancelled
    pub fn pending_timers(&self) -> Result<usize> {
        if self.inner.is_destroyed() {
            return Err(CacheError::Destroyed);
        }
        Ok(self
            .inner
            .slots
            .iter()
            .filter(|slot| !slot.timer.is_cancelled())
            .count())
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.inner.stats.snapshot()
    }

    pub fn max_entry_life(&self) -> Duration {
        self.inner.max_entry_life
    }

    /// Cancel every timer and drop all keys; later calls fail with
    /// [`CacheError::Destroyed`]
    pub fn destroy(&self) {
        let inner = &self.inner;
        if inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let keys = inner.slots.len();
        if inner.owns_scheduler {
            inner.scheduler.shutdown();
        } else {
            for slot in inner.slots.iter() {
                slot.timer.cancel();
            }
        }
        inner.slots.clear();

        tracing::info!(keys, owns_scheduler = inner.owns_scheduler, "destroyed timer cache");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }
}

impl<K, V> std::fmt::Debug for TimerCache<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerCache")
            .field("max_entry_life", &self.inner.max_entry_life)
            .field("keys", &self.inner.slots.len())
            .field("destroyed", &self.inner.is_destroyed())
            .finish()
    }
}
