//! Block lifecycle, failure handling and concurrency tests

use super::Harness;
use crate::clock::{Clock, ManualClock};
use crate::config::CacheBuilder;
use crate::core::Cache;
use crate::errors::{CacheError, Result, SchedulerError};
use crate::scheduler::{Job, ManualScheduler, TaskHandle, TaskScheduler};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_entries_share_one_block() -> Result<()> {
    let h = Harness::new(5_000, 2);
    h.add(1, "a", 3_000);
    h.add(2, "b", 2_000);
    h.add(3, "c", 1_000);

    assert_eq!(h.cache.live_blocks()?, 1);
    assert_eq!(h.scheduler.pending(), 1);
    assert_eq!(h.scheduler.next_due(), Some(10_000));

    h.advance_to(1_500);
    assert_eq!(h.get(1), Some("a".to_string()));
    assert_eq!(h.get(2), Some("b".to_string()));
    assert_eq!(h.get(3), None);

    h.advance_to(6_000);
    for key in 1..=3 {
        assert_eq!(h.get(key), None);
    }
    assert_eq!(h.cache.live_blocks()?, 1);
    assert_eq!(h.cache.size()?, 3);

    assert_eq!(h.advance_to(10_000), 1);
    assert_eq!(h.cache.live_blocks()?, 0);
    assert_eq!(h.cache.size()?, 0);

    Ok(())
}

#[test]
fn test_new_block_when_horizon_exceeded() -> Result<()> {
    let h = Harness::new(5_000, 2);
    h.add(1, "a", 1_000);

    // 6000 + 4999 lands past the first horizon at 10000
    h.advance_to(6_000);
    h.add(2, "b", 4_999);

    let snapshot = h.cache.snapshot()?;
    assert_eq!(snapshot.live_blocks(), 2);
    assert_eq!(snapshot.blocks[0].horizon, 10_000);
    assert_eq!(snapshot.blocks[1].created_at, 6_000);
    assert_eq!(snapshot.blocks[1].horizon, 16_000);
    assert_eq!(snapshot.current_block, Some(snapshot.blocks[1].id));
    assert_eq!(h.scheduler.pending(), 2);

    // An entry that fits the current block does not open another
    h.add(3, "c", 4_000);
    assert_eq!(h.cache.live_blocks()?, 2);

    assert_eq!(h.advance_to(10_000), 1);
    assert_eq!(h.cache.live_blocks()?, 1);
    assert_eq!(h.get(2), Some("b".to_string()));

    assert_eq!(h.advance_to(16_000), 1);
    assert_eq!(h.cache.live_blocks()?, 0);
    assert_eq!(h.cache.statistics().blocks_created, 2);

    Ok(())
}

#[test]
fn test_burst_uses_single_block() -> Result<()> {
    let h = Harness::new(5_000, 2);
    for key in 0..100_000u64 {
        h.cache
            .add(key, "v".to_string(), Duration::from_millis(1 + key % 4_999))?;
    }

    assert_eq!(h.cache.live_blocks()?, 1);
    assert_eq!(h.cache.size()?, 100_000);
    assert_eq!(h.scheduler.pending(), 1);

    Ok(())
}

#[test]
fn test_steady_inserts_keep_two_blocks() -> Result<()> {
    let h = Harness::new(5_000, 2);
    let mut peak = 0;

    for step in 0..600u64 {
        h.advance_to(step * 100);
        let lifetime = 1 + (step * 37) % 4_999;
        h.add(step, "v", lifetime);
        peak = peak.max(h.cache.live_blocks()?);
    }

    assert!(peak <= 2, "saw {peak} live blocks");
    assert!(h.cache.statistics().blocks_created > 2);
    Ok(())
}

#[test]
fn test_reclaim_sweeps_key_index() -> Result<()> {
    let h = Harness::new(5_000, 2);
    for key in 0..10_000u64 {
        h.add(key, "v", 1 + key % 4_999);
    }
    h.advance_to(6_000);
    h.add(10_000, "late", 4_999);
    assert_eq!(h.cache.snapshot()?.indexed_keys, 10_001);

    assert_eq!(h.advance_to(10_000), 1);
    let snapshot = h.cache.snapshot()?;
    assert_eq!(snapshot.indexed_keys, 1);
    assert_eq!(h.get(10_000), Some("late".to_string()));

    assert_eq!(h.advance_to(50_000), 1);
    let snapshot = h.cache.snapshot()?;
    assert_eq!(snapshot.indexed_keys, 0);
    assert_eq!(snapshot.live_blocks(), 0);
    assert_eq!(snapshot.members(), 0);

    Ok(())
}

#[test]
fn test_refused_schedule_reclaimed_on_insert() -> Result<()> {
    let h = Harness::new(5_000, 2);
    h.scheduler.refuse_tasks(true);

    h.add(1, "a", 1_000);
    assert_eq!(h.get(1), Some("a".to_string()));
    assert_eq!(h.scheduler.pending(), 0);

    let snapshot = h.cache.snapshot()?;
    assert_eq!(snapshot.pending_blocks, 1);
    assert_eq!(snapshot.stats.schedule_failures, 1);

    h.scheduler.refuse_tasks(false);
    assert_eq!(h.advance_to(10_000), 0);
    assert_eq!(h.cache.live_blocks()?, 1);

    // Overdue parked block is dropped before the new entry is placed
    h.add(2, "b", 1_000);
    let snapshot = h.cache.snapshot()?;
    assert_eq!(snapshot.live_blocks(), 1);
    assert_eq!(snapshot.members(), 1);
    assert_eq!(snapshot.pending_blocks, 0);
    assert_eq!(snapshot.stats.blocks_reclaimed, 1);
    assert_eq!(snapshot.indexed_keys, 1);
    assert_eq!(h.scheduler.pending(), 1);
    assert_eq!(h.get(2), Some("b".to_string()));

    Ok(())
}

#[test]
fn test_parked_block_rescheduled_on_insert() -> Result<()> {
    let h = Harness::new(5_000, 2);
    h.scheduler.refuse_tasks(true);
    h.add(1, "a", 1_000);
    h.scheduler.refuse_tasks(false);

    h.advance_to(2_000);
    h.add(2, "b", 1_000);

    assert_eq!(h.cache.live_blocks()?, 1);
    assert_eq!(h.cache.snapshot()?.pending_blocks, 0);
    assert_eq!(h.scheduler.next_due(), Some(10_000));

    assert_eq!(h.advance_to(10_000), 1);
    assert_eq!(h.cache.live_blocks()?, 0);

    Ok(())
}

#[test]
fn test_destroy_with_shared_scheduler() -> Result<()> {
    let h = Harness::new(5_000, 2);
    h.add(1, "a", 1_000);
    h.advance_to(6_000);
    h.add(2, "b", 4_999);
    assert_eq!(h.scheduler.pending(), 2);

    h.cache.destroy();
    assert!(h.cache.is_destroyed());
    assert_eq!(h.scheduler.pending(), 0);
    assert!(!h.scheduler.is_shutdown());

    h.cache.destroy();

    assert!(matches!(h.cache.get(&2), Err(CacheError::Destroyed)));
    assert!(matches!(h.cache.contains(&2), Err(CacheError::Destroyed)));
    assert!(matches!(h.cache.remove(&2), Err(CacheError::Destroyed)));
    assert!(matches!(h.cache.size(), Err(CacheError::Destroyed)));
    assert!(matches!(h.cache.snapshot(), Err(CacheError::Destroyed)));
    assert!(matches!(
        h.cache.add(3, "c".to_string(), Duration::from_millis(10)),
        Err(CacheError::Destroyed)
    ));

    // Counters remain readable
    assert_eq!(h.cache.statistics().inserts, 2);

    // Nothing left behind fires
    assert_eq!(h.advance_to(20_000), 0);
    Ok(())
}

/// Destroys its target cache from inside `schedule`
#[derive(Debug)]
struct DestroyingScheduler {
    inner: Arc<ManualScheduler>,
    target: Mutex<Option<Cache<u64, String>>>,
}

impl TaskScheduler for DestroyingScheduler {
    fn schedule(
        &self,
        delay: Duration,
        job: Job,
    ) -> std::result::Result<TaskHandle, SchedulerError> {
        if let Some(cache) = self.target.lock().take() {
            cache.destroy();
        }
        self.inner.schedule(delay, job)
    }

    fn shutdown(&self) {
        self.inner.shutdown();
    }

    fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown()
    }
}

#[test]
fn test_destroy_during_schedule_cancels_task() -> Result<()> {
    let clock = Arc::new(ManualClock::new(0));
    let manual = Arc::new(ManualScheduler::new(Arc::clone(&clock)));
    let scheduler = Arc::new(DestroyingScheduler {
        inner: manual.clone(),
        target: Mutex::new(None),
    });
    let cache: Cache<u64, String> = CacheBuilder::new()
        .with_max_entry_life(Duration::from_millis(5_000))
        .with_clock(clock.clone())
        .with_scheduler(scheduler.clone())
        .build()?;
    *scheduler.target.lock() = Some(cache.clone());

    cache.add(1, "a".to_string(), Duration::from_millis(1_000))?;
    assert!(cache.is_destroyed());
    assert_eq!(manual.pending(), 0);
    assert_eq!(cache.statistics().schedule_failures, 0);
    assert_eq!(manual.advance(Duration::from_millis(20_000)), 0);

    Ok(())
}

#[test]
fn test_destroy_shuts_down_owned_scheduler() -> Result<()> {
    let clock = Arc::new(ManualClock::new(0));
    let scheduler = Arc::new(ManualScheduler::new(Arc::clone(&clock)));
    let cache: Cache<u64, String> = CacheBuilder::new()
        .with_max_entry_life(Duration::from_millis(5_000))
        .with_clock(clock.clone())
        .with_owned_scheduler(scheduler.clone())
        .build()?;
    assert!(cache.owns_scheduler());

    cache.add(1, "a".to_string(), Duration::from_millis(1_000))?;
    cache.destroy();

    assert!(scheduler.is_shutdown());
    assert_eq!(scheduler.pending(), 0);
    Ok(())
}

#[test]
fn test_reclaim_after_cache_dropped() {
    let clock = Arc::new(ManualClock::new(0));
    let scheduler = Arc::new(ManualScheduler::new(Arc::clone(&clock)));
    let cache: Cache<u64, String> = CacheBuilder::new()
        .with_max_entry_life(Duration::from_millis(5_000))
        .with_clock(clock.clone())
        .with_scheduler(scheduler.clone())
        .build()
        .unwrap();

    cache
        .add(1, "a".to_string(), Duration::from_millis(1_000))
        .unwrap();
    drop(cache);

    // The task still runs, finds nothing and returns
    assert_eq!(scheduler.advance(Duration::from_millis(10_000)), 1);
}

#[test]
fn test_concurrent_inserts_during_reclamation() {
    const WRITERS: u64 = 4;
    const KEYS_PER_WRITER: u64 = 50;
    const LIFETIME_MS: u64 = 4_000;

    let h = Harness::new(5_000, 2);
    let done = AtomicBool::new(false);

    let written: Vec<HashMap<u64, (u64, String)>> = thread::scope(|s| {
        let ticker = s.spawn(|| {
            while !done.load(Ordering::Acquire) {
                h.scheduler.advance(Duration::from_millis(7));
                thread::yield_now();
            }
        });

        let writers: Vec<_> = (0..WRITERS)
            .map(|writer| {
                let h = &h;
                s.spawn(move || {
                    let mut last = HashMap::new();
                    for round in 0..200 {
                        for offset in 0..KEYS_PER_WRITER {
                            let key = writer * KEYS_PER_WRITER + offset;
                            let value = format!("{writer}-{round}");
                            let started = h.clock.now_millis();
                            h.add(key, &value, LIFETIME_MS);
                            last.insert(key, (started, value));
                        }
                    }
                    last
                })
            })
            .collect();

        let written = writers
            .into_iter()
            .map(|writer| writer.join().unwrap())
            .collect();
        done.store(true, Ordering::Release);
        ticker.join().unwrap();
        written
    });

    let now = h.clock.now_millis();
    for (key, (started, value)) in written.into_iter().flatten() {
        match h.get(key) {
            Some(found) => assert_eq!(found, value, "key {key} resurrected an older value"),
            None => assert!(
                now >= started + LIFETIME_MS,
                "key {key} written at {started} missing at {now}"
            ),
        }
    }

    let snapshot = h.cache.snapshot().unwrap();
    assert_eq!(
        snapshot.stats.blocks_created - snapshot.stats.blocks_reclaimed,
        snapshot.live_blocks() as u64
    );
}
