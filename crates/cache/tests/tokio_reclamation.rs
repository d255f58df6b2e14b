//! Reclamation driven by real tokio timers under paused time

use blockttl::{Cache, CacheBuilder, Result, TimerCache, TokioClock, TokioScheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

fn tokio_cache<V>(max_entry_life_ms: u64) -> Result<Cache<String, V>>
where
    V: Clone + Send + Sync + 'static,
{
    CacheBuilder::new()
        .with_max_entry_life(Duration::from_millis(max_entry_life_ms))
        .with_clock(Arc::new(TokioClock::new()))
        .with_owned_scheduler(Arc::new(TokioScheduler::with_handle(Handle::current())))
        .build()
}

async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_block_reclaimed_at_horizon() -> Result<()> {
    let cache = tokio_cache::<u32>(500)?;
    cache.add("a".to_string(), 1, Duration::from_millis(200))?;
    cache.add("b".to_string(), 2, Duration::from_millis(400))?;
    assert_eq!(cache.live_blocks()?, 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(cache.get(&"a".to_string())?, None);
    assert_eq!(cache.get(&"b".to_string())?, Some(2));

    tokio::time::sleep(Duration::from_millis(600)).await;
    settle().await;
    assert_eq!(cache.live_blocks()?, 1);
    assert_eq!(cache.size()?, 2);

    // Horizon is 2 * 500ms after the block opened
    tokio::time::sleep(Duration::from_millis(101)).await;
    settle().await;
    assert_eq!(cache.live_blocks()?, 0);
    assert_eq!(cache.size()?, 0);
    assert_eq!(cache.statistics().blocks_reclaimed, 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_destroy_stops_pending_reclamation() -> Result<()> {
    let cache = tokio_cache::<u32>(500)?;
    cache.add("a".to_string(), 1, Duration::from_millis(200))?;

    cache.destroy();
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;

    assert!(cache.is_destroyed());
    assert_eq!(cache.statistics().blocks_reclaimed, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_default_cache_inside_runtime() -> Result<()> {
    let cache: Cache<u64, &'static str> = Cache::new(Duration::from_secs(60))?;
    assert!(cache.owns_scheduler());

    cache.add(1, "v", Duration::from_secs(1))?;
    assert_eq!(cache.get(&1)?, Some("v"));

    cache.destroy();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_timer_cache_expires_each_key() -> Result<()> {
    let cache: TimerCache<String, u32> = CacheBuilder::new()
        .with_max_entry_life(Duration::from_millis(500))
        .with_clock(Arc::new(TokioClock::new()))
        .with_owned_scheduler(Arc::new(TokioScheduler::with_handle(Handle::current())))
        .build_timer()?;

    cache.add("a".to_string(), 1, Duration::from_millis(100))?;
    cache.add("b".to_string(), 2, Duration::from_millis(300))?;
    assert_eq!(cache.pending_timers()?, 2);

    tokio::time::sleep(Duration::from_millis(150)).await;
    settle().await;
    assert_eq!(cache.len()?, 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    settle().await;
    assert!(cache.is_empty()?);

    Ok(())
}
