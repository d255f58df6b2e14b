mod advanced;

use crate::clock::{Clock, ManualClock};
use crate::config::CacheBuilder;
use crate::core::Cache;
use crate::scheduler::ManualScheduler;
use std::sync::Arc;
use std::time::Duration;

/// Cache driven by a manual clock and scheduler, starting at t=0
struct Harness {
    cache: Cache<u64, String>,
    clock: Arc<ManualClock>,
    scheduler: Arc<ManualScheduler>,
}

impl Harness {
    fn new(max_entry_life_ms: u64, block_width: u32) -> Self {
        let clock = Arc::new(ManualClock::new(0));
        let scheduler = Arc::new(ManualScheduler::new(Arc::clone(&clock)));
        let cache = CacheBuilder::new()
            .with_max_entry_life(Duration::from_millis(max_entry_life_ms))
            .with_block_width(block_width)
            .with_clock(clock.clone())
            .with_scheduler(scheduler.clone())
            .build()
            .unwrap();
        Self {
            cache,
            clock,
            scheduler,
        }
    }

    /// Moves time to `at` ms, running reclamations that fall due
    fn advance_to(&self, at: u64) -> usize {
        let now = self.clock.now_millis();
        assert!(at >= now, "cannot move back from {now} to {at}");
        self.scheduler.advance(Duration::from_millis(at - now))
    }

    fn add(&self, key: u64, value: &str, lifetime_ms: u64) {
        self.cache
            .add(key, value.to_string(), Duration::from_millis(lifetime_ms))
            .unwrap();
    }

    fn get(&self, key: u64) -> Option<String> {
        self.cache.get(&key).unwrap()
    }
}
