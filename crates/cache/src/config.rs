//! Cache configuration with environment and file overrides
use crate::clock::{Clock, SystemClock};
use crate::errors::{CacheError, Result};
use crate::scheduler::{TaskScheduler, TokioScheduler};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Blocks absorb this many rounds of maximum-lifetime entries by default
pub const DEFAULT_BLOCK_WIDTH: u32 = 2;

/// Default ceiling on a single entry's lifetime
pub const DEFAULT_MAX_ENTRY_LIFE_MS: u64 = 60_000;

pub const ENV_MAX_ENTRY_LIFE_MS: &str = "BLOCKTTL_MAX_ENTRY_LIFE_MS";
pub const ENV_BLOCK_WIDTH: &str = "BLOCKTTL_BLOCK_WIDTH";

/// Serializable cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Exclusive upper bound on entry lifetimes, in milliseconds
    pub max_entry_life_ms: u64,
    /// Multiple of the maximum entry life covered by one block
    pub block_width: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entry_life_ms: DEFAULT_MAX_ENTRY_LIFE_MS,
            block_width: DEFAULT_BLOCK_WIDTH,
        }
    }
}

impl CacheSettings {
    /// Defaults overridden by `BLOCKTTL_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Applies `BLOCKTTL_*` environment variables on top of these settings
    pub fn merge_env(mut self) -> Result<Self> {
        if let Ok(value) = std::env::var(ENV_MAX_ENTRY_LIFE_MS) {
            self.max_entry_life_ms = value.trim().parse().map_err(|e| {
                CacheError::configuration(format!("{ENV_MAX_ENTRY_LIFE_MS}={value:?}: {e}"))
            })?;
        }

        if let Ok(value) = std::env::var(ENV_BLOCK_WIDTH) {
            self.block_width = value.trim().parse().map_err(|e| {
                CacheError::configuration(format!("{ENV_BLOCK_WIDTH}={value:?}: {e}"))
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Parses settings from a JSON document; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| CacheError::configuration(format!("invalid settings JSON: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_entry_life_ms == 0 {
            return Err(CacheError::configuration(
                "max entry life must be at least 1ms",
            ));
        }
        if self.block_width < 2 {
            return Err(CacheError::configuration(format!(
                "block width must be at least 2, got {}",
                self.block_width
            )));
        }
        if self.block_span_ms().is_none() {
            return Err(CacheError::configuration(
                "block width times max entry life overflows",
            ));
        }
        Ok(())
    }

    pub fn max_entry_life(&self) -> Duration {
        Duration::from_millis(self.max_entry_life_ms)
    }

    /// Time a block stays live: `block_width * max_entry_life`
    pub fn block_span_ms(&self) -> Option<u64> {
        self.max_entry_life_ms.checked_mul(u64::from(self.block_width))
    }
}

/// Fully resolved construction parameters shared by both cache variants
pub(crate) struct ResolvedConfig {
    pub settings: CacheSettings,
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<dyn TaskScheduler>,
    pub owns_scheduler: bool,
}

/// Builder for [`crate::Cache`] and [`crate::TimerCache`]
#[derive(Default)]
pub struct CacheBuilder {
    max_entry_life: Option<Duration>,
    block_width: Option<u32>,
    clock: Option<Arc<dyn Clock>>,
    scheduler: Option<(Arc<dyn TaskScheduler>, bool)>,
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the builder from loaded settings
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new()
            .with_max_entry_life(settings.max_entry_life())
            .with_block_width(settings.block_width)
    }

    /// Required: exclusive upper bound on entry lifetimes
    pub fn with_max_entry_life(mut self, max_entry_life: Duration) -> Self {
        self.max_entry_life = Some(max_entry_life);
        self
    }

    pub fn with_block_width(mut self, block_width: u32) -> Self {
        self.block_width = Some(block_width);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Uses a caller-owned scheduler; `destroy` leaves it running
    pub fn with_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.scheduler = Some((scheduler, false));
        self
    }

    /// Hands a scheduler over to the cache; `destroy` shuts it down
    pub fn with_owned_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.scheduler = Some((scheduler, true));
        self
    }

    pub(crate) fn resolve(self) -> Result<ResolvedConfig> {
        let max_entry_life = self
            .max_entry_life
            .ok_or_else(|| CacheError::configuration("max entry life is required"))?;

        let settings = CacheSettings {
            max_entry_life_ms: max_entry_life.as_millis().min(u128::from(u64::MAX)) as u64,
            block_width: self.block_width.unwrap_or(DEFAULT_BLOCK_WIDTH),
        };
        settings.validate()?;

        let (scheduler, owns_scheduler) = match self.scheduler {
            Some(supplied) => supplied,
            None => (Arc::new(TokioScheduler::new()?) as Arc<dyn TaskScheduler>, true),
        };

        Ok(ResolvedConfig {
            settings,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            scheduler,
            owns_scheduler,
        })
    }
}

impl std::fmt::Debug for CacheBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("max_entry_life", &self.max_entry_life)
            .field("block_width", &self.block_width)
            .field("clock", &self.clock)
            .field("scheduler", &self.scheduler.as_ref().map(|(s, owned)| (s, owned)))
            .finish()
    }
}
