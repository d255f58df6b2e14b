//! Coalesced-expiry TTL cache
//!
//! Values are stored under keys with a caller-chosen lifetime and become
//! unreachable once it lapses. Instead of one timer per key, entries are
//! grouped into coarse [`block::Block`]s that share a single reclamation task:
//!
//! - Entries are checked against their own expiry on every read (lazy expiry)
//! - Each block is dropped wholesale once its horizon passes
//! - Time and task scheduling are injected through [`Clock`] and [`TaskScheduler`]
//!
//! [`TimerCache`] is the one-timer-per-key baseline kept for comparison.

pub mod block;
pub mod clock;
pub mod config;
pub mod core;
pub mod entry;
pub mod errors;
pub mod index;
pub mod scheduler;
pub mod timer;

pub use self::core::{BlockSnapshot, Cache, CacheSnapshot, CacheStatistics};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp, TokioClock};
pub use config::{CacheBuilder, CacheSettings, DEFAULT_BLOCK_WIDTH};
pub use errors::{CacheError, Result, SchedulerError};
pub use scheduler::{Job, ManualScheduler, TaskHandle, TaskScheduler, TokioScheduler};
pub use timer::TimerCache;
