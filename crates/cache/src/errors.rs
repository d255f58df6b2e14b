//! Error types for cache and scheduler operations

use std::time::Duration;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors returned by [`crate::Cache`] and [`crate::TimerCache`]
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Lifetime was zero or not strictly below the configured maximum
    #[error("lifetime {lifetime:?} must be non-zero and below the maximum entry life {max_entry_life:?}")]
    InvalidLifetime {
        lifetime: Duration,
        max_entry_life: Duration,
    },

    /// The cache was destroyed and can no longer be used
    #[error("cache has been destroyed")]
    Destroyed,

    /// Invalid builder or settings input
    #[error("invalid cache configuration: {message}")]
    Configuration { message: String },

    /// Background task could not be scheduled
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl CacheError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Routine rejections are expected input conditions, not faults.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidLifetime { .. })
    }

    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed)
    }
}

/// Errors reported by a [`crate::TaskScheduler`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler has been shut down")]
    ShutDown,

    #[error("scheduler refused the task: {reason}")]
    Rejected { reason: String },

    #[error("scheduler runtime unavailable: {reason}")]
    Unavailable { reason: String },
}
