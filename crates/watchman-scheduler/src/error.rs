//! Error types for the scheduler.

use thiserror::Error;

use crate::Window;

/// Errors that can occur while evaluating a window.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// LoopBack API error.
    #[error("LoopBack error: {0}")]
    Loopback(#[from] watchman_loopback::LoopbackError),

    /// Stored job set carries a state this scheduler does not know.
    #[error("job set {window} has unrecognized state: {state}")]
    UnrecognizedState { window: Window, state: String },

    /// Job set changed between read and write.
    #[error("job set {0} was modified concurrently")]
    Conflict(Window),

    /// Job set expected to exist was not found.
    #[error("job set not found: {0}")]
    JobSetNotFound(Window),

    /// Post count query failed.
    #[error("post count failed: {0}")]
    Count(String),
}

/// Invalid or missing startup configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The API root was not supplied.
    #[error("missing required API root (set API_ROOT or --api-root)")]
    MissingApiRoot,

    /// Window span must be at least one minute.
    #[error("window span must be positive, got {0} minutes")]
    InvalidWindowSpan(u64),

    /// Loop interval must be at least one millisecond.
    #[error("loop interval must be positive, got {0}ms")]
    InvalidLoopInterval(u64),

    /// Retry multiplier must be a finite, non-negative number.
    #[error("retry multiplier must be finite and non-negative, got {0}")]
    InvalidRetryMultiplier(f64),
}
