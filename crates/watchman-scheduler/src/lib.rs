//! Time-window job set advancement for Watchman.
//!
//! This crate provides the loop that moves job sets forward:
//! - Splits time into fixed-length windows starting at the system start time
//! - Creates one job set per window once the window has elapsed
//! - Marks a window `running` when it holds enough posts
//! - Skips a window after a bounded number of under-filled evaluations
//! - Advances to the next window once the current one is `skip` or `done`

mod advancer;
mod clock;
mod config;
mod error;
mod loopback;
mod store;
mod types;

pub use advancer::{CycleOutcome, CycleStep, WindowAdvancer};
pub use clock::{Clock, SystemClock};
pub use config::{
    AdvancerConfig, AdvancerConfigBuilder, DEFAULT_LOOP_INTERVAL, DEFAULT_MIN_POSTS_THRESHOLD,
    DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_MULTIPLIER, DEFAULT_WINDOW_SPAN_MINUTES,
};
pub use error::{ConfigError, SchedulerError};
pub use loopback::{LoopbackPostCounter, LoopbackStore};
pub use store::{JobSetStore, MemoryJobSetStore, PostCounter};
pub use types::{JobSet, JobSetState, JobSetUpdate, ParseStateError, Window};
