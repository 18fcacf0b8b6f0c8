//! Window advancer configuration.
//!
//! [`AdvancerConfig`] is resolved once at startup through
//! [`AdvancerConfig::builder`] and never changes afterwards. Unset values use
//! the defaults below; the API root is the only required value.

use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::{ConfigError, Window};

/// Default window length in minutes.
pub const DEFAULT_WINDOW_SPAN_MINUTES: u64 = 30;

/// Default number of posts a window needs before it starts running.
pub const DEFAULT_MIN_POSTS_THRESHOLD: u64 = 1000;

/// Default retry multiplier.
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 1.0;

/// Default delay before re-checking a window that has not elapsed, or after a failed cycle.
pub const DEFAULT_LOOP_INTERVAL: Duration = Duration::from_secs(60);

/// Default delay between evaluations of a window still in progress.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

const MS_PER_MINUTE: u64 = 60_000;

/// Immutable configuration for the window advancer.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvancerConfig {
    /// Root URL of the LoopBack API.
    pub api_root: String,
    /// Start of the first window, epoch milliseconds.
    pub system_start_time: i64,
    /// Window length in minutes.
    pub window_span_minutes: u64,
    /// Posts required in a window before it moves to `running`.
    pub min_posts_threshold: u64,
    /// Scales how long an under-filled window is retried.
    pub retry_multiplier: f64,
    /// Re-check delay for open windows and failed cycles.
    pub loop_interval: Duration,
    /// Re-check delay for windows still being watched.
    pub poll_interval: Duration,
}

impl AdvancerConfig {
    /// Start building a configuration.
    pub fn builder() -> AdvancerConfigBuilder {
        AdvancerConfigBuilder::default()
    }

    /// Window length in milliseconds.
    pub fn query_span_ms(&self) -> i64 {
        (self.window_span_minutes * MS_PER_MINUTE) as i64
    }

    /// Evaluations a window may spend under threshold before it is skipped.
    ///
    /// `floor(query_span_ms * retry_multiplier / loop_interval_ms)`. Flooring
    /// keeps the total wait within the span the multiplier allows.
    pub fn max_retries(&self) -> u32 {
        let loop_ms = self.loop_interval.as_millis() as f64;
        let retries = self.query_span_ms() as f64 * self.retry_multiplier / loop_ms;
        retries.floor() as u32
    }

    /// The window `start` belongs to, by this configuration's span.
    pub fn window_at(&self, start: i64) -> Window {
        Window::starting_at(start, self.query_span_ms())
    }
}

/// Builder for [`AdvancerConfig`].
#[derive(Debug, Clone, Default)]
pub struct AdvancerConfigBuilder {
    api_root: Option<String>,
    system_start_time: Option<i64>,
    window_span_minutes: Option<u64>,
    min_posts_threshold: Option<u64>,
    retry_multiplier: Option<f64>,
    loop_interval: Option<Duration>,
    poll_interval: Option<Duration>,
}

impl AdvancerConfigBuilder {
    pub fn api_root(mut self, api_root: impl Into<String>) -> Self {
        self.api_root = Some(api_root.into());
        self
    }

    /// Anchor for the first window. `0` counts as unset.
    pub fn system_start_time(mut self, start_ms: i64) -> Self {
        self.system_start_time = Some(start_ms);
        self
    }

    pub fn window_span_minutes(mut self, minutes: u64) -> Self {
        self.window_span_minutes = Some(minutes);
        self
    }

    pub fn min_posts_threshold(mut self, threshold: u64) -> Self {
        self.min_posts_threshold = Some(threshold);
        self
    }

    pub fn retry_multiplier(mut self, multiplier: f64) -> Self {
        self.retry_multiplier = Some(multiplier);
        self
    }

    pub fn loop_interval(mut self, interval: Duration) -> Self {
        self.loop_interval = Some(interval);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Validate and resolve, anchoring an unset start time at the current wall clock.
    pub fn build(self) -> Result<AdvancerConfig, ConfigError> {
        self.build_at(Utc::now().timestamp_millis())
    }

    /// Validate and resolve, anchoring an unset start time at `now_ms`.
    pub fn build_at(self, now_ms: i64) -> Result<AdvancerConfig, ConfigError> {
        let api_root = self
            .api_root
            .map(|root| root.trim().to_string())
            .filter(|root| !root.is_empty())
            .ok_or(ConfigError::MissingApiRoot)?;

        let window_span_minutes = self
            .window_span_minutes
            .unwrap_or(DEFAULT_WINDOW_SPAN_MINUTES);
        if window_span_minutes == 0 {
            return Err(ConfigError::InvalidWindowSpan(window_span_minutes));
        }

        let loop_interval = self.loop_interval.unwrap_or(DEFAULT_LOOP_INTERVAL);
        if loop_interval.as_millis() == 0 {
            return Err(ConfigError::InvalidLoopInterval(
                loop_interval.as_millis() as u64
            ));
        }

        let retry_multiplier = self.retry_multiplier.unwrap_or(DEFAULT_RETRY_MULTIPLIER);
        if !retry_multiplier.is_finite() || retry_multiplier < 0.0 {
            return Err(ConfigError::InvalidRetryMultiplier(retry_multiplier));
        }

        let system_start_time = match self.system_start_time.filter(|start| *start != 0) {
            Some(start) => start,
            None => {
                debug!(now_ms, "system start time not set, using current time");
                now_ms
            }
        };

        Ok(AdvancerConfig {
            api_root,
            system_start_time,
            window_span_minutes,
            min_posts_threshold: self
                .min_posts_threshold
                .unwrap_or(DEFAULT_MIN_POSTS_THRESHOLD),
            retry_multiplier,
            loop_interval,
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
        })
    }
}
