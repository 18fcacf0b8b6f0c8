//! Scheduler types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A closed time window, inclusive at both ends, in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    /// The window of `span_ms` milliseconds beginning at `start`.
    pub fn starting_at(start: i64, span_ms: i64) -> Self {
        Self {
            start,
            end: start + span_ms - 1,
        }
    }

    /// Length of the window in milliseconds.
    pub fn span_ms(&self) -> i64 {
        self.end - self.start + 1
    }

    /// The window immediately following this one, with the same span.
    pub fn next(&self) -> Self {
        Self::starting_at(self.end + 1, self.span_ms())
    }

    /// Whether the window has fully elapsed at `now_ms`.
    pub fn has_elapsed(&self, now_ms: i64) -> bool {
        self.end <= now_ms
    }

    /// Start of the window as a timestamp, if representable.
    pub fn start_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.start)
    }

    /// End of the window as a timestamp, if representable.
    pub fn end_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.end)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Processing state of a job set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum JobSetState {
    /// Created, not enough posts observed yet.
    #[default]
    New,
    /// Threshold met; downstream processing picks it up.
    Running,
    /// Retries exhausted without reaching the threshold.
    Skip,
    /// Finished by downstream processing.
    Done,
}

impl JobSetState {
    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobSetState::New => "new",
            JobSetState::Running => "running",
            JobSetState::Skip => "skip",
            JobSetState::Done => "done",
        }
    }

    /// Whether the scheduler is finished with a window in this state.
    pub fn is_final(&self) -> bool {
        matches!(self, JobSetState::Skip | JobSetState::Done)
    }
}

impl fmt::Display for JobSetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a [`JobSetState`] from its wire name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job set state: {0}")]
pub struct ParseStateError(pub String);

impl FromStr for JobSetState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(JobSetState::New),
            "running" => Ok(JobSetState::Running),
            "skip" => Ok(JobSetState::Skip),
            "done" => Ok(JobSetState::Done),
            other => Err(ParseStateError(other.to_string())),
        }
    }
}

/// The persisted record tracking one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSet {
    /// Store-assigned identifier.
    pub id: String,
    pub window: Window,
    pub state: JobSetState,
    /// Evaluations that found too few posts while in `new`.
    pub retries: u32,
}

impl JobSet {
    /// A freshly created job set.
    pub fn new(id: impl Into<String>, window: Window) -> Self {
        Self {
            id: id.into(),
            window,
            state: JobSetState::New,
            retries: 0,
        }
    }

    /// This job set with `update` applied.
    pub fn with_update(&self, update: JobSetUpdate) -> Self {
        let mut next = self.clone();
        match update {
            JobSetUpdate::State(state) => next.state = state,
            JobSetUpdate::Retries(retries) => next.retries = retries,
        }
        next
    }
}

/// A single-field update to a job set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSetUpdate {
    State(JobSetState),
    Retries(u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HALF_HOUR_MS: i64 = 30 * 60 * 1000;

    #[test]
    fn test_window_bounds() {
        let window = Window::starting_at(0, HALF_HOUR_MS);
        assert_eq!(window.end, 1_799_999);
        assert_eq!(window.span_ms(), HALF_HOUR_MS);
        assert_eq!(window.to_string(), "[0, 1799999]");
    }

    #[test]
    fn test_window_next_is_adjacent() {
        let window = Window::starting_at(0, HALF_HOUR_MS);
        let next = window.next();
        assert_eq!(next.start, 1_800_000);
        assert_eq!(next.end, 3_599_999);
    }

    #[test]
    fn test_window_elapsed_boundary() {
        let window = Window::starting_at(1_000, 1_000);
        assert!(!window.has_elapsed(1_998));
        assert!(window.has_elapsed(1_999));
        assert!(window.has_elapsed(5_000));
    }

    #[test]
    fn test_window_datetimes() {
        let window = Window::starting_at(0, HALF_HOUR_MS);
        assert_eq!(
            window.start_datetime().unwrap().to_rfc3339(),
            "1970-01-01T00:00:00+00:00"
        );
        assert_eq!(
            window.end_datetime().unwrap().to_rfc3339(),
            "1970-01-01T00:29:59.999+00:00"
        );
    }

    #[test]
    fn test_state_parse_and_display() {
        for state in [
            JobSetState::New,
            JobSetState::Running,
            JobSetState::Skip,
            JobSetState::Done,
        ] {
            assert_eq!(state.as_str().parse::<JobSetState>().unwrap(), state);
        }
        assert_eq!(
            "paused".parse::<JobSetState>(),
            Err(ParseStateError("paused".to_string()))
        );
    }

    #[test]
    fn test_state_final() {
        assert!(!JobSetState::New.is_final());
        assert!(!JobSetState::Running.is_final());
        assert!(JobSetState::Skip.is_final());
        assert!(JobSetState::Done.is_final());
    }

    #[test]
    fn test_state_default() {
        let state: JobSetState = Default::default();
        assert_eq!(state, JobSetState::New);
    }

    #[test]
    fn test_with_update_touches_one_field() {
        let job_set = JobSet::new("1", Window::starting_at(0, HALF_HOUR_MS));

        let bumped = job_set.with_update(JobSetUpdate::Retries(2));
        assert_eq!(bumped.retries, 2);
        assert_eq!(bumped.state, JobSetState::New);

        let running = bumped.with_update(JobSetUpdate::State(JobSetState::Running));
        assert_eq!(running.retries, 2);
        assert_eq!(running.state, JobSetState::Running);
    }

    proptest! {
        // end = start + span - 1 for every window
        #[test]
        fn window_end_is_start_plus_span_minus_one(
            start in 0i64..4_000_000_000_000,
            span in 1i64..86_400_000,
        ) {
            let window = Window::starting_at(start, span);
            prop_assert_eq!(window.end, start + span - 1);
            prop_assert_eq!(window.span_ms(), span);
        }

        // Consecutive windows tile the timeline with no gap or overlap
        #[test]
        fn consecutive_windows_are_adjacent(
            start in 0i64..4_000_000_000_000,
            span in 1i64..86_400_000,
            steps in 1usize..50,
        ) {
            let mut window = Window::starting_at(start, span);
            for _ in 0..steps {
                let next = window.next();
                prop_assert_eq!(next.start, window.end + 1);
                prop_assert_eq!(next.span_ms(), span);
                prop_assert!(next > window);
                window = next;
            }
        }
    }
}
