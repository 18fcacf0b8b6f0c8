//! Window advancer implementation.
//!
//! One cursor walks forward through fixed-length windows starting at the
//! configured system start time. Each cycle either waits for the current
//! window to elapse, evaluates it, or moves the cursor to the next window once
//! the current one is finished (`skip` or `done`).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    AdvancerConfig, Clock, JobSet, JobSetState, JobSetStore, JobSetUpdate, PostCounter,
    SchedulerError, SystemClock, Window,
};

/// What a cycle observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The window has not fully elapsed yet.
    WindowOpen,
    /// The window is finished; the cursor moved on.
    Finished(JobSetState),
    /// The window is `new` or `running`; check again soon.
    Watching(JobSetState),
    /// The stored record has a state we do not know; treated as finished.
    Unrecognized,
    /// A store or count call failed; nothing was decided.
    Failed,
}

/// Where and when the next cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStep {
    pub window_start: i64,
    pub delay: Duration,
    pub outcome: CycleOutcome,
}

/// Drives job sets through their windows.
pub struct WindowAdvancer {
    config: Arc<AdvancerConfig>,
    store: Arc<dyn JobSetStore>,
    counter: Arc<dyn PostCounter>,
    clock: Arc<dyn Clock>,
}

impl WindowAdvancer {
    /// Create an advancer on the system clock.
    pub fn new(
        config: Arc<AdvancerConfig>,
        store: Arc<dyn JobSetStore>,
        counter: Arc<dyn PostCounter>,
    ) -> Self {
        Self {
            config,
            store,
            counter,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run cycles until `shutdown_rx` turns true or its sender is dropped.
    ///
    /// Returns the start of the window the next cycle would have evaluated.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> i64 {
        let mut window_start = self.config.system_start_time;

        info!(
            window_start,
            span_ms = self.config.query_span_ms(),
            min_posts = self.config.min_posts_threshold,
            max_retries = self.config.max_retries(),
            "window advancer starting"
        );

        loop {
            if *shutdown_rx.borrow() {
                info!("window advancer shutting down");
                break;
            }

            let step = self.run_cycle(window_start).await;
            window_start = step.window_start;

            if step.delay.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        info!("shutdown channel closed");
                        break;
                    }
                }
                _ = self.clock.sleep(step.delay) => {}
            }
        }

        info!(window_start, "window advancer stopped");
        window_start
    }

    /// Run one cycle for the window beginning at `window_start`.
    ///
    /// Never fails: collaborator errors are logged and the same window is
    /// retried after the loop interval.
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&self, window_start: i64) -> CycleStep {
        let window = self.config.window_at(window_start);
        let now = self.clock.now_ms();

        if !window.has_elapsed(now) {
            debug!(
                window_end = window.end,
                remaining_ms = window.end - now,
                "window still open, waiting"
            );
            return CycleStep {
                window_start,
                delay: self.config.loop_interval,
                outcome: CycleOutcome::WindowOpen,
            };
        }

        match self.evaluate_window(window).await {
            Ok(job_set) if job_set.state.is_final() => {
                info!(%window, state = %job_set.state, retries = job_set.retries, "window finished, advancing");
                CycleStep {
                    window_start: window.next().start,
                    delay: Duration::ZERO,
                    outcome: CycleOutcome::Finished(job_set.state),
                }
            }
            Ok(job_set) => {
                debug!(%window, state = %job_set.state, retries = job_set.retries, "watching window");
                CycleStep {
                    window_start,
                    delay: self.config.poll_interval,
                    outcome: CycleOutcome::Watching(job_set.state),
                }
            }
            Err(SchedulerError::UnrecognizedState { state, .. }) => {
                warn!(%window, state = %state, "unrecognized job set state, treating window as finished");
                CycleStep {
                    window_start: window.next().start,
                    delay: Duration::ZERO,
                    outcome: CycleOutcome::Unrecognized,
                }
            }
            Err(e) => {
                error!(%window, error = %e, "cycle failed, will retry");
                CycleStep {
                    window_start,
                    delay: self.config.loop_interval,
                    outcome: CycleOutcome::Failed,
                }
            }
        }
    }

    /// Evaluate a window, creating its job set on first sight.
    ///
    /// Only job sets in `new` are touched. Those reach `running` once the
    /// window holds enough posts, otherwise they gain a retry until retries
    /// are exhausted and the window is skipped.
    pub async fn evaluate_window(&self, window: Window) -> Result<JobSet, SchedulerError> {
        let job_set = match self.store.find_one(window).await? {
            Some(job_set) => job_set,
            None => {
                let job_set = self.store.create(window).await?;
                info!(%window, id = %job_set.id, "created job set");
                job_set
            }
        };

        if job_set.state != JobSetState::New {
            debug!(%window, state = %job_set.state, "job set already past new");
            return Ok(job_set);
        }

        let count = self.counter.count(window).await?;
        let threshold = self.config.min_posts_threshold;

        if count >= threshold {
            info!(%window, count, threshold, "threshold met, job set running");
            return self
                .store
                .update(&job_set, JobSetUpdate::State(JobSetState::Running))
                .await;
        }

        let max_retries = self.config.max_retries();
        debug!(
            %window,
            count,
            threshold,
            retries = job_set.retries,
            max_retries,
            "not enough posts"
        );

        if job_set.retries >= max_retries {
            info!(%window, count, retries = job_set.retries, "retries exhausted, skipping window");
            self.store
                .update(&job_set, JobSetUpdate::State(JobSetState::Skip))
                .await
        } else {
            self.store
                .update(&job_set, JobSetUpdate::Retries(job_set.retries + 1))
                .await
        }
    }
}
