//! Read-only inspection of a single window.

use std::fmt::Write as _;
use std::sync::Arc;

use miette::Result;

use watchman_loopback::LoopbackClient;
use watchman_scheduler::{
    AdvancerConfig, JobSet, JobSetStore, LoopbackPostCounter, LoopbackStore, PostCounter,
    SchedulerError, Window,
};

/// Print the window bounds, its job set and its post count.
pub async fn run(api_root: Option<String>, start: i64, query_span_min: u64) -> Result<()> {
    let config = AdvancerConfig::builder()
        .api_root(api_root.unwrap_or_default())
        .window_span_minutes(query_span_min)
        .build()
        .map_err(|e| miette::miette!("{}", e))?;
    let window = config.window_at(start);

    let client = Arc::new(
        LoopbackClient::new(config.api_root.as_str())
            .map_err(|e| miette::miette!("failed to create API client: {}", e))?,
    );
    let store = LoopbackStore::new(Arc::clone(&client));
    let counter = LoopbackPostCounter::new(client);

    let job_set = lookup(store.find_one(window).await)
        .map_err(|e| miette::miette!("failed to look up job set: {}", e))?;
    let count = counter
        .count(window)
        .await
        .map_err(|e| miette::miette!("failed to count posts: {}", e))?;

    print!("{}", render(window, &job_set, count));
    Ok(())
}

/// What the store holds for a window.
#[derive(Debug, PartialEq)]
enum Lookup {
    Found(JobSet),
    Missing,
    /// The record exists but its state is not one the scheduler knows.
    Unrecognized(String),
}

/// Keep unrecognized states for display and fail on everything else.
fn lookup(result: Result<Option<JobSet>, SchedulerError>) -> Result<Lookup, SchedulerError> {
    match result {
        Ok(Some(job_set)) => Ok(Lookup::Found(job_set)),
        Ok(None) => Ok(Lookup::Missing),
        Err(SchedulerError::UnrecognizedState { state, .. }) => Ok(Lookup::Unrecognized(state)),
        Err(e) => Err(e),
    }
}

fn render(window: Window, job_set: &Lookup, count: u64) -> String {
    let mut out = String::new();
    let timestamp = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "out of range".to_string())
    };

    let _ = writeln!(out, "window:  {}", window);
    let _ = writeln!(out, "from:    {}", timestamp(window.start_datetime()));
    let _ = writeln!(out, "to:      {}", timestamp(window.end_datetime()));
    let _ = match job_set {
        Lookup::Found(job_set) => writeln!(
            out,
            "job set: {} (state {}, retries {})",
            job_set.id, job_set.state, job_set.retries
        ),
        Lookup::Missing => writeln!(out, "job set: none"),
        Lookup::Unrecognized(state) => writeln!(out, "job set: unrecognized state {}", state),
    };
    let _ = writeln!(out, "posts:   {}", count);
    out
}
