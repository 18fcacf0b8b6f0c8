//! Collaborators the advancer depends on.
//!
//! The advancer never talks to a database or API directly. It reads and
//! writes job sets through a [`JobSetStore`] and asks a [`PostCounter`] how
//! many posts landed in a window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{JobSet, JobSetUpdate, SchedulerError, Window};

/// Persistence for job sets, keyed by window.
#[async_trait]
pub trait JobSetStore: Send + Sync {
    /// The job set for exactly this window, if one exists.
    async fn find_one(&self, window: Window) -> Result<Option<JobSet>, SchedulerError>;

    /// Create a job set in state `new` with zero retries.
    ///
    /// Returns the existing record instead if the window is already present.
    async fn create(&self, window: Window) -> Result<JobSet, SchedulerError>;

    /// Persist `update` if the stored record still matches `job_set`.
    ///
    /// Fails with [`SchedulerError::Conflict`] if another writer got there first.
    async fn update(
        &self,
        job_set: &JobSet,
        update: JobSetUpdate,
    ) -> Result<JobSet, SchedulerError>;
}

/// Source of input record counts.
#[async_trait]
pub trait PostCounter: Send + Sync {
    /// Posts with a timestamp in `[window.start, window.end]`. Zero for an empty range.
    async fn count(&self, window: Window) -> Result<u64, SchedulerError>;
}

/// In-process job set store.
#[derive(Default)]
pub struct MemoryJobSetStore {
    job_sets: RwLock<HashMap<Window, JobSet>>,
    next_id: AtomicU64,
}

impl MemoryJobSetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, as an external process would.
    pub async fn put(&self, job_set: JobSet) {
        self.job_sets.write().await.insert(job_set.window, job_set);
    }

    /// Current record for a window.
    pub async fn get(&self, window: Window) -> Option<JobSet> {
        self.job_sets.read().await.get(&window).cloned()
    }

    /// All records, ordered by window.
    pub async fn list(&self) -> Vec<JobSet> {
        let mut job_sets: Vec<JobSet> = self.job_sets.read().await.values().cloned().collect();
        job_sets.sort_by_key(|j| j.window);
        job_sets
    }
}

#[async_trait]
impl JobSetStore for MemoryJobSetStore {
    async fn find_one(&self, window: Window) -> Result<Option<JobSet>, SchedulerError> {
        Ok(self.get(window).await)
    }

    async fn create(&self, window: Window) -> Result<JobSet, SchedulerError> {
        let mut job_sets = self.job_sets.write().await;
        let job_set = job_sets.entry(window).or_insert_with(|| {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            JobSet::new(id.to_string(), window)
        });
        Ok(job_set.clone())
    }

    async fn update(
        &self,
        job_set: &JobSet,
        update: JobSetUpdate,
    ) -> Result<JobSet, SchedulerError> {
        let mut job_sets = self.job_sets.write().await;
        let stored = job_sets
            .get_mut(&job_set.window)
            .ok_or(SchedulerError::JobSetNotFound(job_set.window))?;

        if stored.state != job_set.state || stored.retries != job_set.retries {
            return Err(SchedulerError::Conflict(job_set.window));
        }

        *stored = stored.with_update(update);
        Ok(stored.clone())
    }
}
