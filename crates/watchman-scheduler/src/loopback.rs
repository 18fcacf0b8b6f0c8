//! Store and counter backed by the LoopBack API.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use watchman_loopback::{JobSetGuard, JobSetPatch, JobSetRecord, LoopbackClient, RecordId};

use crate::{JobSet, JobSetState, JobSetStore, JobSetUpdate, PostCounter, SchedulerError, Window};

/// [`JobSetStore`] over the `JobSets` model.
pub struct LoopbackStore {
    client: Arc<LoopbackClient>,
}

impl LoopbackStore {
    pub fn new(client: Arc<LoopbackClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobSetStore for LoopbackStore {
    async fn find_one(&self, window: Window) -> Result<Option<JobSet>, SchedulerError> {
        self.client
            .find_job_set(window.start, window.end)
            .await?
            .map(job_set_from_record)
            .transpose()
    }

    async fn create(&self, window: Window) -> Result<JobSet, SchedulerError> {
        // The REST surface has no find-or-create, so look first.
        if let Some(existing) = self.find_one(window).await? {
            debug!(%window, id = %existing.id, "job set already exists");
            return Ok(existing);
        }

        let record = self.client.create_job_set(window.start, window.end).await?;
        job_set_from_record(record)
    }

    async fn update(
        &self,
        job_set: &JobSet,
        update: JobSetUpdate,
    ) -> Result<JobSet, SchedulerError> {
        let guard = JobSetGuard {
            id: record_id(&job_set.id),
            state: job_set.state.as_str().to_string(),
            retries: job_set.retries,
        };

        let patch = match update {
            JobSetUpdate::State(state) => JobSetPatch {
                state: Some(state.as_str().to_string()),
                retries: None,
            },
            JobSetUpdate::Retries(retries) => JobSetPatch {
                state: None,
                retries: Some(retries),
            },
        };

        if self.client.update_job_set(&guard, &patch).await? {
            Ok(job_set.with_update(update))
        } else {
            Err(SchedulerError::Conflict(job_set.window))
        }
    }
}

/// [`PostCounter`] over the `SocialMediaPosts` model.
pub struct LoopbackPostCounter {
    client: Arc<LoopbackClient>,
}

impl LoopbackPostCounter {
    pub fn new(client: Arc<LoopbackClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PostCounter for LoopbackPostCounter {
    async fn count(&self, window: Window) -> Result<u64, SchedulerError> {
        Ok(self.client.count_posts(window.start, window.end).await?)
    }
}

fn job_set_from_record(record: JobSetRecord) -> Result<JobSet, SchedulerError> {
    let window = Window {
        start: record.start_time,
        end: record.end_time,
    };

    let state = record
        .state
        .parse::<JobSetState>()
        .map_err(|e| SchedulerError::UnrecognizedState { window, state: e.0 })?;

    Ok(JobSet {
        id: record.id.to_string(),
        window,
        state,
        retries: record.retries.unwrap_or(0),
    })
}

/// Numeric ids go back out as numbers so SQL connectors match them.
fn record_id(id: &str) -> RecordId {
    match id.parse::<i64>() {
        Ok(n) => RecordId::Int(n),
        Err(_) => RecordId::Str(id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn window() -> Window {
        Window::starting_at(0, 1_800_000)
    }

    fn client_for(server: &MockServer) -> Arc<LoopbackClient> {
        Arc::new(LoopbackClient::new(format!("{}/api", server.uri())).unwrap())
    }

    #[test]
    fn test_record_id_round_trips_numbers() {
        assert_eq!(record_id("42"), RecordId::Int(42));
        assert_eq!(
            record_id("5a1f00c2"),
            RecordId::Str("5a1f00c2".to_string())
        );
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let record = JobSetRecord {
            id: RecordId::Int(1),
            start_time: 0,
            end_time: 1_799_999,
            state: "archived".to_string(),
            retries: Some(0),
        };

        match job_set_from_record(record) {
            Err(SchedulerError::UnrecognizedState { window: w, state }) => {
                assert_eq!(w, window());
                assert_eq!(state, "archived");
            }
            other => panic!("expected UnrecognizedState, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_returns_existing_without_posting() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/JobSets/findOne"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 3,
                "start_time": 0,
                "end_time": 1799999,
                "state": "done"
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/JobSets"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = LoopbackStore::new(client_for(&server));
        let job_set = store.create(window()).await.unwrap();

        assert_eq!(job_set.id, "3");
        assert_eq!(job_set.state, JobSetState::Done);
        assert_eq!(job_set.retries, 0);
    }

    #[tokio::test]
    async fn test_create_posts_when_absent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/JobSets/findOne"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "statusCode": 404, "message": "not found" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/JobSets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 8,
                "start_time": 0,
                "end_time": 1799999,
                "state": "new",
                "retries": 0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = LoopbackStore::new(client_for(&server));
        let job_set = store.create(window()).await.unwrap();

        assert_eq!(job_set, JobSet::new("8", window()));
    }

    #[tokio::test]
    async fn test_update_sends_partial_patch() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/JobSets/update"))
            .and(query_param(
                "where",
                r#"{"and":[{"id":8},{"state":"new"},{"retries":1}]}"#,
            ))
            .and(body_json(json!({ "retries": 2 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let store = LoopbackStore::new(client_for(&server));
        let mut job_set = JobSet::new("8", window());
        job_set.retries = 1;

        let updated = store
            .update(&job_set, JobSetUpdate::Retries(2))
            .await
            .unwrap();
        assert_eq!(updated.retries, 2);
        assert_eq!(updated.state, JobSetState::New);
    }

    #[tokio::test]
    async fn test_update_with_no_match_is_conflict() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/JobSets/update"))
            .and(query_param(
                "where",
                r#"{"and":[{"id":8},{"state":"new"},{"or":[{"retries":0},{"retries":null}]}]}"#,
            ))
            .and(body_json(json!({ "state": "running" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 0 })))
            .expect(1)
            .mount(&server)
            .await;

        let store = LoopbackStore::new(client_for(&server));
        let job_set = JobSet::new("8", window());

        let result = store
            .update(&job_set, JobSetUpdate::State(JobSetState::Running))
            .await;
        assert!(matches!(result, Err(SchedulerError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_counter_reads_count() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/SocialMediaPosts/count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 0 })))
            .mount(&server)
            .await;

        let counter = LoopbackPostCounter::new(client_for(&server));
        assert_eq!(counter.count(window()).await.unwrap(), 0);
    }
}
