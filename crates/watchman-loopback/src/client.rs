//! LoopBack REST client implementation.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::types::ErrorEnvelope;
use crate::{
    CountResponse, JOB_SET_MODEL, JobSetGuard, JobSetPatch, JobSetRecord,
    LoopbackError, NewJobSet, SOCIAL_MEDIA_POST_MODEL,
};

/// Attempts per request: initial + 3 retries with backoff.
const MAX_ATTEMPTS: u32 = 4;

/// Longest wait between attempts, including server-requested waits.
const MAX_BACKOFF: Duration = Duration::from_secs(2);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which failures a request may be resent after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resend {
    /// Reads and guarded updates: any transient failure.
    Transient,
    /// Inserts: only failures the server never saw.
    Undelivered,
}

/// Client for the dashboard's LoopBack API.
pub struct LoopbackClient {
    http: Client,
    api_root: String,
}

impl LoopbackClient {
    /// Create a new client rooted at `api_root` (e.g. `http://localhost:3000/api`).
    pub fn new(api_root: impl Into<String>) -> Result<Self, LoopbackError> {
        Self::with_timeouts(api_root, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with explicit connect and whole-request timeouts.
    pub fn with_timeouts(
        api_root: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, LoopbackError> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        let api_root = api_root.into().trim_end_matches('/').to_string();

        Ok(Self { http, api_root })
    }

    /// Get the API root this client talks to.
    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    fn model_url(&self, model: &str, action: &str) -> String {
        if action.is_empty() {
            format!("{}/{}", self.api_root, model)
        } else {
            format!("{}/{}/{}", self.api_root, model, action)
        }
    }

    /// Find the job set covering exactly `[start_time, end_time]`.
    #[tracing::instrument(skip(self))]
    pub async fn find_job_set(
        &self,
        start_time: i64,
        end_time: i64,
    ) -> Result<Option<JobSetRecord>, LoopbackError> {
        let url = self.model_url(JOB_SET_MODEL, "findOne");
        let filter = json!({
            "where": { "start_time": start_time, "end_time": end_time }
        })
        .to_string();

        let result = self
            .execute("find_job_set", Resend::Transient, || {
                self.http.get(&url).query(&[("filter", filter.as_str())])
            })
            .await;

        match result {
            Ok(record) => Ok(Some(record)),
            Err(LoopbackError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create a job set in state `new` with zero retries.
    ///
    /// A timed-out insert is not resent, since the server may have stored
    /// it. Callers look the window up again before creating.
    #[tracing::instrument(skip(self))]
    pub async fn create_job_set(
        &self,
        start_time: i64,
        end_time: i64,
    ) -> Result<JobSetRecord, LoopbackError> {
        let url = self.model_url(JOB_SET_MODEL, "");
        let body = NewJobSet {
            start_time,
            end_time,
            state: "new",
            retries: 0,
        };

        self.execute("create_job_set", Resend::Undelivered, || {
            self.http.post(&url).json(&body)
        })
        .await
    }

    /// Apply `patch` only if the stored record still matches `guard`.
    ///
    /// Returns `false` when nothing matched (the record moved on underneath us).
    #[tracing::instrument(skip(self), fields(id = %guard.id))]
    pub async fn update_job_set(
        &self,
        guard: &JobSetGuard,
        patch: &JobSetPatch,
    ) -> Result<bool, LoopbackError> {
        let url = self.model_url(JOB_SET_MODEL, "update");
        let filter = guard_filter(guard).to_string();

        let response: CountResponse = self
            .execute("update_job_set", Resend::Transient, || {
                self.http
                    .post(&url)
                    .query(&[("where", filter.as_str())])
                    .json(patch)
            })
            .await?;

        match response.count {
            0 => Ok(false),
            1 => Ok(true),
            n => Err(LoopbackError::InvalidResponse(format!(
                "conditional update matched {} job sets",
                n
            ))),
        }
    }

    /// Count posts whose `timestamp_ms` falls within `[start_time, end_time]`.
    #[tracing::instrument(skip(self))]
    pub async fn count_posts(&self, start_time: i64, end_time: i64) -> Result<u64, LoopbackError> {
        let url = self.model_url(SOCIAL_MEDIA_POST_MODEL, "count");
        let filter = json!({
            "timestamp_ms": { "between": [start_time, end_time] }
        })
        .to_string();

        let response: CountResponse = self
            .execute("count_posts", Resend::Transient, || {
                self.http.get(&url).query(&[("where", filter.as_str())])
            })
            .await?;

        Ok(response.count)
    }

    /// Send a request, retrying transient failures with backoff.
    async fn execute<T, F>(
        &self,
        op: &'static str,
        resend: Resend,
        build: F,
    ) -> Result<T, LoopbackError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let result = match build().send().await {
                Ok(response) => self.handle_response(response).await,
                Err(e) => Err(LoopbackError::Http(e)),
            };

            match result {
                Ok(v) => return Ok(v),
                Err(ref e) if can_resend(e, resend) && attempt + 1 < MAX_ATTEMPTS => {
                    let backoff = backoff_delay(e, attempt);
                    warn!(
                        op,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient API error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, LoopbackError> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(LoopbackError::RateLimited { retry_after_secs });
        }

        let text = response.text().await.map_err(|e| {
            LoopbackError::InvalidResponse(format!(
                "request failed ({}): failed to read response: {}",
                status, e
            ))
        })?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) => envelope.error.message,
                Err(_) => text,
            };
            return Err(LoopbackError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!(status = status.as_u16(), bytes = text.len(), "API response");
        Ok(serde_json::from_str(&text)?)
    }
}

fn can_resend(error: &LoopbackError, resend: Resend) -> bool {
    match resend {
        Resend::Transient => error.is_transient(),
        Resend::Undelivered => error.is_undelivered(),
    }
}

/// Delay before retry number `attempt + 1`, never above [`MAX_BACKOFF`].
fn backoff_delay(error: &LoopbackError, attempt: u32) -> Duration {
    let delay = match error {
        LoopbackError::RateLimited {
            retry_after_secs: Some(secs),
        } => Duration::from_secs(*secs),
        _ => Duration::from_millis(500u64 << attempt.min(8)), // 500ms, 1s, 2s
    };
    delay.min(MAX_BACKOFF)
}

/// Build the `where` clause pinning a record to the values last read.
///
/// A stored `retries` of null counts as zero.
fn guard_filter(guard: &JobSetGuard) -> Value {
    let retries = if guard.retries == 0 {
        json!({ "or": [{ "retries": 0 }, { "retries": null }] })
    } else {
        json!({ "retries": guard.retries })
    };

    json!({
        "and": [
            { "id": guard.id },
            { "state": guard.state },
            retries,
        ]
    })
}
