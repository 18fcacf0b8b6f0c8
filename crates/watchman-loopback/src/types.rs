//! Wire types for the LoopBack REST API.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Model path for job set records.
pub const JOB_SET_MODEL: &str = "JobSets";

/// Model path for social media post records.
pub const SOCIAL_MEDIA_POST_MODEL: &str = "SocialMediaPosts";

/// Record identifier.
///
/// Numeric for SQL connectors, string for document stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{}", id),
            RecordId::Str(id) => f.write_str(id),
        }
    }
}

/// A stored job set as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSetRecord {
    pub id: RecordId,
    pub start_time: i64,
    pub end_time: i64,
    /// Raw state string. Validated by the scheduler, not here.
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default)]
    pub retries: Option<u32>,
}

fn default_state() -> String {
    "new".to_string()
}

/// Body for creating a job set.
#[derive(Debug, Clone, Serialize)]
pub struct NewJobSet<'a> {
    pub start_time: i64,
    pub end_time: i64,
    pub state: &'a str,
    pub retries: u32,
}

/// Partial update body. Only present fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSetPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

/// Precondition for a conditional update.
///
/// The write only applies if the stored record still matches every field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSetGuard {
    pub id: RecordId,
    pub state: String,
    pub retries: u32,
}

/// Response from `count` endpoints.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

/// Error envelope: `{"error": {"statusCode": 404, "message": "..."}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_with_numeric_id_and_missing_retries() {
        let record: JobSetRecord = serde_json::from_str(
            r#"{"id": 7, "start_time": 0, "end_time": 1799999, "state": "new"}"#,
        )
        .unwrap();

        assert_eq!(record.id, RecordId::Int(7));
        assert_eq!(record.end_time, 1_799_999);
        assert_eq!(record.retries, None);
    }

    #[test]
    fn test_record_with_string_id_and_null_retries() {
        let record: JobSetRecord = serde_json::from_str(
            r#"{"id": "5a1f", "start_time": 0, "end_time": 1799999, "state": "skip", "retries": null}"#,
        )
        .unwrap();

        assert_eq!(record.id, RecordId::Str("5a1f".to_string()));
        assert_eq!(record.id.to_string(), "5a1f");
        assert_eq!(record.state, "skip");
        assert_eq!(record.retries, None);
    }

    #[test]
    fn test_record_without_state_defaults_to_new() {
        let record: JobSetRecord =
            serde_json::from_str(r#"{"id": 1, "start_time": 0, "end_time": 9}"#).unwrap();
        assert_eq!(record.state, "new");
    }

    #[test]
    fn test_patch_skips_absent_fields() {
        let patch = JobSetPatch {
            state: None,
            retries: Some(2),
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            serde_json::json!({"retries": 2})
        );
    }
}
