//! REST client for the dashboard's LoopBack API.
//!
//! The scheduler reaches its persisted job sets and the social media post
//! counts through the models exposed under the configured API root:
//!
//! - `JobSets`: `findOne`, `create`, conditional `update`
//! - `SocialMediaPosts`: `count` over a `timestamp_ms` range

mod client;
mod error;
mod types;

pub use client::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, LoopbackClient};
pub use error::LoopbackError;
pub use types::{
    CountResponse, JOB_SET_MODEL, JobSetGuard, JobSetPatch, JobSetRecord, NewJobSet, RecordId,
    SOCIAL_MEDIA_POST_MODEL,
};
