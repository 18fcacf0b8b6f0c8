//! Error types for the LoopBack client.

use thiserror::Error;

/// Errors that can occur when talking to the LoopBack API.
#[derive(Debug, Error)]
pub enum LoopbackError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error envelope returned by the API.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid response from server.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limited.
    #[error("rate limited{}", match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    })]
    RateLimited {
        /// Seconds to wait before retrying (from Retry-After header, optional).
        retry_after_secs: Option<u64>,
    },
}

impl LoopbackError {
    /// Whether the failure is worth retrying with the same request.
    pub fn is_transient(&self) -> bool {
        match self {
            LoopbackError::Http(e) => e.is_timeout() || e.is_connect(),
            LoopbackError::Api { status, .. } => *status >= 500,
            LoopbackError::RateLimited { .. } => true,
            _ => false,
        }
    }

    /// Whether the server certainly never acted on the request.
    ///
    /// Requests that insert rows are only resent after these failures.
    pub fn is_undelivered(&self) -> bool {
        match self {
            LoopbackError::Http(e) => e.is_connect(),
            LoopbackError::RateLimited { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_display() {
        let err = LoopbackError::RateLimited {
            retry_after_secs: Some(3),
        };
        assert_eq!(err.to_string(), "rate limited (retry after 3s)");

        let err = LoopbackError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn test_transient_classification() {
        let server_error = LoopbackError::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(server_error.is_transient());

        let not_found = LoopbackError::Api {
            status: 404,
            message: "missing".to_string(),
        };
        assert!(!not_found.is_transient());

        let invalid = LoopbackError::InvalidResponse("garbage".to_string());
        assert!(!invalid.is_transient());
    }

    #[test]
    fn test_undelivered_classification() {
        let rate_limited = LoopbackError::RateLimited {
            retry_after_secs: None,
        };
        assert!(rate_limited.is_undelivered());

        // A 5xx may come back after the write already happened.
        let server_error = LoopbackError::Api {
            status: 500,
            message: "internal".to_string(),
        };
        assert!(server_error.is_transient());
        assert!(!server_error.is_undelivered());
    }
}
