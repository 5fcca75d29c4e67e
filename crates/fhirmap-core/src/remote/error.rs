//! HTTP failure classification for the remote source and delivery sink

use reqwest::StatusCode;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Classification of HTTP failures for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Client errors (4xx) - should not retry
    ClientError,
    /// Server errors (5xx) - should retry
    ServerError,
    /// Network errors - should retry
    NetworkError,
    /// Rate limiting - should retry with backoff
    RateLimitError,
    /// Authentication errors - should not retry
    AuthenticationError,
    /// Unknown errors - default to no retry
    Unknown,
}

impl ErrorClassification {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClassification::ServerError
                | ErrorClassification::NetworkError
                | ErrorClassification::RateLimitError
        )
    }

    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            401 | 403 => ErrorClassification::AuthenticationError,
            429 => ErrorClassification::RateLimitError,
            400..=499 => ErrorClassification::ClientError,
            500..=599 => ErrorClassification::ServerError,
            _ => ErrorClassification::Unknown,
        }
    }
}

/// One failed HTTP exchange
#[derive(Debug, Clone)]
pub struct FetchError {
    pub status: Option<u16>,
    pub classification: ErrorClassification,
    pub message: String,
    /// Raw response body, when one was read
    pub body: Option<String>,
    /// `Retry-After` in seconds, when the server sent one
    pub retry_after: Option<u64>,
}

impl FetchError {
    /// Build from a non-success response, consuming its body
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        Self {
            status: Some(status.as_u16()),
            classification: ErrorClassification::from_status(status),
            message: outcome_message(&body)
                .unwrap_or_else(|| format!("server answered {status}")),
            body: (!body.is_empty()).then_some(body),
            retry_after,
        }
    }

    /// Build from a transport failure
    pub fn from_request_error(error: reqwest::Error) -> Self {
        let classification = if error.is_timeout() || error.is_connect() {
            ErrorClassification::NetworkError
        } else if let Some(status) = error.status() {
            ErrorClassification::from_status(status)
        } else {
            ErrorClassification::Unknown
        };

        Self {
            status: error.status().map(|s| s.as_u16()),
            classification,
            message: error.to_string(),
            body: None,
            retry_after: None,
        }
    }

    /// A response that arrived but could not be used
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            status: None,
            classification: ErrorClassification::Unknown,
            message: message.into(),
            body: None,
            retry_after: None,
        }
    }

    pub fn should_retry(&self) -> bool {
        self.classification.is_retryable()
    }

    /// Server-requested delay before the next attempt
    pub fn retry_delay(&self) -> Option<Duration> {
        self.retry_after.map(Duration::from_secs)
    }
}

/// First diagnostics text of an `OperationOutcome` body
fn outcome_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    json.get("issue")?
        .as_array()?
        .iter()
        .find_map(|issue| {
            issue
                .get("diagnostics")
                .or_else(|| issue.pointer("/details/text"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HTTP error [{}]: {} (classification: {:?})",
            self.status
                .map(|c| c.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            self.message,
            self.classification
        )
    }
}

impl std::error::Error for FetchError {}

impl From<FetchError> for crate::Error {
    fn from(error: FetchError) -> Self {
        crate::Error::RemoteSource {
            message: error.message,
            status: error.status,
            body: error.body,
        }
    }
}
