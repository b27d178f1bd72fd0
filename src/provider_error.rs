//! Error classification shared by the outbound provider clients.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Network failures, timeouts, rate limiting and 5xx responses.
    #[error("transient provider error: {0}")]
    Transient(String),
    /// Rejections that will not succeed on retry.
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            ProviderError::Transient(m) | ProviderError::Permanent(m) => m,
        }
    }

    /// Classify a non-success HTTP response.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = if body.is_empty() {
            format!("status {}", status)
        } else {
            format!("status {}: {}", status, truncate(body, 200))
        };
        if status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            ProviderError::Transient(message)
        } else {
            ProviderError::Permanent(message)
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ProviderError::Transient(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::from_status(status, "")
        } else {
            // Body decode and builder errors do not improve on retry.
            ProviderError::Permanent(err.to_string())
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
