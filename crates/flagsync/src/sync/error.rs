//! Errors raised by snapshot and stream sources.

use thiserror::Error;

/// A single failed attempt against a source. Always recovered by the
/// synchronizer: the next fallback, the next checkpoint, or a reconnect.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Source not configured: {0}")]
    NotConfigured(String),
}

impl SourceError {
    /// Returns true if the failure is likely transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Http { .. } => true,
            SourceError::Status { status, .. } => *status == 429 || *status >= 500,
            SourceError::Decode { .. } | SourceError::NotConfigured(_) => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(ToString::to_string)
            .unwrap_or_default();
        if err.is_decode() {
            SourceError::Decode {
                url,
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            SourceError::Status {
                url,
                status: status.as_u16(),
            }
        } else {
            SourceError::Http {
                url,
                message: err.to_string(),
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
