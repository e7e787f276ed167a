//! Error types for the GitHub REST client.
//!
//! [`GitHubError`] separates the responses the store adapter reacts to
//! (rate limits, missing issues, failed preconditions) from everything else,
//! and converts into the transport-neutral [`StoreError`].

use thiserror::Error;

use crate::error::StoreError;

#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP 429, or a 403 that carries rate-limit headers.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// HTTP 404 or 410.
    #[error("resource not found")]
    NotFound,

    /// HTTP 412: the `If-Match` precondition no longer holds.
    #[error("precondition failed")]
    PreconditionFailed,

    /// Any other non-success status.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Transport failure (DNS, refused connection, timeout, bad body).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl From<GitHubError> for StoreError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::RateLimited { retry_after_ms } => StoreError::RateLimited { retry_after_ms },
            GitHubError::NotFound => StoreError::NotFound,
            GitHubError::PreconditionFailed => StoreError::Api {
                status: 412,
                message: "precondition failed".into(),
            },
            GitHubError::ApiError { status, message } if status >= 500 => {
                StoreError::Transient(format!("status {status}: {message}"))
            }
            GitHubError::ApiError { status, message } => StoreError::Api { status, message },
            GitHubError::NetworkError(e) if e.is_decode() => StoreError::Malformed(e.to_string()),
            GitHubError::NetworkError(e) => StoreError::Transient(e.to_string()),
        }
    }
}
