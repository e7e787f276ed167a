use thiserror::Error;

use crate::codec::CodecError;
use crate::state_machine::{JobId, JobState, Operation};

/// Raw failures reported by an [`IssueStore`](crate::store::IssueStore).
///
/// `Clone` so that fakes can replay a scripted failure more than once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("not found")]
    NotFound,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl StoreError {
    /// Rate limits and transient failures are retried by the adapter;
    /// everything else is surfaced on first sight.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::RateLimited { .. } | StoreError::Transient(_))
    }
}

/// Errors returned by the queue façade.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("payload does not match the job schema: {}", .details.join("; "))]
    Validation { details: Vec<String> },

    #[error("invalid job schema: {0}")]
    InvalidSchema(String),

    #[error("label `{0}` is reserved for job state")]
    ReservedLabel(String),

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {id}: cannot {op} a job that is {from}")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        op: Operation,
    },

    /// The swap could not be confirmed, yet the job is already in the target
    /// state. Either a lost response of this call or a concurrent caller.
    #[error("job {id}: {op} not confirmed, job is already {state}")]
    Unconfirmed {
        id: JobId,
        op: Operation,
        state: JobState,
    },

    #[error("invalid state labels: {0}")]
    InvalidLabels(String),

    #[error("job {id}: {source}")]
    Codec {
        id: JobId,
        #[source]
        source: CodecError,
    },

    #[error("store unavailable: {op} failed after {attempts} attempts: {last}")]
    StoreUnavailable {
        op: &'static str,
        attempts: u32,
        last: StoreError,
    },

    #[error("store rejected {op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("job {id} moved to {state} but its history note was not recorded: {source}")]
    HistoryNotRecorded {
        id: JobId,
        state: JobState,
        #[source]
        source: Box<QueueError>,
    },
}

impl QueueError {
    /// The job id the error refers to, when there is one.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            QueueError::NotFound(id)
            | QueueError::InvalidTransition { id, .. }
            | QueueError::Unconfirmed { id, .. }
            | QueueError::Codec { id, .. }
            | QueueError::HistoryNotRecorded { id, .. } => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display() {
        let err = StoreError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.to_string(), "rate limited, retry after 5000ms");
    }

    #[test]
    fn only_rate_limits_and_transients_are_retryable() {
        assert!(StoreError::RateLimited { retry_after_ms: 0 }.is_retryable());
        assert!(StoreError::Transient("reset".into()).is_retryable());
        assert!(!StoreError::NotFound.is_retryable());
        assert!(
            !StoreError::Api {
                status: 422,
                message: "bad".into()
            }
            .is_retryable()
        );
        assert!(!StoreError::Malformed("eof".into()).is_retryable());
    }

    #[test]
    fn validation_display_joins_details() {
        let err = QueueError::Validation {
            details: vec!["a is required".into(), "b is not a string".into()],
        };
        assert_eq!(
            err.to_string(),
            "payload does not match the job schema: a is required; b is not a string"
        );
    }

    #[test]
    fn invalid_transition_display() {
        let err = QueueError::InvalidTransition {
            id: JobId(3),
            from: JobState::Completed,
            op: Operation::Complete,
        };
        assert_eq!(
            err.to_string(),
            "job 3: cannot complete a job that is completed"
        );
        assert_eq!(err.job_id(), Some(JobId(3)));
    }

    #[test]
    fn unconfirmed_display() {
        let err = QueueError::Unconfirmed {
            id: JobId(8),
            op: Operation::Fail,
            state: JobState::Failed,
        };
        assert_eq!(err.to_string(), "job 8: fail not confirmed, job is already failed");
        assert_eq!(err.job_id(), Some(JobId(8)));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreError>();
        assert_send_sync::<QueueError>();
    }
}
