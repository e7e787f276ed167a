use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::retry::RetryConfig;
use super::{IssuePage, IssueRecord, IssueStore, LabelSpec, NewIssue, Note, SwapOutcome};
use crate::error::{QueueError, StoreError};
use crate::state_machine::JobId;

/// Wraps an [`IssueStore`] with per-call timeouts and bounded retries.
///
/// Rate limits and transient failures are retried with exponential backoff
/// and jitter; `NotFound` and protocol errors are surfaced on first sight.
/// Running out of attempts surfaces [`QueueError::StoreUnavailable`].
pub struct StoreAdapter<S> {
    store: S,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl<S: IssueStore> StoreAdapter<S> {
    pub fn new(store: S, retry: RetryConfig, request_timeout: Duration) -> Self {
        Self {
            store,
            retry,
            request_timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn create(&self, issue: &NewIssue) -> Result<IssueRecord, QueueError> {
        let store = &self.store;
        self.call("create", None, move || store.create(issue)).await
    }

    pub async fn get(&self, id: JobId) -> Result<IssueRecord, QueueError> {
        let store = &self.store;
        self.call("get", Some(id), move || store.get(id.0)).await
    }

    pub async fn list(&self, label: &str, page: u32) -> Result<IssuePage, QueueError> {
        let store = &self.store;
        self.call("list", None, move || store.list(label, page)).await
    }

    pub async fn swap_label(
        &self,
        id: JobId,
        from: &str,
        to: &str,
    ) -> Result<SwapOutcome, QueueError> {
        let store = &self.store;
        self.call("swap_label", Some(id), move || store.swap_label(id.0, from, to))
            .await
    }

    pub async fn append_note(&self, id: JobId, body: &str) -> Result<Note, QueueError> {
        let store = &self.store;
        self.call("append_note", Some(id), move || store.append_note(id.0, body))
            .await
    }

    pub async fn notes(&self, id: JobId) -> Result<Vec<Note>, QueueError> {
        let store = &self.store;
        self.call("notes", Some(id), move || store.notes(id.0)).await
    }

    pub async fn set_open(&self, id: JobId, open: bool) -> Result<(), QueueError> {
        let store = &self.store;
        self.call("set_open", Some(id), move || store.set_open(id.0, open))
            .await
    }

    pub async fn ensure_labels(&self, labels: &[LabelSpec]) -> Result<(), QueueError> {
        let store = &self.store;
        self.call("ensure_labels", None, move || store.ensure_labels(labels))
            .await
    }

    async fn call<T, F, Fut>(
        &self,
        op: &'static str,
        id: Option<JobId>,
        mut f: F,
    ) -> Result<T, QueueError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match timeout(self.request_timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Transient(format!(
                    "{op} timed out after {}ms",
                    self.request_timeout.as_millis()
                ))),
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(op, attempt, "remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(match (err, id) {
                    (StoreError::NotFound, Some(id)) => QueueError::NotFound(id),
                    (source, _) => QueueError::Store { op, source },
                });
            }

            if attempt >= max_attempts {
                warn!(op, attempt, error = %err, "retry budget exhausted");
                return Err(QueueError::StoreUnavailable {
                    op,
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.retry.backoff(attempt, &err);
            warn!(
                op,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "remote call failed, backing off"
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreOp};

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter: false,
        }
    }

    fn adapter(store: MemoryStore, max_attempts: u32) -> StoreAdapter<MemoryStore> {
        StoreAdapter::new(store, fast_retry(max_attempts), Duration::from_secs(5))
    }

    fn new_issue() -> NewIssue {
        NewIssue {
            title: "t".into(),
            body: "{}".into(),
            labels: vec!["queued".into()],
        }
    }

    #[tokio::test]
    async fn rate_limits_are_retried_until_success() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::Create, StoreError::RateLimited { retry_after_ms: 1 }, 2);
        let adapter = adapter(store.clone(), 3);

        let issue = adapter.create(&new_issue()).await.unwrap();
        assert_eq!(issue.number, 1);
        assert_eq!(store.calls(StoreOp::Create), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_store_unavailable() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::Create, StoreError::Transient("reset".into()), 10);
        let adapter = adapter(store.clone(), 3);

        let err = adapter.create(&new_issue()).await.unwrap_err();
        match err {
            QueueError::StoreUnavailable { op, attempts, last } => {
                assert_eq!(op, "create");
                assert_eq!(attempts, 3);
                assert_eq!(last, StoreError::Transient("reset".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.issue_count(), 0);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let store = MemoryStore::new();
        let adapter = adapter(store.clone(), 5);

        let err = adapter.get(JobId(99)).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(JobId(99))));
        assert_eq!(store.calls(StoreOp::Get), 1);
    }

    #[tokio::test]
    async fn api_errors_are_not_retried() {
        let store = MemoryStore::new();
        store.fail_next(
            StoreOp::List,
            StoreError::Api {
                status: 422,
                message: "bad label".into(),
            },
            1,
        );
        let adapter = adapter(store.clone(), 5);

        let err = adapter.list("queued", 1).await.unwrap_err();
        assert!(matches!(err, QueueError::Store { op: "list", .. }));
        assert_eq!(store.calls(StoreOp::List), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out_as_transient() {
        let store = MemoryStore::new();
        store.set_latency(Duration::from_millis(200));
        let adapter = StoreAdapter::new(store, fast_retry(2), Duration::from_millis(20));

        let err = adapter.list("queued", 1).await.unwrap_err();
        match err {
            QueueError::StoreUnavailable { attempts, last, .. } => {
                assert_eq!(attempts, 2);
                assert!(matches!(last, StoreError::Transient(msg) if msg.contains("timed out")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
