//! Remote store boundary.
//!
//! [`IssueStore`] is the raw, effectful contract against an issue tracker:
//! one method per remote call, no retries, no business logic. The
//! [`StoreAdapter`] layers per-call timeouts and bounded backoff on top of
//! any implementation. [`GitHubStore`](crate::github::GitHubStore) talks to
//! the real service; [`MemoryStore`] keeps everything in-process.

mod adapter;
pub mod memory;
pub mod retry;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use adapter::StoreAdapter;
pub use memory::{MemoryStore, StoreOp};
pub use retry::RetryConfig;

/// Fields of an issue to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// An issue as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRecord {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub open: bool,
    pub created_at: DateTime<Utc>,
}

/// One page of a label listing, oldest issue first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuePage {
    pub issues: Vec<IssueRecord>,
    /// Page to request next; `None` on the last page.
    pub next_page: Option<u32>,
}

/// An immutable comment attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a conditional label swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The swap was applied; carries the issue's label set afterwards.
    Swapped(Vec<String>),
    /// The issue no longer carried the expected label.
    Conflict,
}

/// A repository label the engine relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub name: String,
    /// Hex colour without the leading `#`.
    pub color: String,
}

/// Raw operations against the backing issue tracker.
///
/// `swap_label` must be a conditional update: it reports
/// [`SwapOutcome::Conflict`] instead of overwriting when `from` is no longer
/// attached at the moment the update is applied.
pub trait IssueStore: Send + Sync {
    fn create(
        &self,
        issue: &NewIssue,
    ) -> impl Future<Output = Result<IssueRecord, StoreError>> + Send;

    fn get(&self, number: u64) -> impl Future<Output = Result<IssueRecord, StoreError>> + Send;

    /// Issues carrying `label`, open or closed, oldest first. Pages start at 1.
    fn list(
        &self,
        label: &str,
        page: u32,
    ) -> impl Future<Output = Result<IssuePage, StoreError>> + Send;

    fn swap_label(
        &self,
        number: u64,
        from: &str,
        to: &str,
    ) -> impl Future<Output = Result<SwapOutcome, StoreError>> + Send;

    fn append_note(
        &self,
        number: u64,
        body: &str,
    ) -> impl Future<Output = Result<Note, StoreError>> + Send;

    /// Notes in creation order.
    fn notes(&self, number: u64) -> impl Future<Output = Result<Vec<Note>, StoreError>> + Send;

    fn set_open(&self, number: u64, open: bool)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Create any of `labels` missing from the repository.
    fn ensure_labels(
        &self,
        labels: &[LabelSpec],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
