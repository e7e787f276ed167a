//! In-process [`IssueStore`].
//!
//! Behaves like the remote tracker for the parts the engine depends on
//! (creation order, label filters, pagination, the conditional label swap)
//! and can replay scripted failures, latency and clock skew so that the
//! retry and race paths can be exercised without a network.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;

use super::{IssuePage, IssueRecord, IssueStore, LabelSpec, NewIssue, Note, SwapOutcome};
use crate::error::StoreError;

const DEFAULT_PAGE_SIZE: usize = 50;

/// Identifies an [`IssueStore`] method for fault injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Create,
    Get,
    List,
    SwapLabel,
    AppendNote,
    Notes,
    SetOpen,
    EnsureLabels,
}

#[derive(Debug)]
struct StoredIssue {
    record: IssueRecord,
    notes: Vec<Note>,
}

#[derive(Debug, Default)]
struct Inner {
    next_number: u64,
    issues: BTreeMap<u64, StoredIssue>,
    repo_labels: BTreeSet<String>,
    faults: HashMap<StoreOp, (StoreError, u32)>,
    calls: HashMap<StoreOp, u32>,
    latency: Duration,
    page_size: usize,
}

/// Shared handle; clones see the same issues.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        let inner = Inner {
            next_number: 1,
            page_size: page_size.max(1),
            ..Inner::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Make the next `times` calls of `op` fail with `err`.
    pub fn fail_next(&self, op: StoreOp, err: StoreError, times: u32) {
        self.lock().faults.insert(op, (err, times));
    }

    /// Delay every call by `latency` before it is applied.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Number of times `op` was invoked, failed attempts included.
    pub fn calls(&self, op: StoreOp) -> u32 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn issue_count(&self) -> usize {
        self.lock().issues.len()
    }

    pub fn issue(&self, number: u64) -> Option<IssueRecord> {
        self.lock().issues.get(&number).map(|i| i.record.clone())
    }

    pub fn repo_labels(&self) -> Vec<String> {
        self.lock().repo_labels.iter().cloned().collect()
    }

    /// Shift an issue's creation time and all of its notes into the past.
    pub fn age_issue(&self, number: u64, by: chrono::Duration) {
        if let Some(issue) = self.lock().issues.get_mut(&number) {
            issue.record.created_at -= by;
            for note in &mut issue.notes {
                note.created_at -= by;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call, wait out any latency, and replay a scripted failure.
    async fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        let latency = {
            let mut inner = self.lock();
            *inner.calls.entry(op).or_insert(0) += 1;
            inner.latency
        };
        if latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.lock();
        if let Some((err, remaining)) = inner.faults.get_mut(&op)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(err.clone());
        }
        Ok(())
    }
}

impl IssueStore for MemoryStore {
    async fn create(&self, issue: &NewIssue) -> Result<IssueRecord, StoreError> {
        self.enter(StoreOp::Create).await?;
        let mut inner = self.lock();
        let number = inner.next_number;
        inner.next_number += 1;

        let mut labels: Vec<String> = Vec::with_capacity(issue.labels.len());
        for label in &issue.labels {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }

        let record = IssueRecord {
            number,
            title: issue.title.clone(),
            body: issue.body.clone(),
            labels,
            open: true,
            created_at: Utc::now(),
        };
        inner.issues.insert(
            number,
            StoredIssue {
                record: record.clone(),
                notes: Vec::new(),
            },
        );
        Ok(record)
    }

    async fn get(&self, number: u64) -> Result<IssueRecord, StoreError> {
        self.enter(StoreOp::Get).await?;
        self.lock()
            .issues
            .get(&number)
            .map(|i| i.record.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self, label: &str, page: u32) -> Result<IssuePage, StoreError> {
        self.enter(StoreOp::List).await?;
        let inner = self.lock();
        let matching: Vec<&StoredIssue> = inner
            .issues
            .values()
            .filter(|i| i.record.labels.iter().any(|l| l == label))
            .collect();

        let page = page.max(1);
        let start = (page as usize - 1) * inner.page_size;
        let issues: Vec<IssueRecord> = matching
            .iter()
            .skip(start)
            .take(inner.page_size)
            .map(|i| i.record.clone())
            .collect();
        let next_page = (start + inner.page_size < matching.len()).then_some(page + 1);

        Ok(IssuePage { issues, next_page })
    }

    async fn swap_label(
        &self,
        number: u64,
        from: &str,
        to: &str,
    ) -> Result<SwapOutcome, StoreError> {
        self.enter(StoreOp::SwapLabel).await?;
        let mut inner = self.lock();
        let issue = inner.issues.get_mut(&number).ok_or(StoreError::NotFound)?;
        let labels = &mut issue.record.labels;

        let Some(pos) = labels.iter().position(|l| l == from) else {
            return Ok(SwapOutcome::Conflict);
        };
        labels.remove(pos);
        if !labels.iter().any(|l| l == to) {
            labels.push(to.to_string());
        }
        Ok(SwapOutcome::Swapped(labels.clone()))
    }

    async fn append_note(&self, number: u64, body: &str) -> Result<Note, StoreError> {
        self.enter(StoreOp::AppendNote).await?;
        let mut inner = self.lock();
        let issue = inner.issues.get_mut(&number).ok_or(StoreError::NotFound)?;
        let note = Note {
            body: body.to_string(),
            created_at: Utc::now(),
        };
        issue.notes.push(note.clone());
        Ok(note)
    }

    async fn notes(&self, number: u64) -> Result<Vec<Note>, StoreError> {
        self.enter(StoreOp::Notes).await?;
        self.lock()
            .issues
            .get(&number)
            .map(|i| i.notes.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn set_open(&self, number: u64, open: bool) -> Result<(), StoreError> {
        self.enter(StoreOp::SetOpen).await?;
        let mut inner = self.lock();
        let issue = inner.issues.get_mut(&number).ok_or(StoreError::NotFound)?;
        issue.record.open = open;
        Ok(())
    }

    async fn ensure_labels(&self, labels: &[LabelSpec]) -> Result<(), StoreError> {
        self.enter(StoreOp::EnsureLabels).await?;
        let mut inner = self.lock();
        for label in labels {
            inner.repo_labels.insert(label.name.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(labels: &[&str]) -> NewIssue {
        NewIssue {
            title: "t".into(),
            body: "b".into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn list_filters_by_label_oldest_first() {
        let store = MemoryStore::new();
        store.create(&issue(&["queued"])).await.unwrap();
        store.create(&issue(&["processing"])).await.unwrap();
        store.create(&issue(&["queued", "extra"])).await.unwrap();

        let page = store.list("queued", 1).await.unwrap();
        let numbers: Vec<u64> = page.issues.iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(page.next_page, None);
    }

    #[tokio::test]
    async fn list_paginates() {
        let store = MemoryStore::with_page_size(2);
        for _ in 0..5 {
            store.create(&issue(&["queued"])).await.unwrap();
        }

        let first = store.list("queued", 1).await.unwrap();
        assert_eq!(first.issues.len(), 2);
        assert_eq!(first.next_page, Some(2));

        let last = store.list("queued", 3).await.unwrap();
        assert_eq!(last.issues.len(), 1);
        assert_eq!(last.issues[0].number, 5);
        assert_eq!(last.next_page, None);
    }

    #[tokio::test]
    async fn swap_is_conditional_on_the_expected_label() {
        let store = MemoryStore::new();
        store.create(&issue(&["queued", "extra"])).await.unwrap();

        let first = store.swap_label(1, "queued", "processing").await.unwrap();
        assert_eq!(
            first,
            SwapOutcome::Swapped(vec!["extra".into(), "processing".into()])
        );

        let second = store.swap_label(1, "queued", "processing").await.unwrap();
        assert_eq!(second, SwapOutcome::Conflict);
    }

    #[tokio::test]
    async fn scripted_failures_are_replayed_then_cleared() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::Get, StoreError::Transient("boom".into()), 1);
        store.create(&issue(&["queued"])).await.unwrap();

        assert!(store.get(1).await.is_err());
        assert!(store.get(1).await.is_ok());
        assert_eq!(store.calls(StoreOp::Get), 2);
    }

    #[tokio::test]
    async fn missing_issue_is_not_found() {
        let store = MemoryStore::new();
        assert_eq!(store.get(1).await.unwrap_err(), StoreError::NotFound);
        assert_eq!(
            store.append_note(1, "x").await.unwrap_err(),
            StoreError::NotFound
        );
    }
}
