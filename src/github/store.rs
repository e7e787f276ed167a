use std::collections::HashSet;

use tracing::debug;

use super::client::GitHubClient;
use super::error::GitHubError;
use crate::error::StoreError;
use crate::store::{IssuePage, IssueRecord, IssueStore, LabelSpec, NewIssue, Note, SwapOutcome};

/// [`IssueStore`] backed by a GitHub repository.
#[derive(Clone)]
pub struct GitHubStore {
    client: GitHubClient,
    page_size: u32,
}

impl GitHubStore {
    pub fn new(client: GitHubClient, page_size: u32) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
        }
    }
}

impl IssueStore for GitHubStore {
    async fn create(&self, issue: &NewIssue) -> Result<IssueRecord, StoreError> {
        Ok(self.client.create_issue(issue).await?.into())
    }

    async fn get(&self, number: u64) -> Result<IssueRecord, StoreError> {
        let (issue, _) = self.client.get_issue(number).await?;
        if issue.is_pull_request() {
            return Err(StoreError::NotFound);
        }
        Ok(issue.into())
    }

    async fn list(&self, label: &str, page: u32) -> Result<IssuePage, StoreError> {
        let (issues, has_next) = self
            .client
            .list_issues(label, page.max(1), self.page_size)
            .await?;
        let issues = issues
            .into_iter()
            .filter(|i| !i.is_pull_request())
            .map(IssueRecord::from)
            .collect();
        Ok(IssuePage {
            issues,
            next_page: has_next.then_some(page.max(1) + 1),
        })
    }

    /// Read the labels with their `ETag`, then write the swapped set with
    /// `If-Match`. A missing `from` label or a 412 is a conflict.
    async fn swap_label(
        &self,
        number: u64,
        from: &str,
        to: &str,
    ) -> Result<SwapOutcome, StoreError> {
        let (issue, etag) = self.client.get_issue(number).await?;
        let mut labels = issue.label_names();

        let Some(pos) = labels.iter().position(|l| l == from) else {
            debug!(number, from, "expected label already gone");
            return Ok(SwapOutcome::Conflict);
        };
        labels.remove(pos);
        if !labels.iter().any(|l| l == to) {
            labels.push(to.to_string());
        }

        match self
            .client
            .replace_labels(number, &labels, etag.as_deref())
            .await
        {
            Ok(after) => Ok(SwapOutcome::Swapped(
                after.into_iter().map(|l| l.name).collect(),
            )),
            Err(GitHubError::PreconditionFailed) => {
                debug!(number, from, to, "issue changed since it was read");
                Ok(SwapOutcome::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn append_note(&self, number: u64, body: &str) -> Result<Note, StoreError> {
        Ok(self.client.create_comment(number, body).await?.into())
    }

    async fn notes(&self, number: u64) -> Result<Vec<Note>, StoreError> {
        let comments = self.client.list_comments(number).await?;
        Ok(comments.into_iter().map(Note::from).collect())
    }

    async fn set_open(&self, number: u64, open: bool) -> Result<(), StoreError> {
        Ok(self.client.set_state(number, open).await?)
    }

    async fn ensure_labels(&self, labels: &[LabelSpec]) -> Result<(), StoreError> {
        let existing: HashSet<String> = self
            .client
            .list_labels()
            .await?
            .into_iter()
            .map(|l| l.name)
            .collect();
        for spec in labels.iter().filter(|s| !existing.contains(&s.name)) {
            self.client.create_label(&spec.name, &spec.color).await?;
        }
        Ok(())
    }
}
