//! Request and response bodies of the GitHub REST API endpoints used by
//! the queue. Only the fields the queue reads are modelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{IssueRecord, Note};

/// An issue as returned by `GET /repos/{owner}/{repo}/issues[/{number}]`.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    /// `null` when the issue was created without a body.
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<Label>,
    /// `"open"` or `"closed"`.
    pub state: String,
    pub created_at: DateTime<Utc>,
    /// Present only when the "issue" is a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }
}

impl From<Issue> for IssueRecord {
    fn from(issue: Issue) -> Self {
        let labels = issue.label_names();
        Self {
            number: issue.number,
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            labels,
            open: issue.state == "open",
            created_at: issue.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

/// An issue comment.
#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Comment> for Note {
    fn from(comment: Comment) -> Self {
        Self {
            body: comment.body.unwrap_or_default(),
            created_at: comment.created_at,
        }
    }
}

/// Body of `POST /repos/{owner}/{repo}/issues`.
#[derive(Debug, Serialize)]
pub struct CreateIssueRequest<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub labels: &'a [String],
}

/// Body of `PUT /repos/{owner}/{repo}/issues/{number}/labels`.
#[derive(Debug, Serialize)]
pub struct ReplaceLabelsRequest<'a> {
    pub labels: &'a [String],
}

/// Body of `PATCH /repos/{owner}/{repo}/issues/{number}`.
#[derive(Debug, Serialize)]
pub struct UpdateIssueRequest {
    pub state: &'static str,
}

/// Body of `POST /repos/{owner}/{repo}/issues/{number}/comments`.
#[derive(Debug, Serialize)]
pub struct CreateCommentRequest<'a> {
    pub body: &'a str,
}

/// Body of `POST /repos/{owner}/{repo}/labels`.
#[derive(Debug, Serialize)]
pub struct CreateLabelRequest<'a> {
    pub name: &'a str,
    pub color: &'a str,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}
