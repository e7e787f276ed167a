use std::time::Duration;

use chrono::Utc;
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, instrument};

use super::error::GitHubError;
use super::types::{
    ApiErrorBody, Comment, CreateCommentRequest, CreateIssueRequest, CreateLabelRequest, Issue,
    Label, ReplaceLabelsRequest, UpdateIssueRequest,
};
use crate::store::NewIssue;

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("octoqueue/", env!("CARGO_PKG_VERSION"));
const MAX_PER_PAGE: u32 = 100;

/// Thin client for the issue, comment and label endpoints of one repository.
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: String,
    owner: String,
    repo: String,
}

impl GitHubClient {
    /// `base_url` is `https://api.github.com`, a GitHub Enterprise API root, or a test server.
    pub fn with_base_url(
        token: String,
        owner: String,
        repo: String,
        base_url: String,
    ) -> Result<Self, GitHubError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            owner,
            repo,
        })
    }

    #[instrument(skip(self, issue), fields(repo = %self.repo, title = %issue.title))]
    pub async fn create_issue(&self, issue: &NewIssue) -> Result<Issue, GitHubError> {
        let body = CreateIssueRequest {
            title: &issue.title,
            body: &issue.body,
            labels: &issue.labels,
        };
        let response = self
            .send(self.request(Method::POST, "/issues").json(&body))
            .await?;
        let created: Issue = response.json().await?;
        debug!(number = created.number, "issue created");
        Ok(created)
    }

    /// Fetch an issue together with its `ETag`.
    #[instrument(skip(self), fields(repo = %self.repo))]
    pub async fn get_issue(&self, number: u64) -> Result<(Issue, Option<String>), GitHubError> {
        let response = self
            .send(self.request(Method::GET, &format!("/issues/{number}")))
            .await?;
        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok((response.json().await?, etag))
    }

    /// One page of issues carrying `label`, open and closed, oldest first.
    /// The flag reports whether GitHub advertised a next page.
    #[instrument(skip(self), fields(repo = %self.repo))]
    pub async fn list_issues(
        &self,
        label: &str,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<Issue>, bool), GitHubError> {
        let request = self
            .request(Method::GET, "/issues")
            .query(&[
                ("labels", label),
                ("state", "all"),
                ("sort", "created"),
                ("direction", "asc"),
            ])
            .query(&[("per_page", per_page.min(MAX_PER_PAGE)), ("page", page)]);
        let response = self.send(request).await?;
        let has_next = has_next_page(response.headers());
        let issues: Vec<Issue> = response.json().await?;
        debug!(count = issues.len(), has_next, "listed issues");
        Ok((issues, has_next))
    }

    /// Replace the whole label set; with `if_match` the update only applies
    /// if the issue is unchanged since that `ETag` was read.
    #[instrument(skip(self), fields(repo = %self.repo))]
    pub async fn replace_labels(
        &self,
        number: u64,
        labels: &[String],
        if_match: Option<&str>,
    ) -> Result<Vec<Label>, GitHubError> {
        let mut request = self
            .request(Method::PUT, &format!("/issues/{number}/labels"))
            .json(&ReplaceLabelsRequest { labels });
        if let Some(etag) = if_match {
            request = request.header(header::IF_MATCH, etag);
        }
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    #[instrument(skip(self, body), fields(repo = %self.repo))]
    pub async fn create_comment(&self, number: u64, body: &str) -> Result<Comment, GitHubError> {
        let response = self
            .send(
                self.request(Method::POST, &format!("/issues/{number}/comments"))
                    .json(&CreateCommentRequest { body }),
            )
            .await?;
        Ok(response.json().await?)
    }

    /// Every comment on an issue, oldest first.
    #[instrument(skip(self), fields(repo = %self.repo))]
    pub async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, GitHubError> {
        let mut comments = Vec::new();
        let mut page = 1u32;
        loop {
            let request = self
                .request(Method::GET, &format!("/issues/{number}/comments"))
                .query(&[("per_page", MAX_PER_PAGE), ("page", page)]);
            let response = self.send(request).await?;
            let has_next = has_next_page(response.headers());
            let batch: Vec<Comment> = response.json().await?;
            comments.extend(batch);
            if !has_next {
                return Ok(comments);
            }
            page += 1;
        }
    }

    #[instrument(skip(self), fields(repo = %self.repo))]
    pub async fn set_state(&self, number: u64, open: bool) -> Result<(), GitHubError> {
        let state = if open { "open" } else { "closed" };
        self.send(
            self.request(Method::PATCH, &format!("/issues/{number}"))
                .json(&UpdateIssueRequest { state }),
        )
        .await?;
        Ok(())
    }

    pub async fn list_labels(&self) -> Result<Vec<Label>, GitHubError> {
        let mut labels = Vec::new();
        let mut page = 1u32;
        loop {
            let request = self
                .request(Method::GET, "/labels")
                .query(&[("per_page", MAX_PER_PAGE), ("page", page)]);
            let response = self.send(request).await?;
            let has_next = has_next_page(response.headers());
            let batch: Vec<Label> = response.json().await?;
            labels.extend(batch);
            if !has_next {
                return Ok(labels);
            }
            page += 1;
        }
    }

    /// Create a repository label. A label that already exists is not an error.
    #[instrument(skip(self), fields(repo = %self.repo))]
    pub async fn create_label(&self, name: &str, color: &str) -> Result<(), GitHubError> {
        let request = self
            .request(Method::POST, "/labels")
            .json(&CreateLabelRequest { name, color });
        match self.send(request).await {
            Ok(_) => {
                debug!(label = name, "label created");
                Ok(())
            }
            Err(GitHubError::ApiError { status: 422, .. }) => {
                debug!(label = name, "label already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/repos/{}/{}{}",
            self.base_url, self.owner, self.repo, path
        );
        let request = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("x-github-api-version", API_VERSION);
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GitHubError> {
        let response = request.send().await?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, GitHubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if let Some(retry_after_ms) = rate_limit_delay(status, response.headers()) {
        return Err(GitHubError::RateLimited { retry_after_ms });
    }

    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(GitHubError::NotFound),
        StatusCode::PRECONDITION_FAILED => Err(GitHubError::PreconditionFailed),
        _ => {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.message)
                .unwrap_or(text);
            Err(GitHubError::ApiError {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Milliseconds to wait when the response is a primary or secondary rate
/// limit, `None` when it is not one.
fn rate_limit_delay(status: StatusCode, headers: &HeaderMap) -> Option<u64> {
    if status != StatusCode::TOO_MANY_REQUESTS && status != StatusCode::FORBIDDEN {
        return None;
    }

    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(secs) = header_str("retry-after").and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(secs.saturating_mul(1000));
    }

    if header_str("x-ratelimit-remaining") == Some("0") {
        let wait = header_str("x-ratelimit-reset")
            .and_then(|v| v.parse::<i64>().ok())
            .map(|reset| {
                let secs = reset.saturating_sub(Utc::now().timestamp()).max(0) as u64;
                secs.saturating_mul(1000)
            })
            .unwrap_or(60_000);
        return Some(wait);
    }

    // A bare 429 still means slow down; a bare 403 is a permission problem.
    (status == StatusCode::TOO_MANY_REQUESTS).then_some(1000)
}

fn has_next_page(headers: &HeaderMap) -> bool {
    headers
        .get(header::LINK)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|link| link.split(',').any(|part| part.contains("rel=\"next\"")))
}
