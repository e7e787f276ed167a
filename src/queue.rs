//! The public queue surface.
//!
//! [`JobQueue`] composes the payload validator, the label codec, the store
//! adapter and the lifecycle engine. Any number of `JobQueue`s, in any
//! number of processes, may point at the same store; they coordinate only
//! through the store's conditional label swap.

use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::codec::{LabelCodec, StateLabels};
use crate::config::QueueConfig;
use crate::engine::LifecycleEngine;
use crate::error::QueueError;
use crate::github::{GitHubClient, GitHubStore};
use crate::state_machine::{HistoryEvent, Job, JobId, JobState, Operation};
use crate::store::{IssueStore, RetryConfig, StoreAdapter};
use crate::validator::{self, SchemaHandle};

/// Tuning knobs for a [`JobQueue`].
#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
    pub labels: StateLabels,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            labels: StateLabels::default(),
        }
    }
}

impl From<&QueueConfig> for QueueOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            retry: config.retry.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            labels: config.labels.clone(),
        }
    }
}

pub struct JobQueue<S> {
    engine: LifecycleEngine<S>,
    schema: SchemaHandle,
    consumer_id: Uuid,
}

impl<S: IssueStore> JobQueue<S> {
    /// Fails only when the state label vocabulary is unusable.
    pub fn new(store: S, options: QueueOptions) -> Result<Self, QueueError> {
        options.labels.validate().map_err(QueueError::InvalidLabels)?;
        let adapter = StoreAdapter::new(store, options.retry, options.request_timeout);
        Ok(Self {
            engine: LifecycleEngine::new(adapter, LabelCodec::new(options.labels)),
            schema: SchemaHandle::default(),
            consumer_id: Uuid::new_v4(),
        })
    }

    /// Share a schema handle with other queues in the same process.
    pub fn with_schema_handle(mut self, schema: SchemaHandle) -> Self {
        self.schema = schema;
        self
    }

    pub fn schema_handle(&self) -> &SchemaHandle {
        &self.schema
    }

    /// Random per-instance id, attached to this queue's log spans.
    pub fn consumer_id(&self) -> Uuid {
        self.consumer_id
    }

    pub fn store(&self) -> &S {
        self.engine.adapter().store()
    }

    /// Validate `data` against the current schema, then create a `queued` job.
    ///
    /// Nothing is written to the store when validation fails.
    #[instrument(skip(self, data, title), fields(consumer = %self.consumer_id))]
    pub async fn enqueue(
        &self,
        data: Value,
        title: Option<String>,
        additional_labels: Vec<String>,
    ) -> Result<JobId, QueueError> {
        {
            let schema = self.schema.snapshot();
            validator::validate(&data, schema.as_deref())?;
        }
        self.engine.enqueue(&data, title, &additional_labels).await
    }

    /// Claim the next queued job, or `None` when there is nothing to claim.
    #[instrument(skip(self), fields(consumer = %self.consumer_id))]
    pub async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        self.engine.dequeue().await
    }

    #[instrument(skip(self), fields(consumer = %self.consumer_id))]
    pub async fn complete(&self, id: JobId) -> Result<(), QueueError> {
        self.engine
            .transition(id, Operation::Complete, HistoryEvent::Completed)
            .await
            .map(drop)
    }

    #[instrument(skip(self, reason), fields(consumer = %self.consumer_id))]
    pub async fn fail(&self, id: JobId, reason: impl Into<String>) -> Result<(), QueueError> {
        let event = HistoryEvent::Failed {
            reason: reason.into(),
        };
        self.engine
            .transition(id, Operation::Fail, event)
            .await
            .map(drop)
    }

    #[instrument(skip(self), fields(consumer = %self.consumer_id))]
    pub async fn requeue(&self, id: JobId) -> Result<(), QueueError> {
        self.engine
            .transition(id, Operation::Requeue, HistoryEvent::Requeued)
            .await
            .map(drop)
    }

    pub async fn status(&self, id: JobId) -> Result<JobState, QueueError> {
        self.engine.state(id).await
    }

    pub async fn job(&self, id: JobId) -> Result<Job, QueueError> {
        self.engine.load(id).await
    }

    pub async fn jobs(&self, state: JobState) -> Result<Vec<Job>, QueueError> {
        self.engine.jobs(state).await
    }

    /// Jobs that are `queued` or `processing`.
    pub async fn count_active(&self) -> Result<usize, QueueError> {
        let mut total = 0;
        for state in JobState::ALL.into_iter().filter(JobState::is_active) {
            total += self.engine.count(state).await?;
        }
        Ok(total)
    }

    /// Fail `processing` jobs whose claim is older than `max_age`.
    #[instrument(skip(self), fields(consumer = %self.consumer_id))]
    pub async fn sweep_stale(&self, max_age: chrono::Duration) -> Result<Vec<JobId>, QueueError> {
        self.engine.sweep_stale(max_age).await
    }

    /// Create the state labels in the repository if they are missing.
    pub async fn ensure_labels(&self) -> Result<(), QueueError> {
        let specs = self.engine.codec().labels().specs();
        self.engine.adapter().ensure_labels(&specs).await
    }

    pub fn set_schema(&self, schema: Value) -> Result<(), QueueError> {
        self.schema.set(schema)
    }

    pub fn clear_schema(&self) {
        self.schema.clear();
    }

    pub fn get_schema(&self) -> Option<Value> {
        self.schema.document()
    }
}

impl JobQueue<GitHubStore> {
    /// Queue over the configured GitHub repository, with the configured
    /// start-up schema already installed.
    pub fn from_config(config: &QueueConfig) -> anyhow::Result<Self> {
        let (owner, name) = config.owner_and_name()?;
        let client = GitHubClient::with_base_url(
            config.token.clone(),
            owner.to_string(),
            name.to_string(),
            config.api_url.clone(),
        )
        .context("failed to build GitHub client")?;
        let store = GitHubStore::new(client, config.page_size);
        let queue = Self::new(store, QueueOptions::from(config))?;

        if let Some(schema) = config.load_schema()? {
            queue
                .set_schema(schema)
                .context("configured schema is not a valid JSON Schema")?;
        }
        Ok(queue)
    }
}
