//! A job queue whose system of record is a GitHub repository.
//!
//! Every job is an issue, its state is one label out of a fixed vocabulary,
//! its payload is the issue body and its history is the issue's comments.
//! Consumers in separate processes claim jobs through a conditional label
//! swap, so a job is claimed at most once even when they race.
//!
//! ```no_run
//! use octoqueue::{JobQueue, QueueConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let queue = JobQueue::from_config(&QueueConfig::load()?)?;
//! let id = queue.enqueue(serde_json::json!({"k": "v"}), None, vec![]).await?;
//! if let Some(job) = queue.dequeue().await? {
//!     queue.complete(job.id).await?;
//! }
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod github;
pub mod queue;
pub mod state_machine;
pub mod store;
pub mod validator;

pub use codec::{CodecError, LabelCodec, StateLabels};
pub use config::QueueConfig;
pub use error::{QueueError, StoreError};
pub use queue::{JobQueue, QueueOptions};
pub use state_machine::{HistoryEntry, HistoryEvent, Job, JobId, JobState, Operation};
pub use store::{IssueStore, MemoryStore, RetryConfig};
