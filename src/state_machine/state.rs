use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The four states a job can be in.
///
/// Each job flows through: QUEUED → PROCESSING → COMPLETED | FAILED, and
/// leaves a terminal state only through a requeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 4] = [
        JobState::Queued,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// `completed` and `failed` can only be left through a requeue.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Counted by [`JobQueue::count_active`](crate::JobQueue::count_active).
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Processing)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An engine-mediated operation on an existing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Dequeue,
    Complete,
    Fail,
    Requeue,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Dequeue => write!(f, "dequeue"),
            Operation::Complete => write!(f, "complete"),
            Operation::Fail => write!(f, "fail"),
            Operation::Requeue => write!(f, "requeue"),
        }
    }
}

/// A (state, operation) pair with no row in the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {op} a job that is {from}")]
pub struct IllegalTransition {
    pub from: JobState,
    pub op: Operation,
}

/// The transition table. Holds no state; every decision is made from the
/// state the caller just read from the store.
pub struct StateMachine;

impl StateMachine {
    /// Compute the state a job in `from` moves to under `op`.
    ///
    /// - `queued` --dequeue--> `processing`
    /// - `processing` --complete--> `completed`
    /// - `processing` --fail--> `failed`
    /// - `completed` | `failed` --requeue--> `queued`
    pub fn next(from: JobState, op: Operation) -> Result<JobState, IllegalTransition> {
        match (from, op) {
            (JobState::Queued, Operation::Dequeue) => Ok(JobState::Processing),
            (JobState::Processing, Operation::Complete) => Ok(JobState::Completed),
            (JobState::Processing, Operation::Fail) => Ok(JobState::Failed),
            (JobState::Completed | JobState::Failed, Operation::Requeue) => Ok(JobState::Queued),
            (from, op) => Err(IllegalTransition { from, op }),
        }
    }
}
