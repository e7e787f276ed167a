mod job;
mod state;

pub use job::{HistoryEntry, HistoryEvent, Job, JobId};
pub use state::{IllegalTransition, JobState, Operation, StateMachine};
