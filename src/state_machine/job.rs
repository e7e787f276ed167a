use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::JobState;

/// Identifier assigned by the store at creation (the issue number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = std::num::ParseIntError;

    /// Accepts both `42` and `#42`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(JobId)
    }
}

/// A transition event recorded in a job's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryEvent {
    Enqueued,
    Claimed,
    Completed,
    Failed { reason: String },
    Requeued,
}

impl HistoryEvent {
    /// Parse a note body written by the engine. Anything else attached to the
    /// issue (for example a human comment) is not history and yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "enqueued" => Some(HistoryEvent::Enqueued),
            "claimed" => Some(HistoryEvent::Claimed),
            "completed" => Some(HistoryEvent::Completed),
            "requeued" => Some(HistoryEvent::Requeued),
            other => other
                .strip_prefix("failed: ")
                .map(|reason| HistoryEvent::Failed {
                    reason: reason.to_string(),
                }),
        }
    }
}

impl fmt::Display for HistoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryEvent::Enqueued => write!(f, "enqueued"),
            HistoryEvent::Claimed => write!(f, "claimed"),
            HistoryEvent::Completed => write!(f, "completed"),
            HistoryEvent::Failed { reason } => write!(f, "failed: {reason}"),
            HistoryEvent::Requeued => write!(f, "requeued"),
        }
    }
}

/// One write-once entry of a job's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub event: HistoryEvent,
    pub at: DateTime<Utc>,
}

/// A unit of work, decoded from one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub title: String,
    pub data: serde_json::Value,
    pub state: JobState,
    /// Producer-supplied labels; the state label is not included.
    pub labels: Vec<String>,
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// When the job entered its current state, taken from the newest history
    /// entry.
    pub fn entered_state_at(&self) -> DateTime<Utc> {
        self.history
            .last()
            .map(|entry| entry.at)
            .unwrap_or(self.created_at)
    }

    /// History rendered as note text, oldest first.
    pub fn history_events(&self) -> Vec<String> {
        self.history.iter().map(|e| e.event.to_string()).collect()
    }

    /// Timestamp of the most recent claim, if the job was ever claimed.
    pub fn last_claimed_at(&self) -> Option<DateTime<Utc>> {
        self.history
            .iter()
            .rev()
            .find(|e| e.event == HistoryEvent::Claimed)
            .map(|e| e.at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job_with_history(events: &[HistoryEvent]) -> Job {
        let start = Utc::now() - Duration::minutes(10);
        Job {
            id: JobId(7),
            title: "Job".into(),
            data: serde_json::json!({"k": "v"}),
            state: JobState::Processing,
            labels: vec![],
            history: events
                .iter()
                .enumerate()
                .map(|(i, e)| HistoryEntry {
                    event: e.clone(),
                    at: start + Duration::minutes(i as i64),
                })
                .collect(),
            created_at: start,
        }
    }

    #[test]
    fn job_id_parses_with_or_without_hash() {
        assert_eq!("42".parse::<JobId>().unwrap(), JobId(42));
        assert_eq!("#42".parse::<JobId>().unwrap(), JobId(42));
        assert!("forty-two".parse::<JobId>().is_err());
    }

    #[test]
    fn history_event_display_and_parse_agree() {
        let events = [
            HistoryEvent::Enqueued,
            HistoryEvent::Claimed,
            HistoryEvent::Completed,
            HistoryEvent::Failed {
                reason: "disk full".into(),
            },
            HistoryEvent::Requeued,
        ];
        for event in events {
            assert_eq!(HistoryEvent::parse(&event.to_string()), Some(event));
        }
    }

    #[test]
    fn foreign_comments_are_not_history() {
        assert_eq!(HistoryEvent::parse("LGTM, thanks!"), None);
        assert_eq!(HistoryEvent::parse("failed"), None);
    }

    #[test]
    fn failure_reason_keeps_its_text() {
        let parsed = HistoryEvent::parse("failed: timeout: upstream said no").unwrap();
        assert_eq!(
            parsed,
            HistoryEvent::Failed {
                reason: "timeout: upstream said no".into()
            }
        );
    }

    #[test]
    fn entered_state_at_uses_newest_entry() {
        let job = job_with_history(&[HistoryEvent::Enqueued, HistoryEvent::Claimed]);
        assert_eq!(job.entered_state_at(), job.history[1].at);
        assert_eq!(job.last_claimed_at(), Some(job.history[1].at));
    }

    #[test]
    fn never_claimed_job_has_no_claim_time() {
        let job = job_with_history(&[HistoryEvent::Enqueued]);
        assert_eq!(job.last_claimed_at(), None);
        assert_eq!(job.history_events(), vec!["enqueued"]);
    }
}
