//! Mapping between jobs and their issue representation.
//!
//! - state ⇄ exactly one label from the [`StateLabels`] vocabulary
//! - payload ⇄ issue body, as a fenced ```` ```json ```` block
//! - history ⇄ the issue's creation plus the engine's own notes

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state_machine::{HistoryEntry, HistoryEvent, Job, JobId, JobState};
use crate::store::{IssueRecord, LabelSpec, NewIssue, Note};

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("ambiguous state: labels {0:?} each name a state")]
    AmbiguousState(Vec<String>),

    #[error("unknown state: no state label attached")]
    UnknownState,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Label names used to encode each [`JobState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateLabels {
    #[serde(default = "default_queued")]
    pub queued: String,
    #[serde(default = "default_processing")]
    pub processing: String,
    #[serde(default = "default_completed")]
    pub completed: String,
    #[serde(default = "default_failed")]
    pub failed: String,
}

fn default_queued() -> String {
    "queued".to_string()
}

fn default_processing() -> String {
    "processing".to_string()
}

fn default_completed() -> String {
    "completed".to_string()
}

fn default_failed() -> String {
    "failed".to_string()
}

impl Default for StateLabels {
    fn default() -> Self {
        Self {
            queued: default_queued(),
            processing: default_processing(),
            completed: default_completed(),
            failed: default_failed(),
        }
    }
}

impl StateLabels {
    pub fn label(&self, state: JobState) -> &str {
        match state {
            JobState::Queued => &self.queued,
            JobState::Processing => &self.processing,
            JobState::Completed => &self.completed,
            JobState::Failed => &self.failed,
        }
    }

    /// Each state needs its own non-empty label, or one swap could satisfy
    /// two states. Commas are rejected since the listing filter is a
    /// comma-separated label list.
    pub fn validate(&self) -> Result<(), String> {
        for (i, state) in JobState::ALL.into_iter().enumerate() {
            let label = self.label(state);
            if label.trim().is_empty() {
                return Err(format!("label for `{state}` is empty"));
            }
            if label.contains(',') {
                return Err(format!("label `{label}` for `{state}` contains a comma"));
            }
            if let Some(other) = JobState::ALL[..i].iter().find(|s| self.label(**s) == label) {
                return Err(format!("`{other}` and `{state}` share the label `{label}`"));
            }
        }
        Ok(())
    }

    pub fn state_of(&self, label: &str) -> Option<JobState> {
        JobState::ALL.into_iter().find(|s| self.label(*s) == label)
    }

    /// The vocabulary as repository labels, with their colours.
    pub fn specs(&self) -> Vec<LabelSpec> {
        JobState::ALL
            .into_iter()
            .map(|state| LabelSpec {
                name: self.label(state).to_string(),
                color: state_color(state).to_string(),
            })
            .collect()
    }
}

fn state_color(state: JobState) -> &'static str {
    match state {
        JobState::Queued => "0dbf66",
        JobState::Processing => "0052cc",
        JobState::Completed => "2cbe4e",
        JobState::Failed => "d93f0b",
    }
}

/// Encodes and decodes the issue representation of a job.
#[derive(Debug, Clone, Default)]
pub struct LabelCodec {
    labels: StateLabels,
}

impl LabelCodec {
    pub fn new(labels: StateLabels) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &StateLabels {
        &self.labels
    }

    pub fn state_label(&self, state: JobState) -> &str {
        self.labels.label(state)
    }

    /// The state label first, then `additional` untouched.
    pub fn encode(&self, state: JobState, additional: &[String]) -> Vec<String> {
        let mut labels = Vec::with_capacity(additional.len() + 1);
        labels.push(self.state_label(state).to_string());
        labels.extend(additional.iter().cloned());
        labels
    }

    /// Split a label set into its state and the producer-supplied remainder.
    pub fn decode(&self, labels: &[String]) -> Result<(JobState, Vec<String>), CodecError> {
        let mut states: Vec<JobState> = Vec::new();
        let mut additional = Vec::new();
        for label in labels {
            match self.labels.state_of(label) {
                Some(state) if !states.contains(&state) => states.push(state),
                Some(_) => {}
                None => additional.push(label.clone()),
            }
        }

        match states.as_slice() {
            [] => Err(CodecError::UnknownState),
            [state] => Ok((*state, additional)),
            many => Err(CodecError::AmbiguousState(
                many.iter()
                    .map(|s| self.state_label(*s).to_string())
                    .collect(),
            )),
        }
    }

    /// First label in `additional` that belongs to the state vocabulary.
    pub fn reserved_label<'a>(&self, additional: &'a [String]) -> Option<&'a str> {
        additional
            .iter()
            .find(|l| self.labels.state_of(l).is_some())
            .map(String::as_str)
    }

    /// Issue fields for a freshly enqueued job.
    pub fn new_issue(
        &self,
        data: &serde_json::Value,
        title: Option<String>,
        additional: &[String],
    ) -> Result<NewIssue, CodecError> {
        Ok(NewIssue {
            title: title.unwrap_or_else(|| default_title(Utc::now())),
            body: encode_body(data)?,
            labels: self.encode(JobState::Queued, additional),
        })
    }

    /// Rebuild a job from an issue and its notes.
    pub fn decode_issue(&self, issue: &IssueRecord, notes: &[Note]) -> Result<Job, CodecError> {
        let (state, labels) = self.decode(&issue.labels)?;
        Ok(Job {
            id: JobId(issue.number),
            title: issue.title.clone(),
            data: decode_body(&issue.body)?,
            state,
            labels,
            history: decode_history(issue.created_at, notes),
            created_at: issue.created_at,
        })
    }
}

pub fn default_title(now: DateTime<Utc>) -> String {
    format!("Job {}", now.to_rfc3339_opts(SecondsFormat::Secs, true))
}

pub fn encode_body(data: &serde_json::Value) -> Result<String, CodecError> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| CodecError::MalformedPayload(e.to_string()))?;
    Ok(format!("{JSON_FENCE}\n{json}\n{FENCE}"))
}

/// Read the payload from the first ```` ```json ```` fence, or from the whole
/// body when it carries no fence.
pub fn decode_body(body: &str) -> Result<serde_json::Value, CodecError> {
    let json = match body.find(JSON_FENCE) {
        Some(start) => {
            let rest = &body[start + JSON_FENCE.len()..];
            let end = rest
                .find(FENCE)
                .ok_or_else(|| CodecError::MalformedPayload("unterminated json fence".into()))?;
            &rest[..end]
        }
        None => body,
    };
    serde_json::from_str(json.trim()).map_err(|e| CodecError::MalformedPayload(e.to_string()))
}

/// Issue creation is the `enqueued` entry; each engine note is one more.
pub fn decode_history(created_at: DateTime<Utc>, notes: &[Note]) -> Vec<HistoryEntry> {
    let mut history = vec![HistoryEntry {
        event: HistoryEvent::Enqueued,
        at: created_at,
    }];
    history.extend(notes.iter().filter_map(|note| {
        HistoryEvent::parse(&note.body).map(|event| HistoryEntry {
            event,
            at: note.created_at,
        })
    }));
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn decode_inverts_encode_for_every_state() {
        let codec = LabelCodec::default();
        let extra = labels(&["mastodon", "priority/low"]);
        for state in JobState::ALL {
            let encoded = codec.encode(state, &extra);
            let (decoded, rest) = codec.decode(&encoded).unwrap();
            assert_eq!(decoded, state);
            assert_eq!(rest, extra);
        }
    }

    #[test]
    fn two_state_labels_are_ambiguous() {
        let codec = LabelCodec::default();
        let err = codec
            .decode(&labels(&["queued", "bug", "processing"]))
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::AmbiguousState(labels(&["queued", "processing"]))
        );
    }

    #[test]
    fn repeated_state_label_is_not_ambiguous() {
        let codec = LabelCodec::default();
        let (state, rest) = codec.decode(&labels(&["failed", "failed"])).unwrap();
        assert_eq!(state, JobState::Failed);
        assert!(rest.is_empty());
    }

    #[test]
    fn no_state_label_is_unknown() {
        let codec = LabelCodec::default();
        assert_eq!(
            codec.decode(&labels(&["bug"])).unwrap_err(),
            CodecError::UnknownState
        );
    }

    #[test]
    fn custom_vocabulary() {
        let codec = LabelCodec::new(StateLabels {
            queued: "pending".into(),
            ..StateLabels::default()
        });
        assert_eq!(codec.encode(JobState::Queued, &[]), labels(&["pending"]));
        assert_eq!(codec.decode(&labels(&["queued"])).unwrap_err(), CodecError::UnknownState);
        assert_eq!(codec.reserved_label(&labels(&["x", "pending"])), Some("pending"));
        assert_eq!(codec.reserved_label(&labels(&["queued"])), None);
    }

    #[test]
    fn body_keeps_unicode_and_structure() {
        let data = json!({"title": "Test Issue 😃", "body": "äöü, 世界 🌎", "labels": ["bug"]});
        let body = encode_body(&data).unwrap();
        assert!(body.starts_with("```json\n"));
        assert!(body.contains("世界"));
        assert_eq!(decode_body(&body).unwrap(), data);
    }

    #[test]
    fn body_payload_is_found_inside_surrounding_prose() {
        let body = "Please process this.\n\n```json\n{\"k\": \"v\"}\n```\n\nThanks";
        assert_eq!(decode_body(body).unwrap(), json!({"k": "v"}));
    }

    #[test]
    fn unfenced_json_body_is_accepted() {
        assert_eq!(decode_body(" {\"k\": 1} ").unwrap(), json!({"k": 1}));
    }

    #[test]
    fn garbage_body_is_malformed() {
        assert!(matches!(
            decode_body("not json"),
            Err(CodecError::MalformedPayload(_))
        ));
        assert!(matches!(
            decode_body("```json\n{\"k\": 1}"),
            Err(CodecError::MalformedPayload(_))
        ));
    }

    #[test]
    fn history_starts_at_creation_and_skips_foreign_notes() {
        let created = Utc::now();
        let notes = vec![
            Note {
                body: "claimed".into(),
                created_at: created,
            },
            Note {
                body: "looks good to me".into(),
                created_at: created,
            },
            Note {
                body: "failed: boom".into(),
                created_at: created,
            },
        ];
        let events: Vec<String> = decode_history(created, &notes)
            .iter()
            .map(|e| e.event.to_string())
            .collect();
        assert_eq!(events, vec!["enqueued", "claimed", "failed: boom"]);
    }

    #[test]
    fn default_title_is_timestamped() {
        let now = "2026-10-14T08:30:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(default_title(now), "Job 2026-10-14T08:30:00Z");
    }

    #[test]
    fn label_specs_cover_every_state() {
        let specs = StateLabels::default().specs();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["queued", "processing", "completed", "failed"]);
        assert_eq!(specs[3].color, "d93f0b");
    }
    #[test]
    fn default_vocabulary_is_valid() {
        assert!(StateLabels::default().validate().is_ok());
    }

    #[test]
    fn shared_state_label_is_rejected() {
        let labels = StateLabels {
            processing: "queued".into(),
            ..StateLabels::default()
        };
        let err = labels.validate().unwrap_err();
        assert!(err.contains("`queued` and `processing`"), "{err}");
    }

    #[test]
    fn empty_or_comma_labels_are_rejected() {
        let empty = StateLabels {
            failed: "  ".into(),
            ..StateLabels::default()
        };
        assert!(empty.validate().unwrap_err().contains("empty"));

        let comma = StateLabels {
            completed: "done,ok".into(),
            ..StateLabels::default()
        };
        assert!(comma.validate().unwrap_err().contains("comma"));
    }
}
