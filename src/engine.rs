use std::collections::HashSet;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::codec::{self, LabelCodec};
use crate::error::QueueError;
use crate::state_machine::{HistoryEvent, Job, JobId, JobState, Operation, StateMachine};
use crate::store::{IssueRecord, IssueStore, Note, StoreAdapter, SwapOutcome};

/// Drives jobs through the state machine against the remote store.
///
/// Keeps no copy of remote state between calls: every decision starts from
/// a fresh read, and every mutation is a conditional label swap.
pub struct LifecycleEngine<S> {
    adapter: StoreAdapter<S>,
    codec: LabelCodec,
}

impl<S: IssueStore> LifecycleEngine<S> {
    pub fn new(adapter: StoreAdapter<S>, codec: LabelCodec) -> Self {
        Self { adapter, codec }
    }

    pub fn adapter(&self) -> &StoreAdapter<S> {
        &self.adapter
    }

    pub fn codec(&self) -> &LabelCodec {
        &self.codec
    }

    /// Create the issue for an already validated payload.
    pub async fn enqueue(
        &self,
        data: &serde_json::Value,
        title: Option<String>,
        additional_labels: &[String],
    ) -> Result<JobId, QueueError> {
        if let Some(label) = self.codec.reserved_label(additional_labels) {
            return Err(QueueError::ReservedLabel(label.to_string()));
        }
        let issue = self
            .codec
            .new_issue(data, title, additional_labels)
            .map_err(|e| QueueError::Validation {
                details: vec![e.to_string()],
            })?;
        let created = self.adapter.create(&issue).await?;
        let id = JobId(created.number);
        info!(job = %id, title = %created.title, "job enqueued");
        Ok(id)
    }

    /// Claim the oldest queued job this call can win.
    ///
    /// Candidates are tried strictly one after another, oldest first. A
    /// conflict means another consumer won that job; the next candidate is
    /// tried and the lost one is never retried. Pages are fetched only once
    /// the previous page is used up.
    ///
    /// Every job lost to another consumer leaves the `queued` listing and
    /// shifts the later pages forward, so a page with a lost candidate is
    /// followed by a fresh scan from page 1 rather than by the next page.
    /// Each rescan needs at least one newly attempted job, so the loop ends.
    pub async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        let queued = self.codec.state_label(JobState::Queued).to_string();
        let processing = self.codec.state_label(JobState::Processing).to_string();
        let mut attempted: HashSet<u64> = HashSet::new();
        let mut page = Some(1);

        while let Some(number) = page {
            let listing = self.adapter.list(&queued, number).await?;
            let mut lost = false;

            for issue in listing.issues {
                if !attempted.insert(issue.number) {
                    continue;
                }
                let id = JobId(issue.number);
                let Some((labels, data)) = self.claimable(&issue) else {
                    continue;
                };

                match self.adapter.swap_label(id, &queued, &processing).await {
                    Ok(SwapOutcome::Swapped(_)) => {}
                    Ok(SwapOutcome::Conflict) => {
                        debug!(job = %id, "candidate claimed by another consumer");
                        lost = true;
                        continue;
                    }
                    Err(QueueError::NotFound(_)) => {
                        debug!(job = %id, "candidate disappeared before it could be claimed");
                        lost = true;
                        continue;
                    }
                    Err(err) => return Err(err),
                }

                self.record(id, JobState::Processing, &HistoryEvent::Claimed)
                    .await?;
                info!(job = %id, "job claimed");

                let history = match self.adapter.notes(id).await {
                    Ok(notes) => codec::decode_history(issue.created_at, &notes),
                    Err(err) => {
                        warn!(job = %id, error = %err, "claimed job returned without its full history");
                        codec::decode_history(
                            issue.created_at,
                            &[Note {
                                body: HistoryEvent::Claimed.to_string(),
                                created_at: Utc::now(),
                            }],
                        )
                    }
                };

                return Ok(Some(Job {
                    id,
                    title: issue.title,
                    data,
                    state: JobState::Processing,
                    labels,
                    history,
                    created_at: issue.created_at,
                }));
            }

            page = if lost {
                debug!(page = number, "candidates lost on this page, rescanning from the start");
                Some(1)
            } else {
                listing.next_page
            };
        }

        debug!("no queued job available");
        Ok(None)
    }

    /// Decode a listed candidate; anything inconsistent is skipped, never claimed.
    fn claimable(&self, issue: &IssueRecord) -> Option<(Vec<String>, serde_json::Value)> {
        let (state, labels) = match self.codec.decode(&issue.labels) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(job = issue.number, error = %err, "skipping candidate with inconsistent labels");
                return None;
            }
        };
        if state != JobState::Queued {
            return None;
        }
        match codec::decode_body(&issue.body) {
            Ok(data) => Some((labels, data)),
            Err(err) => {
                warn!(job = issue.number, error = %err, "skipping candidate with unreadable payload");
                None
            }
        }
    }

    /// Apply `op` to the job's freshly read state and record `event`.
    ///
    /// A conflicting swap is re-read. If the job already sits in the target
    /// state the swap may have been ours (applied, then its response lost and
    /// the call retried) or a concurrent caller's; that case is
    /// [`QueueError::Unconfirmed`] and no note is written. Any other state is
    /// [`QueueError::InvalidTransition`].
    pub async fn transition(
        &self,
        id: JobId,
        op: Operation,
        event: HistoryEvent,
    ) -> Result<JobState, QueueError> {
        let from = self.state(id).await?;
        let to = StateMachine::next(from, op)
            .map_err(|e| QueueError::InvalidTransition { id, from: e.from, op })?;

        let outcome = self
            .adapter
            .swap_label(id, self.codec.state_label(from), self.codec.state_label(to))
            .await?;
        if outcome == SwapOutcome::Conflict {
            let now = self.state(id).await?;
            warn!(job = %id, expected = %from, found = %now, "job moved concurrently");
            if now == to {
                return Err(QueueError::Unconfirmed { id, op, state: now });
            }
            return Err(QueueError::InvalidTransition { id, from: now, op });
        }

        self.record(id, to, &event).await?;
        info!(job = %id, %from, %to, "job transitioned");
        self.reflect_open_flag(id, to).await;
        Ok(to)
    }

    /// Current state, decoded from a fresh read of the labels.
    pub async fn state(&self, id: JobId) -> Result<JobState, QueueError> {
        let issue = self.adapter.get(id).await?;
        self.codec
            .decode(&issue.labels)
            .map(|(state, _)| state)
            .map_err(|source| QueueError::Codec { id, source })
    }

    /// The full job, history included.
    pub async fn load(&self, id: JobId) -> Result<Job, QueueError> {
        let issue = self.adapter.get(id).await?;
        let notes = self.adapter.notes(id).await?;
        self.codec
            .decode_issue(&issue, &notes)
            .map_err(|source| QueueError::Codec { id, source })
    }

    /// Every job currently in `state`, oldest first. Issues that do not
    /// decode cleanly are skipped.
    pub async fn jobs(&self, state: JobState) -> Result<Vec<Job>, QueueError> {
        let mut jobs = Vec::new();
        for issue in self.list_all(state).await? {
            let id = JobId(issue.number);
            let notes = self.adapter.notes(id).await?;
            match self.codec.decode_issue(&issue, &notes) {
                Ok(job) if job.state == state => jobs.push(job),
                Ok(_) => {}
                Err(err) => warn!(job = %id, error = %err, "skipping undecodable job"),
            }
        }
        Ok(jobs)
    }

    /// Number of issues that decode to exactly `state`.
    pub async fn count(&self, state: JobState) -> Result<usize, QueueError> {
        let issues = self.list_all(state).await?;
        Ok(issues
            .iter()
            .filter(|i| matches!(self.codec.decode(&i.labels), Ok((s, _)) if s == state))
            .count())
    }

    /// Fail every `processing` job claimed longer than `max_age` ago.
    pub async fn sweep_stale(&self, max_age: Duration) -> Result<Vec<JobId>, QueueError> {
        let cutoff = Utc::now() - max_age;
        let mut swept = Vec::new();

        for job in self.jobs(JobState::Processing).await? {
            let claimed_at = job.last_claimed_at().unwrap_or(job.created_at);
            if claimed_at > cutoff {
                continue;
            }
            let reason = format!("claim expired after {}s", max_age.num_seconds());
            match self
                .transition(job.id, Operation::Fail, HistoryEvent::Failed { reason })
                .await
            {
                Ok(_) => {
                    info!(job = %job.id, %claimed_at, "stale claim swept");
                    swept.push(job.id);
                }
                Err(QueueError::InvalidTransition { from, .. }) => {
                    debug!(job = %job.id, state = %from, "job finished before it could be swept");
                }
                Err(QueueError::Unconfirmed { .. }) => {
                    warn!(job = %job.id, "stale claim is failed but the sweep was not confirmed");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(swept)
    }

    async fn list_all(&self, state: JobState) -> Result<Vec<IssueRecord>, QueueError> {
        let label = self.codec.state_label(state).to_string();
        let mut issues = Vec::new();
        let mut page = Some(1);
        while let Some(number) = page {
            let listing = self.adapter.list(&label, number).await?;
            page = listing.next_page;
            issues.extend(listing.issues);
        }
        Ok(issues)
    }

    async fn record(
        &self,
        id: JobId,
        state: JobState,
        event: &HistoryEvent,
    ) -> Result<Note, QueueError> {
        self.adapter
            .append_note(id, &event.to_string())
            .await
            .map_err(|source| QueueError::HistoryNotRecorded {
                id,
                state,
                source: Box::new(source),
            })
    }

    /// Closed while terminal, open otherwise. Presentational only, so a
    /// failure here never fails the transition.
    async fn reflect_open_flag(&self, id: JobId, state: JobState) {
        let open = !state.is_terminal();
        if let Err(err) = self.adapter.set_open(id, open).await {
            warn!(job = %id, open, error = %err, "could not update issue open flag");
        }
    }
}
