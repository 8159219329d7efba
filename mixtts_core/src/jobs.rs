//! Job registry and the job state machine.
//!
//! `Queued -> Running -> {Finished | Error | Cancelled}`. Once a job reaches a
//! terminal state every further update is ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Error | JobStatus::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job not finished (status: {0})")]
    NotFinished(JobStatus),

    #[error("No text content to convert")]
    NoContent,

    #[error("Conversion failed: {0}")]
    Failed(String),
}

/// What pollers see. Never includes the audio artifact.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub percent: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct JobCounts {
    pub queued: usize,
    pub running: usize,
    pub finished: usize,
    pub error: usize,
    pub cancelled: usize,
}

/// The encoded narration of a finished job.
#[derive(Debug, Clone)]
pub struct JobArtifact {
    pub wav: Vec<u8>,
    pub duration_ms: u64,
    pub sample_rate: u32,
    pub segments: usize,
}

#[derive(Debug)]
struct JobEntry {
    snapshot: JobSnapshot,
    artifact: Option<Arc<JobArtifact>>,
    cancelled: Arc<AtomicBool>,
}

/// Process-wide job table.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, JobEntry>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> JobId {
        let id = JobId::new();
        self.jobs.insert(
            id.clone(),
            JobEntry {
                snapshot: JobSnapshot {
                    job_id: id.clone(),
                    status: JobStatus::Queued,
                    percent: 0,
                    message: "Queued".into(),
                    error: None,
                    updated: Utc::now(),
                },
                artifact: None,
                cancelled: Arc::new(AtomicBool::new(false)),
            },
        );
        id
    }

    /// Apply `f` to a non-terminal job. Returns false if the job is unknown
    /// or already terminal.
    fn transition(&self, id: &JobId, f: impl FnOnce(&mut JobEntry)) -> bool {
        match self.jobs.get_mut(id) {
            Some(mut entry) if !entry.snapshot.status.is_terminal() => {
                f(&mut entry);
                entry.snapshot.updated = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Report progress. Moves a queued job to running; the percentage never
    /// goes backwards and is capped at 99 until the job finishes.
    pub fn update(&self, id: &JobId, percent: u8, message: impl Into<String>) -> bool {
        let message = message.into();
        self.transition(id, |entry| {
            let snap = &mut entry.snapshot;
            snap.status = JobStatus::Running;
            snap.percent = snap.percent.max(percent.min(99));
            snap.message = message;
        })
    }

    pub fn finish(&self, id: &JobId, artifact: JobArtifact) -> bool {
        self.transition(id, |entry| {
            entry.snapshot.status = JobStatus::Finished;
            entry.snapshot.percent = 100;
            entry.snapshot.message = "Completed".into();
            entry.artifact = Some(Arc::new(artifact));
        })
    }

    /// Mark the job failed. The percentage stays where it was.
    pub fn fail(&self, id: &JobId, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.transition(id, |entry| {
            entry.snapshot.status = JobStatus::Error;
            entry.snapshot.message = format!("Conversion failed: {reason}");
            entry.snapshot.error = Some(reason);
        })
    }

    /// Cancel a job. Cancelling a terminal job is a no-op that still returns
    /// its snapshot.
    pub fn cancel(&self, id: &JobId) -> Result<JobSnapshot, JobError> {
        self.transition(id, |entry| {
            entry.cancelled.store(true, Ordering::SeqCst);
            entry.snapshot.status = JobStatus::Cancelled;
            entry.snapshot.message = "Cancelled".into();
        });
        self.snapshot(id)
    }

    /// Flag the running task polls to notice cancellation.
    pub fn cancel_flag(&self, id: &JobId) -> Option<Arc<AtomicBool>> {
        self.jobs.get(id).map(|e| e.cancelled.clone())
    }

    pub fn snapshot(&self, id: &JobId) -> Result<JobSnapshot, JobError> {
        self.jobs
            .get(id)
            .map(|e| e.snapshot.clone())
            .ok_or_else(|| JobError::NotFound(id.clone()))
    }

    /// The finished audio, only once the job is `Finished`.
    pub fn artifact(&self, id: &JobId) -> Result<Arc<JobArtifact>, JobError> {
        let entry = self.jobs.get(id).ok_or_else(|| JobError::NotFound(id.clone()))?;
        match (&entry.artifact, entry.snapshot.status) {
            (Some(artifact), JobStatus::Finished) => Ok(artifact.clone()),
            (_, status) => Err(JobError::NotFinished(status)),
        }
    }

    /// Drop terminal jobs last updated more than `max_age` ago. Returns how
    /// many were removed.
    pub fn evict_expired(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let cutoff = Utc::now() - max_age;
        let before = self.jobs.len();
        self.jobs
            .retain(|_, e| !(e.snapshot.status.is_terminal() && e.snapshot.updated < cutoff));
        before - self.jobs.len()
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for entry in self.jobs.iter() {
            match entry.snapshot.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Finished => counts.finished += 1,
                JobStatus::Error => counts.error += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
