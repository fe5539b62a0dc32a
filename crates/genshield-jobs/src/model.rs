// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job records and the status view handed to pollers.

use chrono::{DateTime, Utc};
use genshield_core::{GenerationRequest, GenerationResult, JobId, Priority};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of a background job.
///
/// `queued → processing → completed | failed`. A failed attempt with budget
/// left goes back to `queued` with a delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Submission options for [`JobProcessor::enqueue`](crate::JobProcessor::enqueue).
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub user_id: Option<String>,
    pub priority: Option<Priority>,
    /// Overrides the processor-wide attempt budget.
    pub max_attempts: Option<u32>,
}

impl JobOptions {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub state: JobState,
    pub attempt: u32,
    pub at: DateTime<Utc>,
}

/// Everything persisted about a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub user_id: Option<String>,
    pub request: GenerationRequest,
    pub priority: Priority,
    pub max_attempts: u32,
    /// Attempts started so far.
    pub attempts: u32,
    pub state: JobState,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Earliest time a queued retry may be dispatched.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub result: Option<GenerationResult>,
    pub last_error: Option<String>,
    pub history: Vec<StateChange>,
}

impl JobRecord {
    pub fn new(
        request: GenerationRequest,
        user_id: Option<String>,
        priority: Priority,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::generate(),
            user_id,
            request,
            priority,
            max_attempts: max_attempts.max(1),
            attempts: 0,
            state: JobState::Queued,
            message: "Waiting in queue".to_string(),
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            next_attempt_at: None,
            result: None,
            last_error: None,
            history: vec![StateChange {
                state: JobState::Queued,
                attempt: 0,
                at: now,
            }],
        }
    }

    /// Move to `state`, stamping the time and recording the change.
    pub(crate) fn transition(&mut self, state: JobState, message: String, now: DateTime<Utc>) {
        self.state = state;
        self.message = message;
        self.updated_at = now;
        self.history.push(StateChange {
            state,
            attempt: self.attempts,
            at: now,
        });
    }

    /// Retries used by a finished job.
    pub fn retry_count(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    /// The sequence of states the job has passed through.
    pub fn state_trail(&self) -> Vec<JobState> {
        self.history.iter().map(|c| c.state).collect()
    }
}

/// What a poller sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    /// Estimated completion, 0 to 100.
    pub progress: u8,
    pub message: String,
    pub attempts: u32,
    pub retry_count: u32,
    pub result: Option<GenerationResult>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal record of a job that used up its attempts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub job_id: JobId,
    pub user_id: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl From<&JobRecord> for DeadLetter {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.id.clone(),
            user_id: record.user_id.clone(),
            attempts: record.attempts,
            last_error: record.last_error.clone(),
            failed_at: record.finished_at,
        }
    }
}

/// Processor counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobStats {
    pub queued: usize,
    /// Queued retries still waiting out their backoff.
    pub delayed: usize,
    pub processing: usize,
    pub total_enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub avg_duration_ms: f64,
}
