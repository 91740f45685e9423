//! Background job records.
//!
//! Job rows are created on submission and mutated only by the job runner.
//! Status transitions are forward-only; readers must tolerate stale
//! progress counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tenant::TenantId;
use crate::error::{JobError, Result};

/// Kinds of long-running background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    /// Full rebuild of a tenant's lexical and vector indexes.
    IndexRebuild,
    /// Evaluation benchmark run.
    Benchmark,
}

impl JobKind {
    /// Stable tag for persistence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IndexRebuild => "index_rebuild",
            Self::Benchmark => "benchmark",
        }
    }

    /// Parses a persisted tag.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "index_rebuild" => Some(Self::IndexRebuild),
            "benchmark" => Some(Self::Benchmark),
            _ => None,
        }
    }
}

/// Job lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Enqueued, not yet picked up.
    Queued,
    /// Executing on the job worker.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl JobStatus {
    /// Stable tag for persistence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a persisted tag.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether the forward-only state machine permits `self -> next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running | Self::Cancelled | Self::Failed)
                | (Self::Running, Self::Completed | Self::Failed | Self::Cancelled)
        )
    }

    /// Whether the job has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Persisted record of a background job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job id.
    pub id: Uuid,
    /// Job kind.
    pub kind: JobKind,
    /// Current status.
    pub status: JobStatus,
    /// Owning tenant.
    pub tenant: TenantId,
    /// Submitting principal.
    pub initiator: Option<String>,
    /// Submission timestamp.
    pub created_at: DateTime<Utc>,
    /// When the worker picked the job up.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Estimated unit count, when computable up front.
    pub estimated: Option<u64>,
    /// Units processed so far; updated at checkpoints, may lag.
    pub processed: u64,
    /// Failure detail for `Failed` jobs.
    pub error: Option<String>,
}

impl JobRecord {
    /// Creates a freshly queued job record.
    #[must_use]
    pub fn new(kind: JobKind, tenant: TenantId, initiator: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: JobStatus::Queued,
            tenant,
            initiator,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            estimated: None,
            processed: 0,
            error: None,
        }
    }

    /// Advances the status, enforcing the forward-only state machine and
    /// stamping the relevant timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::IllegalTransition`] for backward or repeated
    /// transitions.
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(JobError::IllegalTransition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            }
            .into());
        }
        self.status = next;
        match next {
            JobStatus::Running => self.started_at = Some(Utc::now()),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                self.completed_at = Some(Utc::now());
            }
            JobStatus::Queued => {}
        }
        Ok(())
    }
}
