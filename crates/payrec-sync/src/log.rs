//! Run-level sync log.
//!
//! One [`SyncLog`] is created per sync run, mutated by progress checkpoints
//! while the run is live, and finalized exactly once. Status transitions are
//! monotonic: `Pending -> Running -> {Completed | Failed}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::types::{SyncProgress, SyncType};

/// Maximum number of error strings sampled onto a log.
pub const ERROR_SAMPLE_LIMIT: usize = 10;

/// Lifecycle state of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncLogStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SyncLogStatus {
    /// Whether the run has reached a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl std::fmt::Display for SyncLogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Persistent record of one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: Uuid,
    pub sync_type: SyncType,
    pub status: SyncLogStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_processed: u64,
    pub records_created: u64,
    pub records_updated: u64,
    pub records_failed: u64,
    /// Bounded sample of error messages from failed items.
    pub error_sample: Vec<String>,
    /// Optional filters the run was invoked with.
    pub filters: Option<serde_json::Value>,
}

impl SyncLog {
    /// Create a new pending log for a run.
    #[must_use]
    pub fn new(sync_type: SyncType, filters: Option<serde_json::Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sync_type,
            status: SyncLogStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            records_processed: 0,
            records_created: 0,
            records_updated: 0,
            records_failed: 0,
            error_sample: Vec::new(),
            filters,
        }
    }

    /// Transition to a new status, enforcing monotonicity.
    pub fn transition(&mut self, to: SyncLogStatus) -> SyncResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(SyncError::invalid_transition(
                self.status.to_string(),
                to.to_string(),
            ));
        }
        self.status = to;
        if to.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Mark the run as started.
    pub fn begin(&mut self) -> SyncResult<()> {
        self.transition(SyncLogStatus::Running)
    }

    /// Mark the run as completed.
    pub fn complete(&mut self) -> SyncResult<()> {
        self.transition(SyncLogStatus::Completed)
    }

    /// Mark the run as failed, sampling the fatal error.
    pub fn fail(&mut self, error: impl Into<String>) -> SyncResult<()> {
        self.transition(SyncLogStatus::Failed)?;
        self.push_error_sample(error);
        Ok(())
    }

    /// Overwrite counters from a progress checkpoint.
    pub fn apply_progress(&mut self, progress: &SyncProgress) {
        self.records_processed = progress.total_processed;
        self.records_created = progress.created;
        self.records_updated = progress.updated;
        self.records_failed = progress.failed;
    }

    /// Append an error message, keeping the sample bounded.
    pub fn push_error_sample(&mut self, error: impl Into<String>) {
        if self.error_sample.len() < ERROR_SAMPLE_LIMIT {
            self.error_sample.push(error.into());
        }
    }
}
