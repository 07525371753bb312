//! Core result and progress types shared across the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Entity families a sync run can cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Customers,
    Payments,
    Subscriptions,
    Financial,
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customers => write!(f, "customers"),
            Self::Payments => write!(f, "payments"),
            Self::Subscriptions => write!(f, "subscriptions"),
            Self::Financial => write!(f, "financial"),
        }
    }
}

/// Terminal classification of one processed item.
///
/// Exactly one variant applies to every item; there are no overlapping
/// success/skip/fail flags.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome<R> {
    /// The item was reconciled.
    Success {
        data: R,
        /// A new local record was created.
        created: bool,
        /// An existing local record was updated.
        updated: bool,
    },
    /// The item was deliberately not processed (data-quality issue,
    /// duplicate conflict). Never retried.
    Skipped { reason: String },
    /// The item could not be processed after exhausting retries.
    Failed { error: String },
}

impl<R> WorkerOutcome<R> {
    /// A success that created a new local record.
    pub fn created(data: R) -> Self {
        Self::Success {
            data,
            created: true,
            updated: false,
        }
    }

    /// A success that updated an existing local record.
    pub fn updated(data: R) -> Self {
        Self::Success {
            data,
            created: false,
            updated: true,
        }
    }

    /// A skip with the given reason.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// A failure with the given error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    /// Whether this outcome is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Whether this outcome is a skip.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Whether this outcome is a failure.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// An item that failed with its final error.
#[derive(Debug, Clone)]
pub struct FailedItem<T> {
    pub item: T,
    pub error: String,
}

/// An item that was skipped with its reason.
#[derive(Debug, Clone)]
pub struct SkippedItem<T> {
    pub item: T,
    pub reason: String,
}

/// Cumulative counters emitted at progress checkpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub total_processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub skipped: u64,
    pub created: u64,
    pub updated: u64,
}

/// Outcome of a full batch-processing run.
#[derive(Debug)]
pub struct BatchResult<T, R> {
    pub successful: Vec<R>,
    pub failed: Vec<FailedItem<T>>,
    pub skipped: Vec<SkippedItem<T>>,
    pub total_processed: usize,
    pub duration: Duration,
    pub created: u64,
    pub updated: u64,
}

impl<T, R> BatchResult<T, R> {
    /// An empty result.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            successful: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            total_processed: 0,
            duration: Duration::ZERO,
            created: 0,
            updated: 0,
        }
    }

    /// Fraction of processed items that succeeded, in `[0, 1]`.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 1.0;
        }
        self.successful.len() as f64 / self.total_processed as f64
    }

    /// Snapshot of the counters as a progress record.
    #[must_use]
    pub fn progress(&self) -> SyncProgress {
        SyncProgress {
            total_processed: self.total_processed as u64,
            successful: self.successful.len() as u64,
            failed: self.failed.len() as u64,
            skipped: self.skipped.len() as u64,
            created: self.created,
            updated: self.updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_type_display() {
        assert_eq!(SyncType::Customers.to_string(), "customers");
        assert_eq!(SyncType::Financial.to_string(), "financial");
    }

    #[test]
    fn test_outcome_classification_is_exclusive() {
        let success: WorkerOutcome<u32> = WorkerOutcome::created(1);
        assert!(success.is_success());
        assert!(!success.is_skipped());
        assert!(!success.is_failed());

        let skipped: WorkerOutcome<u32> = WorkerOutcome::skipped("bad email");
        assert!(skipped.is_skipped());
        assert!(!skipped.is_success());

        let failed: WorkerOutcome<u32> = WorkerOutcome::failed("boom");
        assert!(failed.is_failed());
        assert!(!failed.is_success());
    }

    #[test]
    fn test_outcome_flags() {
        match WorkerOutcome::created(9) {
            WorkerOutcome::Success { created, updated, .. } => {
                assert!(created);
                assert!(!updated);
            }
            _ => panic!("expected success"),
        }

        match WorkerOutcome::updated(9) {
            WorkerOutcome::Success { created, updated, .. } => {
                assert!(!created);
                assert!(updated);
            }
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn test_success_rate() {
        let result: BatchResult<u32, u32> = BatchResult {
            successful: vec![1, 2, 3],
            failed: vec![FailedItem {
                item: 4,
                error: "x".to_string(),
            }],
            skipped: Vec::new(),
            total_processed: 4,
            duration: Duration::ZERO,
            created: 3,
            updated: 0,
        };
        assert!((result.success_rate() - 0.75).abs() < f64::EPSILON);

        let empty: BatchResult<u32, u32> = BatchResult::empty();
        assert!((empty.success_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_snapshot_partition() {
        let result: BatchResult<u32, u32> = BatchResult {
            successful: vec![1, 2],
            failed: vec![FailedItem {
                item: 3,
                error: "x".to_string(),
            }],
            skipped: vec![SkippedItem {
                item: 4,
                reason: "y".to_string(),
            }],
            total_processed: 4,
            duration: Duration::from_secs(1),
            created: 1,
            updated: 1,
        };

        let progress = result.progress();
        assert_eq!(
            progress.successful + progress.failed + progress.skipped,
            progress.total_processed
        );
    }
}
