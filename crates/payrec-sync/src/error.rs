//! Sync engine error types.

use thiserror::Error;

use payrec_billing::BillingError;

use crate::store::StoreError;

/// Errors that can occur during a synchronization run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Billing API error.
    #[error("billing API error: {0}")]
    Billing(#[from] BillingError),

    /// Local persistence error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid sync log state transition.
    #[error("invalid sync log transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// A worker call exceeded its wall-clock budget.
    #[error("worker call exceeded its {budget_ms} ms budget")]
    WorkerTimeout { budget_ms: u64 },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Create an invalid transition error.
    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create a worker timeout error.
    #[must_use]
    pub fn worker_timeout(budget: std::time::Duration) -> Self {
        Self::WorkerTimeout {
            budget_ms: budget.as_millis() as u64,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is worth retrying at the item level.
    ///
    /// Store errors are treated as transient (the local database may be
    /// briefly unavailable); billing errors defer to their own
    /// classification. A blown worker budget is terminal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Billing(e) => e.is_retryable(),
            SyncError::Store(_) => true,
            SyncError::InvalidTransition { .. }
            | SyncError::WorkerTimeout { .. }
            | SyncError::Internal { .. } => false,
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_retryability() {
        assert!(SyncError::from(BillingError::network("down")).is_retryable());
        assert!(SyncError::from(StoreError::new("pool exhausted")).is_retryable());
        assert!(!SyncError::from(BillingError::api(409, vec![])).is_retryable());
        assert!(!SyncError::worker_timeout(Duration::from_secs(10)).is_retryable());
        assert!(!SyncError::internal("bug").is_retryable());
    }

    #[test]
    fn test_display() {
        let err = SyncError::worker_timeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "worker call exceeded its 10000 ms budget");

        let err = SyncError::invalid_transition("completed", "running");
        assert!(err.to_string().contains("completed"));
        assert!(err.to_string().contains("running"));
    }
}
