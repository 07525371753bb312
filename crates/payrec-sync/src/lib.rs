//! # Reconciliation Engine
//!
//! Resilient batch synchronization between an external billing provider and
//! locally stored business records.
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────┐     ┌──────────────────────┐
//! │ SyncOrchestrator │────►│ BatchProcessor  │────►│ ReconciliationWorker │
//! │ (paginate, log)  │     │ (chunks, retry) │     │ (validate, resolve,  │
//! └────────┬─────────┘     └─────────────────┘     │  create-or-update)   │
//!          │                                       └──────────┬───────────┘
//!          ▼                                                  │
//!   ┌─────────────┐        ┌──────────────────┐               ▼
//!   │ SyncLogStore│        │ CircuitBreaker + │◄───────  remote calls
//!   └─────────────┘        │ RetryExecutor    │
//!                          └──────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Every item ends in exactly one of successful/failed/skipped, and the
//!   three always partition the processed count.
//! - Reconciliation is idempotent: an external id links to one local record,
//!   re-runs update instead of duplicating.
//! - One item's failure never aborts the run or its chunk siblings; a run
//!   always terminates with a finalized [`SyncLog`].
//!
//! Local persistence is injected through the [`LocalStore`] and
//! [`SyncLogStore`] capability traits; [`memory`] ships in-process
//! implementations for tests and embedding.

pub mod batch;
pub mod error;
pub mod log;
pub mod memory;
pub mod orchestrator;
pub mod store;
pub mod types;
pub mod validate;
pub mod workers;

pub use batch::{BatchConfig, BatchProcessor};
pub use error::{SyncError, SyncResult};
pub use log::{SyncLog, SyncLogStatus, ERROR_SAMPLE_LIMIT};
pub use memory::{InMemoryStore, InMemorySyncLogStore};
pub use orchestrator::{SyncOrchestrator, SyncRunConfig};
pub use store::{
    Conflict, EntityKind, LocalRecord, LocalStore, RecordDraft, StoreError, StoreResult,
    SyncLogStore,
};
pub use types::{BatchResult, FailedItem, SkippedItem, SyncProgress, SyncType, WorkerOutcome};
pub use workers::{CustomerWorker, PaymentWorker, SubscriptionWorker, WorkerConfig};
