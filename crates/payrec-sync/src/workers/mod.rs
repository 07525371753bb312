//! Per-entity reconciliation workers.
//!
//! Each worker performs validate -> resolve identity -> create-or-update ->
//! classify. Validation failures and remote duplicates come back as skips;
//! a blown wall-clock budget comes back as a failure. Idempotency is
//! produced entirely by the identity resolution order (external id first,
//! then natural key, then create).

mod customer;
mod payment;
mod subscription;

pub use customer::CustomerWorker;
pub use payment::PaymentWorker;
pub use subscription::SubscriptionWorker;

use std::time::Duration;

/// Configuration shared by all workers.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Independent wall-clock budget for each worker call.
    pub call_budget: Duration,
    /// When set, workers classify and log but perform no local writes.
    pub dry_run: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            call_budget: Duration::from_secs(10),
            dry_run: false,
        }
    }
}
