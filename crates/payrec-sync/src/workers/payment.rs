//! Payment reconciliation.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use payrec_billing::{BillingApi, CircuitBreaker, RemotePayment, RetryExecutor};

use crate::error::{SyncError, SyncResult};
use crate::store::{EntityKind, LocalStore, RecordDraft};
use crate::types::WorkerOutcome;
use crate::validate::ValidationIssue;
use crate::workers::customer::{entity_snapshot, upsert_remote_customer, validate_customer};
use crate::workers::WorkerConfig;

/// Worker reconciling remote payments into local records.
///
/// A payment references its owning customer by external id. When the local
/// side does not know that customer yet, the worker fetches it through the
/// resilient call layer and materializes it locally before upserting the
/// payment.
#[derive(Clone)]
pub struct PaymentWorker {
    store: Arc<dyn LocalStore>,
    api: Arc<dyn BillingApi>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
    config: WorkerConfig,
}

impl PaymentWorker {
    /// Create a new payment worker.
    #[must_use]
    pub fn new(
        store: Arc<dyn LocalStore>,
        api: Arc<dyn BillingApi>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryExecutor,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            api,
            breaker,
            retry,
            config,
        }
    }

    /// Reconcile one remote payment into local storage.
    pub async fn reconcile(&self, payment: RemotePayment) -> SyncResult<WorkerOutcome<Uuid>> {
        match tokio::time::timeout(self.config.call_budget, self.reconcile_inner(&payment)).await {
            Ok(outcome) => outcome,
            Err(_) => Ok(WorkerOutcome::failed(
                SyncError::worker_timeout(self.config.call_budget).to_string(),
            )),
        }
    }

    async fn reconcile_inner(&self, payment: &RemotePayment) -> SyncResult<WorkerOutcome<Uuid>> {
        if let Err(issue) = validate_payment(payment) {
            return Ok(WorkerOutcome::skipped(issue.to_string()));
        }

        if let Some(outcome) = self.ensure_counterparty(&payment.customer).await? {
            return Ok(outcome);
        }

        let fields = entity_snapshot(payment)?;

        if let Some(existing) = self
            .store
            .lookup_by_external_id(EntityKind::Payment, &payment.id)
            .await?
        {
            debug!(record_id = %existing.id, external_id = %payment.id, "payment matched by external id");
            if !self.config.dry_run {
                self.store.update(existing.id, fields).await?;
            }
            return Ok(WorkerOutcome::updated(existing.id));
        }

        if self.config.dry_run {
            return Ok(WorkerOutcome::created(Uuid::nil()));
        }

        let id = self
            .store
            .create(RecordDraft {
                entity: EntityKind::Payment,
                external_id: Some(payment.id.clone()),
                email: None,
                tax_id: None,
                fields,
            })
            .await?;
        Ok(WorkerOutcome::created(id))
    }

    /// Make sure the owning customer exists locally.
    ///
    /// Returns `Some(outcome)` when the payment must be classified without
    /// being upserted (counterparty failed validation).
    async fn ensure_counterparty(
        &self,
        customer_external_id: &str,
    ) -> SyncResult<Option<WorkerOutcome<Uuid>>> {
        let known = self
            .store
            .lookup_by_external_id(EntityKind::Customer, customer_external_id)
            .await?
            .is_some();
        if known {
            return Ok(None);
        }

        debug!(customer = %customer_external_id, "counterparty unknown locally, fetching");
        let remote = self
            .retry
            .execute_with_breaker(&self.breaker, || {
                self.api.get_customer(customer_external_id)
            })
            .await?;

        if let Err(issue) = validate_customer(&remote) {
            return Ok(Some(WorkerOutcome::skipped(format!(
                "counterparty {customer_external_id} rejected: {issue}"
            ))));
        }

        upsert_remote_customer(self.store.as_ref(), &remote, self.config.dry_run).await?;
        Ok(None)
    }
}

fn validate_payment(payment: &RemotePayment) -> Result<(), ValidationIssue> {
    if payment.customer.is_empty() {
        return Err(ValidationIssue {
            field: "customer",
            reason: "payment carries no counterparty reference".to_string(),
        });
    }
    if !payment.value.is_finite() || payment.value < 0.0 {
        return Err(ValidationIssue {
            field: "value",
            reason: format!("amount {} is not a valid charge", payment.value),
        });
    }
    if payment.status.is_empty() {
        return Err(ValidationIssue {
            field: "status",
            reason: "payment carries no status".to_string(),
        });
    }
    Ok(())
}
