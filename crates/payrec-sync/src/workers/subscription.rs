//! Subscription reconciliation.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use payrec_billing::{BillingApi, CircuitBreaker, RemoteSubscription, RetryExecutor};

use crate::error::{SyncError, SyncResult};
use crate::store::{EntityKind, LocalStore, RecordDraft};
use crate::types::WorkerOutcome;
use crate::validate::ValidationIssue;
use crate::workers::customer::{entity_snapshot, upsert_remote_customer, validate_customer};
use crate::workers::WorkerConfig;

/// Worker reconciling remote subscriptions into local records.
///
/// Mirrors the payment worker: the owning customer is materialized locally
/// first when unknown, then the subscription is upserted by external id.
#[derive(Clone)]
pub struct SubscriptionWorker {
    store: Arc<dyn LocalStore>,
    api: Arc<dyn BillingApi>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
    config: WorkerConfig,
}

impl SubscriptionWorker {
    /// Create a new subscription worker.
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

    /// Reconcile one remote subscription into local storage.
    pub async fn reconcile(
        &self,
        subscription: RemoteSubscription,
    ) -> SyncResult<WorkerOutcome<Uuid>> {
        match tokio::time::timeout(
            self.config.call_budget,
            self.reconcile_inner(&subscription),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Ok(WorkerOutcome::failed(
                SyncError::worker_timeout(self.config.call_budget).to_string(),
            )),
        }
    }

    async fn reconcile_inner(
        &self,
        subscription: &RemoteSubscription,
    ) -> SyncResult<WorkerOutcome<Uuid>> {
        if let Err(issue) = validate_subscription(subscription) {
            return Ok(WorkerOutcome::skipped(issue.to_string()));
        }

        let known = self
            .store
            .lookup_by_external_id(EntityKind::Customer, &subscription.customer)
            .await?
            .is_some();
        if !known {
            debug!(customer = %subscription.customer, "counterparty unknown locally, fetching");
            let remote = self
                .retry
                .execute_with_breaker(&self.breaker, || {
                    self.api.get_customer(&subscription.customer)
                })
                .await?;
            if let Err(issue) = validate_customer(&remote) {
                return Ok(WorkerOutcome::skipped(format!(
                    "counterparty {} rejected: {issue}",
                    subscription.customer
                )));
            }
            upsert_remote_customer(self.store.as_ref(), &remote, self.config.dry_run).await?;
        }

        let fields = entity_snapshot(subscription)?;

        if let Some(existing) = self
            .store
            .lookup_by_external_id(EntityKind::Subscription, &subscription.id)
            .await?
        {
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
                entity: EntityKind::Subscription,
                external_id: Some(subscription.id.clone()),
                email: None,
                tax_id: None,
                fields,
            })
            .await?;
        Ok(WorkerOutcome::created(id))
    }
}

fn validate_subscription(subscription: &RemoteSubscription) -> Result<(), ValidationIssue> {
    if subscription.customer.is_empty() {
        return Err(ValidationIssue {
            field: "customer",
            reason: "subscription carries no counterparty reference".to_string(),
        });
    }
    if !subscription.value.is_finite() || subscription.value < 0.0 {
        return Err(ValidationIssue {
            field: "value",
            reason: format!("amount {} is not a valid charge", subscription.value),
        });
    }
    if subscription.cycle.is_empty() {
        return Err(ValidationIssue {
            field: "cycle",
            reason: "subscription carries no billing cycle".to_string(),
        });
    }
    Ok(())
}
