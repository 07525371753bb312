//! Customer reconciliation.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use payrec_billing::{
    BillingApi, CircuitBreaker, CustomerDraft, RemoteCustomer, RetryExecutor,
};

use crate::error::{SyncError, SyncResult};
use crate::store::{Conflict, EntityKind, LocalRecord, LocalStore, RecordDraft};
use crate::types::WorkerOutcome;
use crate::validate::{validate_email, validate_phone, validate_tax_id, ValidationIssue};
use crate::workers::WorkerConfig;

/// Worker reconciling remote customers into local records, and exporting
/// unlinked local records to the billing provider.
#[derive(Clone)]
pub struct CustomerWorker {
    store: Arc<dyn LocalStore>,
    api: Arc<dyn BillingApi>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
    config: WorkerConfig,
}

impl CustomerWorker {
    /// Create a new customer worker.
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

    /// Reconcile one remote customer into local storage.
    ///
    /// Returns the local record id. Runs under the worker's wall-clock
    /// budget; exceeding it classifies the item as failed without blocking
    /// chunk siblings.
    pub async fn reconcile(&self, customer: RemoteCustomer) -> SyncResult<WorkerOutcome<Uuid>> {
        match tokio::time::timeout(self.config.call_budget, self.reconcile_inner(&customer)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Ok(WorkerOutcome::failed(
                SyncError::worker_timeout(self.config.call_budget).to_string(),
            )),
        }
    }

    async fn reconcile_inner(&self, customer: &RemoteCustomer) -> SyncResult<WorkerOutcome<Uuid>> {
        if let Err(issue) = validate_customer(customer) {
            return Ok(WorkerOutcome::skipped(issue.to_string()));
        }

        let (id, created) =
            upsert_remote_customer(self.store.as_ref(), customer, self.config.dry_run).await?;

        Ok(if created {
            WorkerOutcome::created(id)
        } else {
            WorkerOutcome::updated(id)
        })
    }

    /// Export a local record without an external id to the billing provider.
    ///
    /// On success the returned external id is linked to the record. When the
    /// provider reports duplication, a conflict is persisted for manual
    /// resolution and the item is skipped.
    pub async fn export(&self, record: LocalRecord) -> SyncResult<WorkerOutcome<String>> {
        match tokio::time::timeout(self.config.call_budget, self.export_inner(&record)).await {
            Ok(outcome) => outcome,
            Err(_) => Ok(WorkerOutcome::failed(
                SyncError::worker_timeout(self.config.call_budget).to_string(),
            )),
        }
    }

    async fn export_inner(&self, record: &LocalRecord) -> SyncResult<WorkerOutcome<String>> {
        if let Some(external_id) = &record.external_id {
            return Ok(WorkerOutcome::skipped(format!(
                "already linked to {external_id}"
            )));
        }

        let draft = match draft_from_record(record) {
            Ok(draft) => draft,
            Err(issue) => return Ok(WorkerOutcome::skipped(issue.to_string())),
        };

        let created = self
            .retry
            .execute_with_breaker(&self.breaker, || self.api.create_customer(&draft))
            .await;

        match created {
            Ok(remote) => {
                if self.config.dry_run {
                    info!(record_id = %record.id, external_id = %remote.id, "dry-run: would link exported customer");
                } else {
                    self.store.link_external_id(record.id, &remote.id).await?;
                }
                Ok(WorkerOutcome::created(remote.id))
            }
            Err(e) if e.is_duplicate() => {
                let conflict = Conflict::new(
                    EntityKind::Customer,
                    record_snapshot(record)?,
                    serde_json::json!({
                        "draft": draft,
                        "error": e.to_string(),
                    }),
                );
                info!(
                    record_id = %record.id,
                    conflict_id = %conflict.id,
                    "billing API reported duplicate, recording conflict"
                );
                if !self.config.dry_run {
                    self.store.record_conflict(conflict).await?;
                }
                Ok(WorkerOutcome::skipped(format!(
                    "duplicate reported by billing API: {e}"
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Format checks on a remote customer. Only present fields are checked; a
/// customer identified solely by external id is acceptable.
pub(crate) fn validate_customer(customer: &RemoteCustomer) -> Result<(), ValidationIssue> {
    if let Some(email) = &customer.email {
        validate_email(email)?;
    }
    if let Some(tax_id) = &customer.tax_id {
        validate_tax_id(tax_id)?;
    }
    if let Some(phone) = &customer.phone {
        validate_phone(phone)?;
    }
    Ok(())
}

/// Create-or-update a local record for a remote customer.
///
/// Resolution order: stored external id, then natural key (email or tax id,
/// linking the external id on a hit), then create. Returns the local id and
/// whether a record was created.
pub(crate) async fn upsert_remote_customer(
    store: &dyn LocalStore,
    customer: &RemoteCustomer,
    dry_run: bool,
) -> SyncResult<(Uuid, bool)> {
    let fields = entity_snapshot(customer)?;

    if let Some(existing) = store
        .lookup_by_external_id(EntityKind::Customer, &customer.id)
        .await?
    {
        debug!(record_id = %existing.id, external_id = %customer.id, "customer matched by external id");
        if !dry_run {
            store.update(existing.id, fields).await?;
        }
        return Ok((existing.id, false));
    }

    if let Some(existing) = store
        .lookup_by_natural_key(
            EntityKind::Customer,
            customer.email.as_deref(),
            customer.tax_id.as_deref(),
        )
        .await?
    {
        debug!(record_id = %existing.id, external_id = %customer.id, "customer matched by natural key, linking");
        if !dry_run {
            store.link_external_id(existing.id, &customer.id).await?;
            store.update(existing.id, fields).await?;
        }
        return Ok((existing.id, false));
    }

    if dry_run {
        info!(external_id = %customer.id, "dry-run: would create local customer");
        return Ok((Uuid::nil(), true));
    }

    let id = store
        .create(RecordDraft {
            entity: EntityKind::Customer,
            external_id: Some(customer.id.clone()),
            email: customer.email.clone(),
            tax_id: customer.tax_id.clone(),
            fields,
        })
        .await?;
    debug!(record_id = %id, external_id = %customer.id, "created local customer");
    Ok((id, true))
}

/// Serialize an entity for the record payload.
pub(crate) fn entity_snapshot<T: serde::Serialize>(entity: &T) -> SyncResult<serde_json::Value> {
    serde_json::to_value(entity)
        .map_err(|e| SyncError::internal(format!("entity serialization failed: {e}")))
}

fn record_snapshot(record: &LocalRecord) -> SyncResult<serde_json::Value> {
    serde_json::to_value(record)
        .map_err(|e| SyncError::internal(format!("record serialization failed: {e}")))
}

/// Build a create payload from a local record's fields.
fn draft_from_record(record: &LocalRecord) -> Result<CustomerDraft, ValidationIssue> {
    let name = record
        .fields
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    if name.is_empty() {
        return Err(ValidationIssue {
            field: "name",
            reason: "local record has no name to export".to_string(),
        });
    }

    if let Some(email) = &record.email {
        validate_email(email)?;
    }
    if let Some(tax_id) = &record.tax_id {
        validate_tax_id(tax_id)?;
    }

    Ok(CustomerDraft {
        name,
        email: record.email.clone(),
        tax_id: record.tax_id.clone(),
        phone: record
            .fields
            .get("phone")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        external_reference: Some(record.id.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use async_trait::async_trait;
    use payrec_billing::{
        BillingError, BillingResult, CircuitBreakerConfig, ListQuery, Page, RemotePayment,
        RemoteSubscription, RetryConfig,
    };
    use std::time::Duration;

    /// Minimal API stub: customer export answers are scripted, everything
    /// else is unreachable in these tests.
    struct StubApi {
        create_response: fn() -> BillingResult<RemoteCustomer>,
    }

    #[async_trait]
    impl BillingApi for StubApi {
        async fn list_customers(&self, _q: ListQuery) -> BillingResult<Page<RemoteCustomer>> {
            Ok(Page::empty())
        }
        async fn list_payments(&self, _q: ListQuery) -> BillingResult<Page<RemotePayment>> {
            Ok(Page::empty())
        }
        async fn list_subscriptions(
            &self,
            _q: ListQuery,
        ) -> BillingResult<Page<RemoteSubscription>> {
            Ok(Page::empty())
        }
        async fn get_customer(&self, external_id: &str) -> BillingResult<RemoteCustomer> {
            Err(BillingError::invalid_response(format!(
                "unexpected get_customer({external_id})"
            )))
        }
        async fn create_customer(&self, _draft: &CustomerDraft) -> BillingResult<RemoteCustomer> {
            (self.create_response)()
        }
    }

    fn worker_with(api: StubApi, store: Arc<InMemoryStore>) -> CustomerWorker {
        CustomerWorker::new(
            store,
            Arc::new(api),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
            RetryExecutor::new(RetryConfig {
                max_retries: 0,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                factor: 2.0,
                attempt_timeout: Duration::from_secs(1),
                jitter: false,
            }),
            WorkerConfig::default(),
        )
    }

    fn remote(id: &str, email: Option<&str>) -> RemoteCustomer {
        RemoteCustomer {
            id: id.to_string(),
            name: "Ada Lovelace".to_string(),
            email: email.map(str::to_string),
            tax_id: None,
            phone: None,
            external_reference: None,
        }
    }

    fn ok_create() -> BillingResult<RemoteCustomer> {
        Ok(remote("cus_new", Some("new@example.com")))
    }

    fn duplicate_create() -> BillingResult<RemoteCustomer> {
        Err(BillingError::api(
            409,
            vec![payrec_billing::ApiErrorDetail::new(
                "invalid_action",
                "customer already exists",
            )],
        ))
    }

    #[tokio::test]
    async fn test_reconcile_creates_then_updates() {
        let store = Arc::new(InMemoryStore::new());
        let worker = worker_with(StubApi { create_response: ok_create }, store.clone());

        let first = worker
            .reconcile(remote("cus_1", Some("ada@example.com")))
            .await
            .unwrap();
        match first {
            WorkerOutcome::Success { created, updated, .. } => {
                assert!(created);
                assert!(!updated);
            }
            other => panic!("expected success, got {other:?}"),
        }

        // Same external id again: update, never a second record.
        let second = worker
            .reconcile(remote("cus_1", Some("ada@example.com")))
            .await
            .unwrap();
        match second {
            WorkerOutcome::Success { created, updated, .. } => {
                assert!(!created);
                assert!(updated);
            }
            other => panic!("expected success, got {other:?}"),
        }

        assert_eq!(store.count(EntityKind::Customer).await, 1);
    }

    #[tokio::test]
    async fn test_reconcile_links_by_natural_key() {
        let store = Arc::new(InMemoryStore::new());
        let worker = worker_with(StubApi { create_response: ok_create }, store.clone());

        // Existing local record linked to another external id.
        worker
            .reconcile(remote("cus_a", Some("shared@example.com")))
            .await
            .unwrap();

        // Different external id, same email: links, does not duplicate.
        let outcome = worker
            .reconcile(remote("cus_b", Some("shared@example.com")))
            .await
            .unwrap();
        match outcome {
            WorkerOutcome::Success { created, updated, .. } => {
                assert!(!created);
                assert!(updated);
            }
            other => panic!("expected success, got {other:?}"),
        }

        assert_eq!(store.count(EntityKind::Customer).await, 1);
        let record = store
            .lookup_by_external_id(EntityKind::Customer, "cus_b")
            .await
            .unwrap();
        assert!(record.is_some(), "external id was re-linked");
    }

    #[tokio::test]
    async fn test_reconcile_skips_invalid_email() {
        let store = Arc::new(InMemoryStore::new());
        let worker = worker_with(StubApi { create_response: ok_create }, store.clone());

        let outcome = worker
            .reconcile(remote("cus_1", Some("not-an-email")))
            .await
            .unwrap();

        match outcome {
            WorkerOutcome::Skipped { reason } => assert!(reason.contains("email")),
            other => panic!("expected skip, got {other:?}"),
        }
        assert_eq!(store.count(EntityKind::Customer).await, 0);
    }

    #[tokio::test]
    async fn test_export_links_created_external_id() {
        let store = Arc::new(InMemoryStore::new());
        let worker = worker_with(StubApi { create_response: ok_create }, store.clone());

        let id = store
            .create(RecordDraft {
                entity: EntityKind::Customer,
                external_id: None,
                email: Some("new@example.com".to_string()),
                tax_id: None,
                fields: serde_json::json!({"name": "New Customer"}),
            })
            .await
            .unwrap();
        let record = store.records().await.into_iter().find(|r| r.id == id).unwrap();

        let outcome = worker.export(record).await.unwrap();
        match outcome {
            WorkerOutcome::Success { data, created, .. } => {
                assert_eq!(data, "cus_new");
                assert!(created);
            }
            other => panic!("expected success, got {other:?}"),
        }

        let linked = store
            .lookup_by_external_id(EntityKind::Customer, "cus_new")
            .await
            .unwrap();
        assert_eq!(linked.map(|r| r.id), Some(id));
    }

    #[tokio::test]
    async fn test_export_duplicate_records_conflict_and_skips() {
        let store = Arc::new(InMemoryStore::new());
        let worker = worker_with(
            StubApi {
                create_response: duplicate_create,
            },
            store.clone(),
        );

        let id = store
            .create(RecordDraft {
                entity: EntityKind::Customer,
                external_id: None,
                email: Some("dup@example.com".to_string()),
                tax_id: None,
                fields: serde_json::json!({"name": "Dup Customer"}),
            })
            .await
            .unwrap();
        let record = store.records().await.into_iter().find(|r| r.id == id).unwrap();

        let outcome = worker.export(record).await.unwrap();
        match outcome {
            WorkerOutcome::Skipped { reason } => assert!(reason.contains("duplicate")),
            other => panic!("expected skip, got {other:?}"),
        }

        let conflicts = store.conflicts().await;
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].entity, EntityKind::Customer);
        assert_eq!(conflicts[0].local["id"], serde_json::json!(id));
    }

    #[tokio::test]
    async fn test_export_skips_already_linked() {
        let store = Arc::new(InMemoryStore::new());
        let worker = worker_with(StubApi { create_response: ok_create }, store.clone());

        worker
            .reconcile(remote("cus_linked", Some("l@example.com")))
            .await
            .unwrap();
        let record = store.records().await.into_iter().next().unwrap();

        let outcome = worker.export(record).await.unwrap();
        match outcome {
            WorkerOutcome::Skipped { reason } => assert!(reason.contains("already linked")),
            other => panic!("expected skip, got {other:?}"),
        }
        assert!(store.conflicts().await.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_performs_no_writes() {
        let store = Arc::new(InMemoryStore::new());
        let mut worker = worker_with(StubApi { create_response: ok_create }, store.clone());
        worker.config.dry_run = true;

        let outcome = worker
            .reconcile(remote("cus_1", Some("ada@example.com")))
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(store.count(EntityKind::Customer).await, 0);
    }
}
