//! Sync run orchestration.
//!
//! One orchestrator drives one kind of run at a time: create the sync log,
//! paginate the remote listing through the resilient call layer, feed the
//! collected entities through the batch processor with the right worker,
//! persist progress checkpoints, and finalize the log exactly once.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use payrec_billing::{BillingApi, BillingResult, CircuitBreaker, ListQuery, Page, RetryExecutor};

use crate::batch::{BatchConfig, BatchProcessor};
use crate::error::{SyncError, SyncResult};
use crate::log::SyncLog;
use crate::store::{LocalRecord, LocalStore, SyncLogStore};
use crate::types::{SyncType, WorkerOutcome};
use crate::workers::{CustomerWorker, PaymentWorker, SubscriptionWorker, WorkerConfig};

/// Configuration for one sync run.
#[derive(Debug, Clone)]
pub struct SyncRunConfig {
    /// Page size for remote listings.
    pub page_size: u64,
    /// Safety bound on the number of pages fetched per run.
    pub max_pages: u64,
    /// Batch processing configuration.
    pub batch: BatchConfig,
    /// Optional filters recorded on the sync log.
    pub filters: Option<serde_json::Value>,
}

impl Default for SyncRunConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 1000,
            batch: BatchConfig::default(),
            filters: None,
        }
    }
}

/// Drives sync runs against the billing provider.
pub struct SyncOrchestrator {
    api: Arc<dyn BillingApi>,
    store: Arc<dyn LocalStore>,
    logs: Arc<dyn SyncLogStore>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
    run_config: SyncRunConfig,
    worker_config: WorkerConfig,
}

impl SyncOrchestrator {
    /// Create an orchestrator with default retry and run configuration.
    ///
    /// The circuit breaker is injected so one instance can be shared across
    /// orchestrators and workers targeting the same dependency.
    #[must_use]
    pub fn new(
        api: Arc<dyn BillingApi>,
        store: Arc<dyn LocalStore>,
        logs: Arc<dyn SyncLogStore>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            api,
            store,
            logs,
            breaker,
            retry: RetryExecutor::with_defaults(),
            run_config: SyncRunConfig::default(),
            worker_config: WorkerConfig::default(),
        }
    }

    /// Replace the run configuration.
    #[must_use]
    pub fn with_run_config(mut self, config: SyncRunConfig) -> Self {
        self.run_config = config;
        self
    }

    /// Replace the worker configuration.
    #[must_use]
    pub fn with_worker_config(mut self, config: WorkerConfig) -> Self {
        self.worker_config = config;
        self
    }

    /// Replace the retry executor used for pagination and worker calls.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    /// Import all remote customers.
    #[instrument(skip(self))]
    pub async fn sync_customers(&self) -> SyncResult<SyncLog> {
        let mut log = self.open_log(SyncType::Customers).await?;

        let items = match self.collect_pages(|q| self.api.list_customers(q)).await {
            Ok(items) => items,
            Err(e) => return self.abort_run(log, e).await,
        };

        let worker = CustomerWorker::new(
            self.store.clone(),
            self.api.clone(),
            self.breaker.clone(),
            self.retry.clone(),
            self.worker_config.clone(),
        );
        self.finish_run(&mut log, items, move |customer| {
            let worker = worker.clone();
            async move { worker.reconcile(customer).await }
        })
        .await?;
        Ok(log)
    }

    /// Import all remote payments.
    #[instrument(skip(self))]
    pub async fn sync_payments(&self) -> SyncResult<SyncLog> {
        let mut log = self.open_log(SyncType::Payments).await?;

        let items = match self.collect_pages(|q| self.api.list_payments(q)).await {
            Ok(items) => items,
            Err(e) => return self.abort_run(log, e).await,
        };

        let worker = PaymentWorker::new(
            self.store.clone(),
            self.api.clone(),
            self.breaker.clone(),
            self.retry.clone(),
            self.worker_config.clone(),
        );
        self.finish_run(&mut log, items, move |payment| {
            let worker = worker.clone();
            async move { worker.reconcile(payment).await }
        })
        .await?;
        Ok(log)
    }

    /// Import all remote subscriptions.
    #[instrument(skip(self))]
    pub async fn sync_subscriptions(&self) -> SyncResult<SyncLog> {
        let mut log = self.open_log(SyncType::Subscriptions).await?;

        let items = match self.collect_pages(|q| self.api.list_subscriptions(q)).await {
            Ok(items) => items,
            Err(e) => return self.abort_run(log, e).await,
        };

        let worker = SubscriptionWorker::new(
            self.store.clone(),
            self.api.clone(),
            self.breaker.clone(),
            self.retry.clone(),
            self.worker_config.clone(),
        );
        self.finish_run(&mut log, items, move |subscription| {
            let worker = worker.clone();
            async move { worker.reconcile(subscription).await }
        })
        .await?;
        Ok(log)
    }

    /// Export caller-supplied local records without external ids to the
    /// billing provider, through the same batch machinery as imports.
    #[instrument(skip(self, records))]
    pub async fn push_customers(&self, records: Vec<LocalRecord>) -> SyncResult<SyncLog> {
        let mut log = self.open_log(SyncType::Customers).await?;

        let worker = CustomerWorker::new(
            self.store.clone(),
            self.api.clone(),
            self.breaker.clone(),
            self.retry.clone(),
            self.worker_config.clone(),
        );
        self.finish_run(&mut log, records, move |record| {
            let worker = worker.clone();
            async move { worker.export(record).await }
        })
        .await?;
        Ok(log)
    }

    /// Create and persist the sync log for a run. Failure here aborts the
    /// run before any item is touched.
    async fn open_log(&self, sync_type: SyncType) -> SyncResult<SyncLog> {
        let mut log = SyncLog::new(sync_type, self.run_config.filters.clone());
        log.begin()?;
        self.logs.create_log(&log).await?;
        info!(log_id = %log.id, sync_type = %sync_type, "sync run started");
        Ok(log)
    }

    /// Collect every page of a remote listing before processing begins.
    async fn collect_pages<T, F, Fut>(&self, fetch: F) -> SyncResult<Vec<T>>
    where
        F: Fn(ListQuery) -> Fut,
        Fut: Future<Output = BillingResult<Page<T>>>,
    {
        let mut query = ListQuery::first(self.run_config.page_size.max(1));
        let mut all = Vec::new();
        let mut pages = 0u64;

        loop {
            let page = self
                .retry
                .execute_with_breaker(&self.breaker, || fetch(query))
                .await?;
            pages += 1;
            let fetched = page.items.len();
            all.extend(page.items);

            if !page.has_more {
                break;
            }
            if pages >= self.run_config.max_pages {
                warn!(
                    pages,
                    collected = all.len(),
                    "page safety limit reached, truncating listing"
                );
                break;
            }
            if fetched == 0 {
                warn!(pages, "remote reported more data but returned an empty page");
                break;
            }
            query = query.next();
        }

        info!(pages, collected = all.len(), "remote listing collected");
        Ok(all)
    }

    /// Run the batch processor and finalize the log.
    async fn finish_run<T, R, W, Fut>(
        &self,
        log: &mut SyncLog,
        items: Vec<T>,
        worker: W,
    ) -> SyncResult<()>
    where
        T: Clone,
        W: Fn(T) -> Fut,
        Fut: Future<Output = SyncResult<WorkerOutcome<R>>>,
    {
        let processor = BatchProcessor::new(self.run_config.batch.clone());
        let logs = self.logs.clone();
        let log_id = log.id;

        let result = processor
            .process_with_progress(items, worker, move |progress| {
                let logs = logs.clone();
                async move {
                    logs.update_progress(log_id, &progress)
                        .await
                        .map_err(SyncError::from)
                }
            })
            .await;

        match result {
            Ok(result) => {
                log.apply_progress(&result.progress());
                for failure in &result.failed {
                    log.push_error_sample(failure.error.clone());
                }
                log.complete()?;
                self.logs.update_log(log).await?;
                info!(
                    log_id = %log.id,
                    processed = log.records_processed,
                    created = log.records_created,
                    updated = log.records_updated,
                    failed = log.records_failed,
                    "sync run completed"
                );
                Ok(())
            }
            Err(e) => {
                self.mark_failed(log, &e).await;
                Err(e)
            }
        }
    }

    /// Abort a run on an orchestration-level error, marking the log failed.
    async fn abort_run(&self, mut log: SyncLog, error: SyncError) -> SyncResult<SyncLog> {
        self.mark_failed(&mut log, &error).await;
        Err(error)
    }

    /// Best-effort failure finalization; the original error always wins.
    async fn mark_failed(&self, log: &mut SyncLog, error: &SyncError) {
        warn!(log_id = %log.id, error = %error, "sync run failed");
        if log.fail(error.to_string()).is_ok() {
            if let Err(persist) = self.logs.update_log(log).await {
                warn!(log_id = %log.id, error = %persist, "failed to persist failed sync log");
            }
        }
    }
}
