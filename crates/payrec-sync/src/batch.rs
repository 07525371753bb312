//! Generic batch processing engine.
//!
//! Drives a collection of items through a caller-supplied worker with
//! bounded concurrency, per-item retry, adaptive batch sizing, and
//! checkpointed progress reporting. Batches run strictly sequentially;
//! within one chunk items run concurrently with no completion-order
//! guarantee. One item's failure never aborts the run or its siblings.

use std::future::Future;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::types::{BatchResult, FailedItem, SkippedItem, SyncProgress, WorkerOutcome};

/// Base delay for the per-item retry backoff.
pub const ITEM_RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Cap on the per-item retry backoff.
pub const ITEM_RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Floor the adaptive sizing never shrinks below.
pub const MIN_BATCH_SIZE: usize = 3;

/// Configuration for batch processing.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Initial batch size (mutable over the run when `adaptive` is set).
    pub batch_size: usize,
    /// Maximum simultaneous worker calls within a batch.
    pub concurrency: usize,
    /// Cooldown between batches (never applied after the last).
    pub delay_between_batches: Duration,
    /// Per-item retry budget for worker errors. Independent of the
    /// transport-level retry in `payrec_billing`.
    pub max_retries: u32,
    /// Emit progress whenever cumulative processed count crosses a multiple
    /// of this value.
    pub checkpoint_interval: usize,
    /// Enable per-batch adaptive sizing.
    pub adaptive: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            concurrency: 5,
            delay_between_batches: Duration::from_millis(500),
            max_retries: 2,
            checkpoint_interval: 25,
            adaptive: true,
        }
    }
}

/// Batch processing engine.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    config: BatchConfig,
}

impl BatchProcessor {
    /// Create a processor with the given configuration.
    #[must_use]
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    /// Create a processor with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BatchConfig::default())
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Process all items without progress reporting.
    pub async fn process<T, R, W, Fut>(
        &self,
        items: Vec<T>,
        worker: W,
    ) -> SyncResult<BatchResult<T, R>>
    where
        T: Clone,
        W: Fn(T) -> Fut,
        Fut: Future<Output = SyncResult<WorkerOutcome<R>>>,
    {
        self.process_with_progress(items, worker, |_| async {
            Ok::<_, crate::error::SyncError>(())
        })
        .await
    }

    /// Process all items, reporting progress at checkpoint crossings and
    /// once more after the final batch.
    ///
    /// Worker errors are retried up to `max_retries` times per item (only
    /// retryable errors; validation-style outcomes come back as `Skipped`
    /// and are final). An error returned by `on_progress` is not isolated
    /// and aborts the run.
    pub async fn process_with_progress<T, R, W, Fut, P, PFut>(
        &self,
        items: Vec<T>,
        worker: W,
        mut on_progress: P,
    ) -> SyncResult<BatchResult<T, R>>
    where
        T: Clone,
        W: Fn(T) -> Fut,
        Fut: Future<Output = SyncResult<WorkerOutcome<R>>>,
        P: FnMut(SyncProgress) -> PFut,
        PFut: Future<Output = SyncResult<()>>,
    {
        let start = Instant::now();
        let total = items.len();
        let concurrency = self.config.concurrency.max(1);
        let mut batch_size = self.config.batch_size.max(1);
        let mut result: BatchResult<T, R> = BatchResult::empty();
        let mut checkpoints_emitted = 0usize;

        info!(
            items = total,
            batch_size,
            concurrency,
            adaptive = self.config.adaptive,
            "starting batch run"
        );

        let mut cursor = 0usize;
        let mut batch_number = 0usize;
        while cursor < total {
            let end = (cursor + batch_size).min(total);
            let batch = &items[cursor..end];
            // Error counter resets at every batch boundary.
            let mut batch_errors = 0usize;

            for chunk in batch.chunks(concurrency) {
                let calls = chunk
                    .iter()
                    .cloned()
                    .map(|item| self.run_item(&worker, item));
                let outcomes = join_all(calls).await;

                for (item, outcome) in chunk.iter().cloned().zip(outcomes) {
                    result.total_processed += 1;
                    match outcome {
                        WorkerOutcome::Success {
                            data,
                            created,
                            updated,
                        } => {
                            if created {
                                result.created += 1;
                            }
                            if updated {
                                result.updated += 1;
                            }
                            result.successful.push(data);
                        }
                        WorkerOutcome::Skipped { reason } => {
                            debug!(reason = %reason, "item skipped");
                            result.skipped.push(SkippedItem { item, reason });
                        }
                        WorkerOutcome::Failed { error } => {
                            batch_errors += 1;
                            result.failed.push(FailedItem { item, error });
                        }
                    }
                }

                if self.config.checkpoint_interval > 0 {
                    let crossed = result.total_processed / self.config.checkpoint_interval;
                    if crossed > checkpoints_emitted {
                        checkpoints_emitted = crossed;
                        result.duration = start.elapsed();
                        on_progress(result.progress()).await?;
                    }
                }
            }

            cursor = end;
            batch_number += 1;

            if self.config.adaptive {
                let next = next_batch_size(
                    batch_size,
                    self.config.batch_size,
                    batch_errors,
                    batch.len(),
                );
                if next != batch_size {
                    warn!(
                        batch = batch_number,
                        errors = batch_errors,
                        from = batch_size,
                        to = next,
                        "adaptive sizing adjusted batch size"
                    );
                    batch_size = next;
                }
            }

            if cursor < total && !self.config.delay_between_batches.is_zero() {
                tokio::time::sleep(self.config.delay_between_batches).await;
            }
        }

        result.duration = start.elapsed();
        // Final checkpoint is unconditional.
        on_progress(result.progress()).await?;

        info!(
            processed = result.total_processed,
            successful = result.successful.len(),
            failed = result.failed.len(),
            skipped = result.skipped.len(),
            duration_ms = result.duration.as_millis() as u64,
            "batch run finished"
        );

        Ok(result)
    }

    /// Run one item through the worker with the per-item retry budget.
    ///
    /// Returned outcomes are final. Only a retryable worker error consumes
    /// retry attempts; anything else converts to `Failed` immediately.
    async fn run_item<T, R, W, Fut>(&self, worker: &W, item: T) -> WorkerOutcome<R>
    where
        T: Clone,
        W: Fn(T) -> Fut,
        Fut: Future<Output = SyncResult<WorkerOutcome<R>>>,
    {
        let mut attempt = 0u32;
        loop {
            match worker(item.clone()).await {
                Ok(outcome) => return outcome,
                Err(e) => {
                    if !e.is_retryable() || attempt >= self.config.max_retries {
                        return WorkerOutcome::failed(e.to_string());
                    }
                    let delay = item_retry_delay(attempt);
                    debug!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying item after error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Exponential backoff for per-item retries.
fn item_retry_delay(attempt: u32) -> Duration {
    let base = ITEM_RETRY_BASE_DELAY.as_millis() as u64;
    let ms = base.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(ms.min(ITEM_RETRY_MAX_DELAY.as_millis() as u64))
}

/// Compute the size of the next batch from this batch's error ratio.
///
/// Skipped items count toward the batch length but not toward the error
/// count: a data-quality skip is not a transient signal.
fn next_batch_size(current: usize, base: usize, errors: usize, batch_len: usize) -> usize {
    if batch_len == 0 {
        return current;
    }
    let ratio = errors as f64 / batch_len as f64;
    if ratio > 0.5 {
        (current / 2).max(MIN_BATCH_SIZE)
    } else if ratio < 0.1 && current < base * 2 {
        (current + 2).min(base * 2)
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use payrec_billing::BillingError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn fast_config(max_retries: u32) -> BatchConfig {
        BatchConfig {
            batch_size: 10,
            concurrency: 3,
            delay_between_batches: Duration::ZERO,
            max_retries,
            checkpoint_interval: 0,
            adaptive: false,
        }
    }

    #[tokio::test]
    async fn test_partition_invariant() {
        let processor = BatchProcessor::new(fast_config(0));
        let items: Vec<u32> = (0..37).collect();

        let result = processor
            .process(items, |n| async move {
                Ok(match n % 3 {
                    0 => WorkerOutcome::created(n),
                    1 => WorkerOutcome::skipped("odd one out"),
                    _ => WorkerOutcome::failed("broken"),
                })
            })
            .await
            .unwrap();

        assert_eq!(result.total_processed, 37);
        assert_eq!(
            result.successful.len() + result.failed.len() + result.skipped.len(),
            37
        );
        assert_eq!(result.created, result.successful.len() as u64);
    }

    #[tokio::test]
    async fn test_retry_budget_allows_recovery() {
        let processor = BatchProcessor::new(fast_config(3));
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();

        let result = processor
            .process(vec![1u32], move |n| {
                let seen = seen.clone();
                async move {
                    // Fails twice, then succeeds.
                    if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(SyncError::from(BillingError::network("flaky")))
                    } else {
                        Ok(WorkerOutcome::updated(n))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.successful, vec![1]);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion() {
        let processor = BatchProcessor::new(fast_config(2));
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();

        let result: BatchResult<u32, u32> = processor
            .process(vec![1u32], move |_| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err(SyncError::from(BillingError::network("always down")))
                }
            })
            .await
            .unwrap();

        assert_eq!(result.failed.len(), 1);
        assert!(result.failed[0].error.contains("always down"));
        // max_retries + 1 attempts, exactly
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let processor = BatchProcessor::new(fast_config(5));
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();

        let result: BatchResult<u32, u32> = processor
            .process(vec![1u32], move |_| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err(SyncError::from(BillingError::api(404, vec![])))
                }
            })
            .await
            .unwrap();

        assert_eq!(result.failed.len(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let processor = BatchProcessor::new(fast_config(0));
        let items: Vec<u32> = (0..20).collect();

        let result = processor
            .process(items, |n| async move {
                if n == 7 {
                    Err(SyncError::internal("item 7 explodes"))
                } else {
                    Ok(WorkerOutcome::updated(n))
                }
            })
            .await
            .unwrap();

        assert_eq!(result.total_processed, 20);
        assert_eq!(result.successful.len(), 19);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].item, 7);
    }

    #[tokio::test]
    async fn test_chunk_members_run_concurrently() {
        let mut config = fast_config(0);
        config.concurrency = 4;
        let processor = BatchProcessor::new(config);

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let result = processor
            .process((0..4u32).collect(), {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                move |n| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(WorkerOutcome::updated(n))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.successful.len(), 4);
        assert!(
            peak.load(Ordering::SeqCst) > 1,
            "chunk items should overlap"
        );
    }

    #[tokio::test]
    async fn test_checkpoint_cadence() {
        let mut config = fast_config(0);
        config.batch_size = 25;
        config.checkpoint_interval = 10;
        let processor = BatchProcessor::new(config);

        let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let result = processor
            .process_with_progress(
                (0..25u32).collect(),
                |n| async move { Ok(WorkerOutcome::updated(n)) },
                move |p| {
                    let sink = sink.clone();
                    async move {
                        sink.lock().await.push(p.total_processed);
                        Ok(())
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(result.total_processed, 25);
        let seen = seen.lock().await.clone();
        // Crossings of 10 and 20, plus the unconditional final emit.
        assert!(seen.len() >= 3, "got checkpoints at {seen:?}");
        assert_eq!(*seen.last().unwrap(), 25);
        for pair in seen.windows(2) {
            assert!(pair[0] <= pair[1], "progress must be monotonic: {seen:?}");
        }
    }

    #[tokio::test]
    async fn test_progress_error_propagates() {
        let mut config = fast_config(0);
        config.checkpoint_interval = 1;
        let processor = BatchProcessor::new(config);

        let result: SyncResult<BatchResult<u32, u32>> = processor
            .process_with_progress(
                (0..5u32).collect(),
                |n| async move { Ok(WorkerOutcome::updated(n)) },
                |_| async { Err(SyncError::internal("log store down")) },
            )
            .await;

        assert!(result.is_err(), "progress errors are not isolated");
    }

    #[tokio::test]
    async fn test_empty_input_still_reports_final_progress() {
        let processor = BatchProcessor::new(fast_config(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let result: BatchResult<u32, u32> = processor
            .process_with_progress(
                Vec::new(),
                |n| async move { Ok(WorkerOutcome::updated(n)) },
                move |p| {
                    let seen = seen.clone();
                    async move {
                        assert_eq!(p.total_processed, 0);
                        seen.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(result.total_processed, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_adaptive_shrinks_on_high_error_ratio() {
        // 11 of 20 failed: ratio > 0.5
        assert_eq!(next_batch_size(20, 20, 11, 20), 10);
        // floor at MIN_BATCH_SIZE
        assert_eq!(next_batch_size(5, 20, 5, 5), MIN_BATCH_SIZE);
        // exactly 50% is not "> 0.5"
        assert_eq!(next_batch_size(20, 20, 10, 20), 20);
    }

    #[test]
    fn test_adaptive_grows_on_clean_batch() {
        assert_eq!(next_batch_size(20, 20, 0, 20), 22);
        // capped at twice the configured base
        assert_eq!(next_batch_size(39, 20, 0, 39), 40);
        assert_eq!(next_batch_size(40, 20, 0, 40), 40);
    }

    #[test]
    fn test_adaptive_holds_in_between() {
        // 20% errors: neither shrink nor grow
        assert_eq!(next_batch_size(20, 20, 4, 20), 20);
    }

    #[test]
    fn test_item_retry_delay_backoff() {
        assert_eq!(item_retry_delay(0), ITEM_RETRY_BASE_DELAY);
        assert_eq!(item_retry_delay(1), ITEM_RETRY_BASE_DELAY * 2);
        assert_eq!(item_retry_delay(10), ITEM_RETRY_MAX_DELAY);
    }

    #[tokio::test]
    async fn test_varying_batch_sizes_cover_all_items() {
        let config = BatchConfig {
            batch_size: 8,
            concurrency: 4,
            delay_between_batches: Duration::ZERO,
            max_retries: 0,
            checkpoint_interval: 0,
            adaptive: true,
        };
        let processor = BatchProcessor::new(config);

        // Everything fails: size shrinks every batch, coverage must not.
        let result: BatchResult<u32, u32> = processor
            .process((0..50u32).collect(), |_| async {
                Ok(WorkerOutcome::failed("down"))
            })
            .await
            .unwrap();

        assert_eq!(result.total_processed, 50);
        assert_eq!(result.failed.len(), 50);
    }
}
