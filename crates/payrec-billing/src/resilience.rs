//! Resilience layer for billing API calls.
//!
//! Provides a circuit breaker and retry logic with exponential backoff.
//! One [`CircuitBreaker`] instance is shared (via `Arc`) across every caller
//! of the billing API so that sustained failures apply backpressure
//! globally, not per call site.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{BillingError, BillingResult};

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are blocked until the reset timeout elapses.
    Open,
    /// A limited number of trial calls probe whether the dependency
    /// recovered.
    HalfOpen,
}

impl CircuitState {
    /// Whether calls are allowed in this state.
    #[must_use]
    pub fn allows_calls(self) -> bool {
        self != CircuitState::Open
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing trial calls.
    pub reset_timeout: Duration,
    /// Consecutive trial successes required to close the circuit again.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    probe_successes: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker guarding the billing API.
///
/// State transitions are guarded by a single lock so the breaker is safe to
/// share across tasks on a multi-threaded runtime.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                probe_successes: 0,
                last_failure: None,
            }),
        }
    }

    /// Create a new circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Get the current circuit state, applying the open-to-half-open
    /// transition if the reset timeout has elapsed.
    pub async fn state(&self) -> CircuitState {
        self.maybe_half_open().await;
        self.inner.read().await.state
    }

    /// Check if calls are currently allowed.
    pub async fn is_allowed(&self) -> bool {
        self.state().await.allows_calls()
    }

    /// Record a successful call.
    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed => {
                inner.failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.probe_successes += 1;
                if inner.probe_successes >= self.config.half_open_max_calls {
                    debug!(
                        probes = inner.probe_successes,
                        "circuit breaker closing after successful probes"
                    );
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.probe_successes = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    warn!(
                        failures = inner.failures,
                        "circuit breaker opening after consecutive failures"
                    );
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                warn!("circuit breaker reopening after probe failure");
                inner.state = CircuitState::Open;
                inner.probe_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Reset the breaker to closed. Intended for tests and operator use.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.probe_successes = 0;
        inner.last_failure = None;
    }

    /// Execute a call under circuit breaker protection.
    ///
    /// When the circuit is open and the reset timeout has not elapsed, the
    /// call fails immediately with [`BillingError::CircuitOpen`] without
    /// invoking the operation. Only retryable errors count as failures;
    /// permanent errors (validation, duplicates) pass through without
    /// tripping the breaker.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> BillingResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BillingResult<T>>,
    {
        if !self.is_allowed().await {
            return Err(BillingError::CircuitOpen);
        }

        match operation().await {
            Ok(result) => {
                self.record_success().await;
                Ok(result)
            }
            Err(e) => {
                if e.is_retryable() {
                    self.record_failure().await;
                }
                Err(e)
            }
        }
    }

    /// Transition from Open to HalfOpen once the reset timeout has elapsed.
    async fn maybe_half_open(&self) {
        {
            let inner = self.inner.read().await;
            if inner.state != CircuitState::Open {
                return;
            }
            let elapsed = inner.last_failure.map(|at| at.elapsed());
            if elapsed.map_or(false, |e| e < self.config.reset_timeout) {
                return;
            }
        }

        let mut inner = self.inner.write().await;
        if inner.state == CircuitState::Open {
            let elapsed = inner.last_failure.map(|at| at.elapsed());
            if elapsed.map_or(true, |e| e >= self.config.reset_timeout) {
                debug!("circuit breaker transitioning to half-open");
                inner.state = CircuitState::HalfOpen;
                inner.probe_successes = 0;
            }
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the computed backoff delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub factor: f64,
    /// Time budget for each individual attempt.
    pub attempt_timeout: Duration,
    /// Whether to add ~10% random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            factor: 2.0,
            attempt_timeout: Duration::from_secs(30),
            jitter: true,
        }
    }
}

/// Race a future against a deadline.
///
/// On expiry the waiter receives [`BillingError::Timeout`] and the future is
/// dropped, cancelling the in-flight call.
pub async fn with_timeout<Fut, T>(fut: Fut, deadline: Duration) -> BillingResult<T>
where
    Fut: Future<Output = BillingResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(BillingError::timeout(deadline)),
    }
}

/// Retry executor with exponential backoff and per-attempt timeouts.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor with the given configuration.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a new retry executor with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Calculate the delay before the retry following `attempt` (0-indexed).
    ///
    /// A server-provided wait hint (Retry-After on a 429) takes precedence
    /// over the computed backoff.
    fn calculate_delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint;
        }

        let base = self.config.initial_delay.as_millis() as f64
            * self.config.factor.powi(attempt as i32);
        let capped = base.min(self.config.max_delay.as_millis() as f64);

        let delay_ms = if self.config.jitter {
            capped * (1.0 + rand::random::<f64>() * 0.1)
        } else {
            capped
        };

        Duration::from_millis(delay_ms as u64)
    }

    /// Execute an operation, retrying on retryable errors.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> BillingResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BillingResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() || attempt >= self.config.max_retries {
                        return Err(e);
                    }
                    let delay = self.calculate_delay(attempt, e.retry_after());
                    debug!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying billing call after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Execute an operation with a per-attempt timeout, then retry around the
    /// timed call, so each attempt gets an independent time budget.
    pub async fn execute_timed<F, Fut, T>(&self, mut operation: F) -> BillingResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BillingResult<T>>,
    {
        let deadline = self.config.attempt_timeout;
        self.execute(|| with_timeout(operation(), deadline)).await
    }

    /// Execute with circuit breaker protection, a per-attempt timeout, and
    /// retries. An open circuit fails immediately and is never retried.
    pub async fn execute_with_breaker<F, Fut, T>(
        &self,
        breaker: &CircuitBreaker,
        mut operation: F,
    ) -> BillingResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BillingResult<T>>,
    {
        let deadline = self.config.attempt_timeout;

        let mut attempt = 0;
        loop {
            let result = breaker
                .execute(|| with_timeout(operation(), deadline))
                .await;

            match result {
                Ok(result) => return Ok(result),
                Err(BillingError::CircuitOpen) => return Err(BillingError::CircuitOpen),
                Err(e) => {
                    if !e.is_retryable() || attempt >= self.config.max_retries {
                        return Err(e);
                    }
                    let delay = self.calculate_delay(attempt, e.retry_after());
                    debug!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying billing call after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
