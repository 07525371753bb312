//! # Billing API boundary
//!
//! Typed access to the external billing/payments provider, plus the
//! resilience layer every remote call goes through.
//!
//! This crate provides:
//! - Remote entity models (customers, payments, subscriptions) and
//!   offset/limit pagination types
//! - A typed error taxonomy with retryable/permanent and duplicate
//!   classification
//! - The [`BillingApi`] trait consumed by the sync engine, with a
//!   reqwest-backed REST implementation
//! - [`CircuitBreaker`] and [`RetryExecutor`]: circuit breaking, per-attempt
//!   timeouts, and exponential backoff with jitter
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use payrec_billing::{
//!     BillingApi, CircuitBreaker, ListQuery, RestApiConfig, RestBillingClient, RetryExecutor,
//! };
//!
//! let client = RestBillingClient::new(RestApiConfig::new(
//!     "https://api.billing.example/v3",
//!     std::env::var("BILLING_API_KEY")?,
//! ))?;
//!
//! let breaker = Arc::new(CircuitBreaker::with_defaults());
//! let retry = RetryExecutor::with_defaults();
//!
//! let page = retry
//!     .execute_with_breaker(&breaker, || client.list_customers(ListQuery::first(100)))
//!     .await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod resilience;
pub mod types;

pub use client::{BillingApi, RestBillingClient};
pub use config::RestApiConfig;
pub use error::{ApiErrorDetail, BillingError, BillingResult, RETRYABLE_STATUSES};
pub use resilience::{
    with_timeout, CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig, RetryExecutor,
};
pub use types::{
    CustomerDraft, ListQuery, Page, RemoteCustomer, RemotePayment, RemoteSubscription,
};
