//! Billing API error types
//!
//! Error definitions with retryable/permanent classification, plus
//! duplicate detection used by the reconciliation conflict path.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP statuses that indicate a transient condition worth retrying.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// A single `{code, description}` pair from the billing API's error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable description.
    pub description: String,
}

impl ApiErrorDetail {
    /// Create a new error detail.
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }

    /// Whether this detail describes a duplicated resource.
    #[must_use]
    pub fn indicates_duplication(&self) -> bool {
        let code = self.code.to_lowercase();
        let description = self.description.to_lowercase();
        code.contains("duplicate")
            || description.contains("duplicate")
            || description.contains("already exists")
            || description.contains("already in use")
    }
}

/// Error that can occur while talking to the billing API.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Network error during communication (connect failure, broken pipe).
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A single attempt exceeded its time budget. The racing future is
    /// dropped, which also cancels the in-flight request.
    #[error("request timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// The API answered with a non-success status and a typed error payload.
    #[error("billing API returned HTTP {status}: {}", format_details(.errors))]
    Api {
        status: u16,
        /// Server-provided wait hint (Retry-After), present on 429 responses.
        retry_after: Option<Duration>,
        errors: Vec<ApiErrorDetail>,
    },

    /// The circuit breaker is open; the call was not attempted.
    #[error("circuit breaker open: billing API calls are suspended")]
    CircuitOpen,

    /// The response body could not be decoded.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Client configuration is invalid.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },
}

fn format_details(errors: &[ApiErrorDetail]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.code, e.description))
        .collect::<Vec<_>>()
        .join("; ")
}

impl BillingError {
    /// Check if this error is transient and the call should be retried.
    ///
    /// Transport failures and per-attempt timeouts are retryable, as are the
    /// HTTP statuses in [`RETRYABLE_STATUSES`]. An open circuit is not: the
    /// breaker already decided the dependency is down.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            BillingError::Network { .. } | BillingError::Timeout { .. } => true,
            BillingError::Api { status, .. } => RETRYABLE_STATUSES.contains(status),
            BillingError::CircuitOpen
            | BillingError::InvalidResponse { .. }
            | BillingError::Configuration { .. } => false,
        }
    }

    /// Check if the API reported a duplicated resource (create conflict).
    ///
    /// True for HTTP 409, or when any error detail describes duplication.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        match self {
            BillingError::Api { status, errors, .. } => {
                *status == 409 || errors.iter().any(ApiErrorDetail::indicates_duplication)
            }
            _ => false,
        }
    }

    /// Server-provided wait hint, if the response carried one.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BillingError::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Get an error code for classification and log sampling.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            BillingError::Network { .. } => "NETWORK_ERROR",
            BillingError::Timeout { .. } => "TIMEOUT",
            BillingError::Api { .. } => "API_ERROR",
            BillingError::CircuitOpen => "CIRCUIT_OPEN",
            BillingError::InvalidResponse { .. } => "INVALID_RESPONSE",
            BillingError::Configuration { .. } => "INVALID_CONFIG",
        }
    }

    // Convenience constructors

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        BillingError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        BillingError::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(elapsed: Duration) -> Self {
        BillingError::Timeout {
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Create an API error from a status and error details.
    #[must_use]
    pub fn api(status: u16, errors: Vec<ApiErrorDetail>) -> Self {
        BillingError::Api {
            status,
            retry_after: None,
            errors,
        }
    }

    /// Create a rate-limit error carrying the server's wait hint.
    #[must_use]
    pub fn rate_limited(retry_after: Option<Duration>, errors: Vec<ApiErrorDetail>) -> Self {
        BillingError::Api {
            status: 429,
            retry_after,
            errors,
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        BillingError::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        BillingError::Configuration {
            message: message.into(),
        }
    }
}

/// Result type for billing API operations.
pub type BillingResult<T> = Result<T, BillingError>;
