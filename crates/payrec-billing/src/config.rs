//! REST client configuration.

use std::time::Duration;

use crate::error::{BillingError, BillingResult};

/// Configuration for the REST billing client.
#[derive(Clone)]
pub struct RestApiConfig {
    /// Base URL of the billing API, e.g. `https://api.billing.example`.
    pub base_url: String,
    /// API key sent on every request.
    pub api_key: String,
    /// Header carrying the API key.
    pub api_key_header: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout applied by the HTTP client.
    pub request_timeout: Duration,
}

impl RestApiConfig {
    /// Create a configuration with default timeouts.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_key_header: "access-token".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> BillingResult<()> {
        if self.base_url.is_empty() {
            return Err(BillingError::configuration("base_url must not be empty"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(BillingError::configuration(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.api_key.is_empty() {
            return Err(BillingError::configuration("api_key must not be empty"));
        }
        Ok(())
    }
}

// Manual Debug so the API key never lands in logs.
impl std::fmt::Debug for RestApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("api_key_header", &self.api_key_header)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
