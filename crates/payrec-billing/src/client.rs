//! Billing API client.
//!
//! [`BillingApi`] is the trait the sync engine consumes; [`RestBillingClient`]
//! implements it over HTTP with reqwest. The client performs a single attempt
//! per call: retry and circuit-breaking live in [`crate::resilience`] so the
//! policy is owned by the caller, not buried in the transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::RestApiConfig;
use crate::error::{ApiErrorDetail, BillingError, BillingResult};
use crate::types::{CustomerDraft, ListQuery, Page, RemoteCustomer, RemotePayment, RemoteSubscription};

/// Operations the sync engine needs from the billing provider.
#[async_trait]
pub trait BillingApi: Send + Sync {
    /// List customers in the given offset/limit window.
    async fn list_customers(&self, query: ListQuery) -> BillingResult<Page<RemoteCustomer>>;

    /// List payments in the given offset/limit window.
    async fn list_payments(&self, query: ListQuery) -> BillingResult<Page<RemotePayment>>;

    /// List subscriptions in the given offset/limit window.
    async fn list_subscriptions(&self, query: ListQuery) -> BillingResult<Page<RemoteSubscription>>;

    /// Fetch a single customer by its external id.
    async fn get_customer(&self, external_id: &str) -> BillingResult<RemoteCustomer>;

    /// Create a customer, returning the entity with its assigned external id.
    async fn create_customer(&self, draft: &CustomerDraft) -> BillingResult<RemoteCustomer>;
}

/// Error payload shape of the billing API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

/// REST implementation of [`BillingApi`].
#[derive(Debug)]
pub struct RestBillingClient {
    config: RestApiConfig,
    client: Client,
}

impl RestBillingClient {
    /// Create a new client from configuration.
    pub fn new(config: RestApiConfig) -> BillingResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                BillingError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<ListQuery>,
    ) -> BillingResult<T> {
        let url = self.url(path);
        let mut request = self
            .client
            .get(&url)
            .header(self.config.api_key_header.as_str(), self.config.api_key.as_str())
            .header(header::ACCEPT, "application/json");

        if let Some(q) = query {
            request = request.query(&[("offset", q.offset), ("limit", q.limit)]);
        }

        debug!(url = %url, "GET billing API");
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        self.decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> BillingResult<T> {
        let url = self.url(path);
        debug!(url = %url, "POST billing API");

        let response = self
            .client
            .post(&url)
            .header(self.config.api_key_header.as_str(), self.config.api_key.as_str())
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        self.decode(response).await
    }

    fn transport_error(&self, e: reqwest::Error) -> BillingError {
        if e.is_timeout() {
            BillingError::timeout(self.config.request_timeout)
        } else {
            BillingError::network_with_source(format!("request failed: {e}"), e)
        }
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> BillingResult<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| BillingError::invalid_response(format!("decode failed: {e}")));
        }

        let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
            response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
        } else {
            None
        };

        let body = response.text().await.unwrap_or_default();
        trace!(status = status.as_u16(), body = %body, "billing API error response");

        let errors = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(parsed) if !parsed.errors.is_empty() => parsed.errors,
            _ if body.is_empty() => Vec::new(),
            _ => vec![ApiErrorDetail::new("http_error", body)],
        };

        Err(BillingError::Api {
            status: status.as_u16(),
            retry_after,
            errors,
        })
    }
}

/// Parse a Retry-After header value given in whole seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[async_trait]
impl BillingApi for RestBillingClient {
    async fn list_customers(&self, query: ListQuery) -> BillingResult<Page<RemoteCustomer>> {
        self.get_json("customers", Some(query)).await
    }

    async fn list_payments(&self, query: ListQuery) -> BillingResult<Page<RemotePayment>> {
        self.get_json("payments", Some(query)).await
    }

    async fn list_subscriptions(&self, query: ListQuery) -> BillingResult<Page<RemoteSubscription>> {
        self.get_json("subscriptions", Some(query)).await
    }

    async fn get_customer(&self, external_id: &str) -> BillingResult<RemoteCustomer> {
        self.get_json(&format!("customers/{external_id}"), None).await
    }

    async fn create_customer(&self, draft: &CustomerDraft) -> BillingResult<RemoteCustomer> {
        self.post_json("customers", draft).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client =
            RestBillingClient::new(RestApiConfig::new("https://api.example/v3/", "k")).unwrap();
        assert_eq!(client.url("customers"), "https://api.example/v3/customers");

        let client =
            RestBillingClient::new(RestApiConfig::new("https://api.example/v3", "k")).unwrap();
        assert_eq!(client.url("customers"), "https://api.example/v3/customers");
    }
}
