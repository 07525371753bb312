//! Remote entity models for the billing API.
//!
//! Every remote entity carries a stable external id assigned by the billing
//! provider, plus the natural keys used to match it against local records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A customer as held by the billing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCustomer {
    /// Stable external id assigned by the provider.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Tax identifier (natural key alongside email).
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Caller-assigned reference echoed back by the provider.
    #[serde(default)]
    pub external_reference: Option<String>,
}

/// A charge/payment as held by the billing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePayment {
    pub id: String,
    /// External id of the owning customer (counterparty reference).
    pub customer: String,
    pub value: f64,
    pub status: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub billing_type: Option<String>,
}

/// A recurring subscription as held by the billing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSubscription {
    pub id: String,
    /// External id of the owning customer (counterparty reference).
    pub customer: String,
    pub value: f64,
    pub status: String,
    /// Billing cycle, e.g. `MONTHLY`.
    pub cycle: String,
    #[serde(default)]
    pub next_due_date: Option<NaiveDate>,
}

/// Payload for creating a customer on the billing provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDraft {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(rename = "data")]
    pub items: Vec<T>,
    pub has_more: bool,
    pub total_count: u64,
}

impl<T> Page<T> {
    /// An empty final page.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
            total_count: 0,
        }
    }
}

/// Offset/limit window for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub offset: u64,
    pub limit: u64,
}

impl ListQuery {
    /// First page with the given size.
    #[must_use]
    pub fn first(limit: u64) -> Self {
        Self { offset: 0, limit }
    }

    /// The window immediately after this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}
