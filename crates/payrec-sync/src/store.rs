//! Local persistence boundary.
//!
//! The engine never talks to a database directly; it depends on the narrow
//! capability traits defined here. Reconciliation needs [`LocalStore`], run
//! bookkeeping needs [`SyncLogStore`]. Any storage runtime (Postgres, an ORM,
//! an in-process map) can implement them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::log::SyncLog;
use crate::types::SyncProgress;

/// Entity families held in local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customer,
    Payment,
    Subscription,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Payment => write!(f, "payment"),
            Self::Subscription => write!(f, "subscription"),
        }
    }
}

/// A locally stored business record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalRecord {
    pub id: Uuid,
    pub entity: EntityKind,
    /// External id linked to this record, once known. Stable after linking:
    /// reprocessing the same external id updates this record.
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub tax_id: Option<String>,
    /// Entity payload (name, amounts, status, references).
    pub fields: serde_json::Value,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub sync_attempts: u32,
}

/// Fields for creating a local record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDraft {
    pub entity: EntityKind,
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub tax_id: Option<String>,
    pub fields: serde_json::Value,
}

/// An ambiguous duplicate detected on the remote side, awaiting manual
/// resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: Uuid,
    pub entity: EntityKind,
    pub local: serde_json::Value,
    pub remote: serde_json::Value,
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    /// Create a conflict record from local and remote snapshots.
    #[must_use]
    pub fn new(entity: EntityKind, local: serde_json::Value, remote: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity,
            local,
            remote,
            detected_at: Utc::now(),
        }
    }
}

/// Error from a storage implementation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    /// Create a store error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Capability interface over local business records.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Find a record by its linked external id.
    async fn lookup_by_external_id(
        &self,
        entity: EntityKind,
        external_id: &str,
    ) -> StoreResult<Option<LocalRecord>>;

    /// Find a record by natural key. A record matches when its email equals
    /// `email` or its tax id equals `tax_id` (either side may be absent).
    async fn lookup_by_natural_key(
        &self,
        entity: EntityKind,
        email: Option<&str>,
        tax_id: Option<&str>,
    ) -> StoreResult<Option<LocalRecord>>;

    /// Create a record, returning its id.
    async fn create(&self, draft: RecordDraft) -> StoreResult<Uuid>;

    /// Update a record's payload.
    async fn update(&self, id: Uuid, fields: serde_json::Value) -> StoreResult<()>;

    /// Link an external id to an existing record.
    async fn link_external_id(&self, id: Uuid, external_id: &str) -> StoreResult<()>;

    /// Persist a conflict for manual resolution.
    async fn record_conflict(&self, conflict: Conflict) -> StoreResult<()>;
}

/// Persistence surface for run-level sync logs.
#[async_trait]
pub trait SyncLogStore: Send + Sync {
    /// Persist a newly created log.
    async fn create_log(&self, log: &SyncLog) -> StoreResult<()>;

    /// Persist the full state of a log (finalization).
    async fn update_log(&self, log: &SyncLog) -> StoreResult<()>;

    /// Persist a progress checkpoint for a live log.
    async fn update_progress(&self, id: Uuid, progress: &SyncProgress) -> StoreResult<()>;
}
