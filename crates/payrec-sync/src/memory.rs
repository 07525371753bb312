//! In-memory storage implementations.
//!
//! Used by the test suite and by embedders that keep records in process.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::log::SyncLog;
use crate::store::{
    Conflict, EntityKind, LocalRecord, LocalStore, RecordDraft, StoreError, StoreResult,
    SyncLogStore,
};
use crate::types::SyncProgress;

/// In-memory [`LocalStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<HashMap<Uuid, LocalRecord>>>,
    conflicts: Arc<RwLock<Vec<Conflict>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records.
    pub async fn records(&self) -> Vec<LocalRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// Number of records of the given kind.
    pub async fn count(&self, entity: EntityKind) -> usize {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.entity == entity)
            .count()
    }

    /// Snapshot of recorded conflicts.
    pub async fn conflicts(&self) -> Vec<Conflict> {
        self.conflicts.read().await.clone()
    }

    /// Insert a pre-existing record (test setup).
    pub async fn insert(&self, record: LocalRecord) {
        self.records.write().await.insert(record.id, record);
    }
}

#[async_trait]
impl LocalStore for InMemoryStore {
    async fn lookup_by_external_id(
        &self,
        entity: EntityKind,
        external_id: &str,
    ) -> StoreResult<Option<LocalRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| r.entity == entity && r.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn lookup_by_natural_key(
        &self,
        entity: EntityKind,
        email: Option<&str>,
        tax_id: Option<&str>,
    ) -> StoreResult<Option<LocalRecord>> {
        if email.is_none() && tax_id.is_none() {
            return Ok(None);
        }
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| {
                r.entity == entity
                    && ((email.is_some() && r.email.as_deref() == email)
                        || (tax_id.is_some() && r.tax_id.as_deref() == tax_id))
            })
            .cloned())
    }

    async fn create(&self, draft: RecordDraft) -> StoreResult<Uuid> {
        let record = LocalRecord {
            id: Uuid::new_v4(),
            entity: draft.entity,
            external_id: draft.external_id,
            email: draft.email,
            tax_id: draft.tax_id,
            fields: draft.fields,
            last_synced_at: Some(Utc::now()),
            last_sync_error: None,
            sync_attempts: 1,
        };
        let id = record.id;
        self.records.write().await.insert(id, record);
        Ok(id)
    }

    async fn update(&self, id: Uuid, fields: serde_json::Value) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::new(format!("record not found: {id}")))?;
        record.fields = fields;
        record.last_synced_at = Some(Utc::now());
        record.last_sync_error = None;
        record.sync_attempts += 1;
        Ok(())
    }

    async fn link_external_id(&self, id: Uuid, external_id: &str) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::new(format!("record not found: {id}")))?;
        record.external_id = Some(external_id.to_string());
        Ok(())
    }

    async fn record_conflict(&self, conflict: Conflict) -> StoreResult<()> {
        self.conflicts.write().await.push(conflict);
        Ok(())
    }
}

/// In-memory [`SyncLogStore`].
#[derive(Debug, Default)]
pub struct InMemorySyncLogStore {
    logs: Arc<RwLock<HashMap<Uuid, SyncLog>>>,
}

impl InMemorySyncLogStore {
    /// Create an empty log store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a log by id.
    pub async fn get(&self, id: Uuid) -> Option<SyncLog> {
        self.logs.read().await.get(&id).cloned()
    }

    /// Snapshot of all logs.
    pub async fn all(&self) -> Vec<SyncLog> {
        self.logs.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl SyncLogStore for InMemorySyncLogStore {
    async fn create_log(&self, log: &SyncLog) -> StoreResult<()> {
        self.logs.write().await.insert(log.id, log.clone());
        Ok(())
    }

    async fn update_log(&self, log: &SyncLog) -> StoreResult<()> {
        self.logs.write().await.insert(log.id, log.clone());
        Ok(())
    }

    async fn update_progress(&self, id: Uuid, progress: &SyncProgress) -> StoreResult<()> {
        let mut logs = self.logs.write().await;
        let log = logs
            .get_mut(&id)
            .ok_or_else(|| StoreError::new(format!("sync log not found: {id}")))?;
        log.apply_progress(progress);
        Ok(())
    }
}
