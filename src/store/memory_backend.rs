//! In-memory store backend using DashMap.
//!
//! Records live only for the lifetime of the process. Used for development
//! and tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::notification::{
    NotificationHistoryRecord, QueuedNotification, StoredHistoryRecord, UserTokenRecord,
};

use super::backend::{
    HistoryStore, NotificationQueueStore, StoreBackends, StoreError, TokenDirectory,
};

/// In-memory `notification_queue` collection
#[derive(Default)]
pub struct MemoryQueueStore {
    records: DashMap<String, QueuedNotification>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }
}

#[async_trait]
impl NotificationQueueStore for MemoryQueueStore {
    async fn get(&self, id: &str) -> Result<Option<QueuedNotification>, StoreError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.records.remove(id).is_some())
    }

    async fn insert(&self, mut record: QueuedNotification) -> Result<String, StoreError> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        if record.created_at.is_none() {
            record.created_at = Some(Utc::now());
        }

        let id = record.id.clone();
        self.records.insert(id.clone(), record);
        Ok(id)
    }

    async fn pending(&self, limit: usize) -> Result<Vec<String>, StoreError> {
        let mut waiting: Vec<_> = self
            .records
            .iter()
            .map(|r| (r.created_at, r.key().clone()))
            .collect();
        waiting.sort();

        Ok(waiting.into_iter().take(limit).map(|(_, id)| id).collect())
    }
}

/// In-memory `user_tokens` collection, keyed by document id
#[derive(Default)]
pub struct MemoryTokenDirectory {
    records: DashMap<String, UserTokenRecord>,
}

impl MemoryTokenDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding, returning its document id
    pub fn register(&self, record: UserTokenRecord) -> String {
        let id = Uuid::new_v4().to_string();
        self.records.insert(id.clone(), record);
        id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TokenDirectory for MemoryTokenDirectory {
    async fn find_by_emails(&self, emails: &[String]) -> Result<Vec<UserTokenRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| emails.contains(&r.email))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn all(&self) -> Result<Vec<UserTokenRecord>, StoreError> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }
}

/// In-memory `notification_history` collection
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: DashMap<Uuid, StoredHistoryRecord>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of every record, oldest first
    pub fn records(&self) -> Vec<StoredHistoryRecord> {
        let mut records: Vec<StoredHistoryRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.timestamp);
        records
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, record: NotificationHistoryRecord) -> Result<StoredHistoryRecord, StoreError> {
        let stored = StoredHistoryRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            record,
        };
        self.records.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StoredHistoryRecord>, StoreError> {
        let mut records = self.records();
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}

/// Concrete handles to the in-memory collections
#[derive(Clone, Default)]
pub struct MemoryStores {
    pub queue: Arc<MemoryQueueStore>,
    pub tokens: Arc<MemoryTokenDirectory>,
    pub history: Arc<MemoryHistoryStore>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backends(&self) -> StoreBackends {
        StoreBackends {
            queue: self.queue.clone(),
            tokens: self.tokens.clone(),
            history: self.history.clone(),
            backend_type: "memory",
        }
    }
}
