//! Backend traits for the document collections the dispatchers use.
//!
//! Three collections are involved:
//! - `notification_queue`: pending sends, consumed by the queue dispatcher
//! - `user_tokens`: email to device token bindings, read-only here
//! - `notification_history`: append-only audit log

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::notification::{
    NotificationHistoryRecord, QueuedNotification, StoredHistoryRecord, UserTokenRecord,
};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend is temporarily unavailable
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// The pending-notifications collection
#[async_trait]
pub trait NotificationQueueStore: Send + Sync {
    /// Fetch a queued record, `None` if it does not exist (or was already consumed)
    async fn get(&self, id: &str) -> Result<Option<QueuedNotification>, StoreError>;

    /// Delete a queued record. Returns whether a record was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Insert a record on behalf of a producer, returning its id
    async fn insert(&self, record: QueuedNotification) -> Result<String, StoreError>;

    /// Ids of records still waiting, oldest first, at most `limit`
    async fn pending(&self, limit: usize) -> Result<Vec<String>, StoreError>;
}

/// The token-lookup collection
#[async_trait]
pub trait TokenDirectory: Send + Sync {
    /// Records whose email is in `emails`
    async fn find_by_emails(&self, emails: &[String]) -> Result<Vec<UserTokenRecord>, StoreError>;

    /// Every record in the collection
    async fn all(&self) -> Result<Vec<UserTokenRecord>, StoreError>;
}

/// The notification history collection
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a record; the store assigns the id and the timestamp
    async fn append(&self, record: NotificationHistoryRecord) -> Result<StoredHistoryRecord, StoreError>;

    /// Most recent records first
    async fn recent(&self, limit: usize) -> Result<Vec<StoredHistoryRecord>, StoreError>;
}

/// Handles to the three collections, shared by all dispatcher invocations
#[derive(Clone)]
pub struct StoreBackends {
    pub queue: Arc<dyn NotificationQueueStore>,
    pub tokens: Arc<dyn TokenDirectory>,
    pub history: Arc<dyn HistoryStore>,
    /// Backend type identifier
    pub backend_type: &'static str,
}
