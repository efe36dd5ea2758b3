//! PostgreSQL store backend.
//!
//! Tables are created by `migrations/0001_init.sql`. Free-form fields
//! (`data`, `tokens`, `user_emails`) are stored as JSONB.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::notification::{
    NotificationData, NotificationHistoryRecord, QueuedNotification, StoredHistoryRecord,
    UserTokenRecord,
};

use super::backend::{HistoryStore, NotificationQueueStore, StoreError, TokenDirectory};

type QueueRow = (
    String,
    Option<String>,
    Option<String>,
    Option<Json<NotificationData>>,
    Option<Json<Vec<String>>>,
    Option<DateTime<Utc>>,
);

type HistoryRow = (
    Uuid,
    DateTime<Utc>,
    Option<String>,
    Option<String>,
    Option<Json<NotificationData>>,
    i64,
    i64,
    i64,
    Option<String>,
    Option<Json<Vec<String>>>,
);

/// `notification_queue` table
pub struct PostgresQueueStore {
    pool: PgPool,
}

impl PostgresQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationQueueStore for PostgresQueueStore {
    async fn get(&self, id: &str) -> Result<Option<QueuedNotification>, StoreError> {
        let row: Option<QueueRow> = sqlx::query_as(
            r#"
            SELECT id, title, body, data, tokens, created_at
            FROM notification_queue
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, title, body, data, tokens, created_at)| QueuedNotification {
            id,
            title,
            body,
            data: data.map(|d| d.0),
            tokens: tokens.map(|t| t.0),
            created_at,
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM notification_queue WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert(&self, record: QueuedNotification) -> Result<String, StoreError> {
        let id = if record.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            record.id
        };

        sqlx::query(
            r#"
            INSERT INTO notification_queue (id, title, body, data, tokens, created_at)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, NOW()))
            "#,
        )
        .bind(&id)
        .bind(record.title)
        .bind(record.body)
        .bind(record.data.map(Json))
        .bind(record.tokens.map(Json))
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        tracing::trace!(record_id = %id, "Notification queued in PostgreSQL");

        Ok(id)
    }

    async fn pending(&self, limit: usize) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM notification_queue
            ORDER BY created_at, id
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

/// Split a recipient list into de-duplicated membership queries of at most
/// `chunk_size` emails each (a zero size is treated as one)
pub(crate) fn lookup_chunks(emails: &[String], chunk_size: usize) -> Vec<Vec<String>> {
    let mut unique: Vec<String> = emails.to_vec();
    unique.sort();
    unique.dedup();

    unique
        .chunks(chunk_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// `user_tokens` table
pub struct PostgresTokenDirectory {
    pool: PgPool,
    chunk_size: usize,
}

impl PostgresTokenDirectory {
    /// `chunk_size` bounds the number of emails bound into one membership query
    pub fn new(pool: PgPool, chunk_size: usize) -> Self {
        Self {
            pool,
            chunk_size: chunk_size.max(1),
        }
    }
}

#[async_trait]
impl TokenDirectory for PostgresTokenDirectory {
    async fn find_by_emails(&self, emails: &[String]) -> Result<Vec<UserTokenRecord>, StoreError> {
        let mut records = Vec::new();
        for chunk in lookup_chunks(emails, self.chunk_size) {
            let rows: Vec<(String, Option<String>)> = sqlx::query_as(
                "SELECT email, token FROM user_tokens WHERE email = ANY($1)",
            )
            .bind(chunk)
            .fetch_all(&self.pool)
            .await?;

            records.extend(
                rows.into_iter()
                    .map(|(email, token)| UserTokenRecord { email, token }),
            );
        }

        Ok(records)
    }

    async fn all(&self) -> Result<Vec<UserTokenRecord>, StoreError> {
        let rows: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT email, token FROM user_tokens")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(email, token)| UserTokenRecord { email, token })
            .collect())
    }
}

/// `notification_history` table
pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn append(&self, record: NotificationHistoryRecord) -> Result<StoredHistoryRecord, StoreError> {
        let id = Uuid::new_v4();

        let (timestamp,): (DateTime<Utc>,) = sqlx::query_as(
            r#"
            INSERT INTO notification_history
                (id, title, body, data, tokens_count, success_count, failure_count,
                 sent_by, user_emails, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            RETURNING timestamp
            "#,
        )
        .bind(id)
        .bind(&record.title)
        .bind(&record.body)
        .bind(record.data.as_ref().map(Json))
        .bind(record.tokens_count as i64)
        .bind(record.success_count as i64)
        .bind(record.failure_count as i64)
        .bind(&record.sent_by)
        .bind(record.user_emails.as_ref().map(Json))
        .fetch_one(&self.pool)
        .await?;

        Ok(StoredHistoryRecord {
            id,
            timestamp,
            record,
        })
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StoredHistoryRecord>, StoreError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT id, timestamp, title, body, data, tokens_count, success_count,
                   failure_count, sent_by, user_emails
            FROM notification_history
            ORDER BY timestamp DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, timestamp, title, body, data, tokens, success, failure, sent_by, emails)| {
                    StoredHistoryRecord {
                        id,
                        timestamp,
                        record: NotificationHistoryRecord {
                            title,
                            body,
                            data: data.map(|d| d.0),
                            tokens_count: tokens.max(0) as usize,
                            success_count: success.max(0) as usize,
                            failure_count: failure.max(0) as usize,
                            sent_by,
                            user_emails: emails.map(|e| e.0),
                        },
                    }
                },
            )
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emails(list: &[&str]) -> Vec<String> {
        list.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_lookup_chunks_empty() {
        assert!(lookup_chunks(&[], 30).is_empty());
    }

    #[test]
    fn test_lookup_chunks_exact_size_is_one_query() {
        let chunks = lookup_chunks(&emails(&["a@x.com", "b@x.com", "c@x.com"]), 3);
        assert_eq!(chunks, vec![emails(&["a@x.com", "b@x.com", "c@x.com"])]);
    }

    #[test]
    fn test_lookup_chunks_one_over_size_splits() {
        let chunks = lookup_chunks(&emails(&["d@x.com", "a@x.com", "c@x.com", "b@x.com"]), 3);
        assert_eq!(
            chunks,
            vec![emails(&["a@x.com", "b@x.com", "c@x.com"]), emails(&["d@x.com"])]
        );
    }

    #[test]
    fn test_lookup_chunks_removes_duplicates() {
        let chunks = lookup_chunks(&emails(&["b@x.com", "a@x.com", "b@x.com", "a@x.com"]), 30);
        assert_eq!(chunks, vec![emails(&["a@x.com", "b@x.com"])]);
    }

    #[test]
    fn test_lookup_chunks_zero_size_clamps_to_one() {
        let chunks = lookup_chunks(&emails(&["a@x.com", "b@x.com"]), 0);
        assert_eq!(chunks, vec![emails(&["a@x.com"]), emails(&["b@x.com"])]);
    }
}
