use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::auth::Caller;
use crate::config::DispatchConfig;
use crate::delivery::{DeliveryError, PushDelivery};
use crate::error::{AppError, Result};
use crate::metrics::{DeliveryMetrics, DispatchMetrics};
use crate::store::{StoreBackends, StoreError};

use super::{
    collect_tokens, BatchResponse, CallableResponse, MessageOptions, MulticastMessage,
    NotificationData, NotificationHistoryRecord, SendToAllRequest, SendToUsersRequest,
    StoredHistoryRecord,
};

const ENTRY_QUEUE: &str = "queue";
const ENTRY_USERS: &str = "users";
const ENTRY_ALL: &str = "all";

/// Upper bound on the number of history records returned in one call
pub const MAX_HISTORY_LIMIT: usize = 100;

/// How a queue-drain invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    /// Delivered, record deleted and history appended
    Sent(BatchResponse),
    /// The record no longer exists
    AlreadyProcessed,
    /// The record could not be read; it is left in place
    LoadFailed,
    /// The record had no tokens and was deleted without a send
    NoTokens,
    /// The delivery call failed; the record is left in place
    DeliveryFailed,
    /// Delivered, but deleting the record or writing history failed
    RecordFailed(BatchResponse),
}

impl QueueOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            QueueOutcome::Sent(_) => "sent",
            QueueOutcome::AlreadyProcessed => "already_processed",
            QueueOutcome::LoadFailed => "load_failed",
            QueueOutcome::NoTokens => "no_tokens",
            QueueOutcome::DeliveryFailed => "delivery_failed",
            QueueOutcome::RecordFailed(_) => "record_failed",
        }
    }
}

/// Statistics for the notification dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Queue-drain invocations
    pub queue_invocations: AtomicU64,
    /// Targeted invocations
    pub targeted_invocations: AtomicU64,
    /// Broadcast invocations
    pub broadcast_invocations: AtomicU64,
    /// Multicast calls that returned counts
    pub multicasts_sent: AtomicU64,
    /// Tokens handed to the delivery API
    pub tokens_submitted: AtomicU64,
    pub total_success: AtomicU64,
    pub total_failure: AtomicU64,
    /// Multicast calls that failed as a whole
    pub delivery_errors: AtomicU64,
    /// Invocations that ended without recipients
    pub empty_dispatches: AtomicU64,
    pub history_written: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            queue_invocations: self.queue_invocations.load(Ordering::Relaxed),
            targeted_invocations: self.targeted_invocations.load(Ordering::Relaxed),
            broadcast_invocations: self.broadcast_invocations.load(Ordering::Relaxed),
            multicasts_sent: self.multicasts_sent.load(Ordering::Relaxed),
            tokens_submitted: self.tokens_submitted.load(Ordering::Relaxed),
            total_success: self.total_success.load(Ordering::Relaxed),
            total_failure: self.total_failure.load(Ordering::Relaxed),
            delivery_errors: self.delivery_errors.load(Ordering::Relaxed),
            empty_dispatches: self.empty_dispatches.load(Ordering::Relaxed),
            history_written: self.history_written.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub queue_invocations: u64,
    pub targeted_invocations: u64,
    pub broadcast_invocations: u64,
    pub multicasts_sent: u64,
    pub tokens_submitted: u64,
    pub total_success: u64,
    pub total_failure: u64,
    pub delivery_errors: u64,
    pub empty_dispatches: u64,
    pub history_written: u64,
}

/// Message content shared by the callable dispatchers
struct Content {
    title: String,
    body: String,
    data: Option<NotificationData>,
}

/// Dispatches push notifications through the delivery API and records the
/// outcome in the history collection.
///
/// The three entry points (queue drain, targeted, broadcast) differ only in
/// how recipients are collected; all of them end in a single multicast send
/// followed by one history append.
pub struct NotificationDispatcher {
    delivery: Arc<dyn PushDelivery>,
    stores: StoreBackends,
    options: MessageOptions,
    broadcast_marker: String,
    stats: DispatcherStats,
}

impl NotificationDispatcher {
    pub fn new(
        delivery: Arc<dyn PushDelivery>,
        stores: StoreBackends,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            delivery,
            stores,
            options: MessageOptions::from_config(config),
            broadcast_marker: config.broadcast_marker.clone(),
            stats: DispatcherStats::default(),
        }
    }

    pub fn stats(&self) -> &DispatcherStats {
        &self.stats
    }

    pub fn options(&self) -> &MessageOptions {
        &self.options
    }

    pub fn backend_type(&self) -> &'static str {
        self.stores.backend_type
    }

    /// Require an authenticated caller
    pub fn authorize(auth: Option<&Caller>) -> Result<&Caller> {
        auth.ok_or_else(|| AppError::Unauthenticated("User must be authenticated".to_string()))
    }

    /// Consume one queued notification.
    ///
    /// Never returns an error: every failure is logged and reported through
    /// the returned [`QueueOutcome`] so the trigger loop keeps running.
    #[tracing::instrument(name = "dispatch.queue", skip(self), fields(record_id = %id))]
    pub async fn drain_queued(&self, id: &str) -> QueueOutcome {
        DispatchMetrics::record_invocation(ENTRY_QUEUE);
        self.stats.queue_invocations.fetch_add(1, Ordering::Relaxed);

        let outcome = self.drain_queued_inner(id).await;
        DispatchMetrics::record_outcome(ENTRY_QUEUE, outcome.label());
        outcome
    }

    async fn drain_queued_inner(&self, id: &str) -> QueueOutcome {
        let record = match self.stores.queue.get(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(record_id = %id, "Queued notification not found, already processed");
                return QueueOutcome::AlreadyProcessed;
            }
            Err(e) => {
                tracing::error!(record_id = %id, error = %e, "Failed to load queued notification");
                return QueueOutcome::LoadFailed;
            }
        };

        if !record.has_tokens() {
            tracing::info!(record_id = %id, "No tokens provided for notification");
            self.stats.empty_dispatches.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.stores.queue.delete(id).await {
                tracing::error!(record_id = %id, error = %e, "Failed to delete queued notification");
            }
            return QueueOutcome::NoTokens;
        }

        let notification = self
            .options
            .resolve(record.title.as_deref(), record.body.as_deref());
        let message = match MulticastMessage::new(
            notification,
            record.data.clone(),
            record.tokens().to_vec(),
            &self.options,
        ) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(record_id = %id, error = %e, "Failed to build message");
                return QueueOutcome::DeliveryFailed;
            }
        };

        let response = match self.deliver(&message).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(record_id = %id, error = %e, "Error sending notification");
                return QueueOutcome::DeliveryFailed;
            }
        };

        tracing::info!(
            record_id = %id,
            success_count = response.success_count,
            failure_count = response.failure_count,
            "Successfully sent queued notification"
        );

        let mut record_failed = false;

        if let Err(e) = self.stores.queue.delete(id).await {
            tracing::error!(record_id = %id, error = %e, "Failed to delete queued notification");
            record_failed = true;
        }

        let history = NotificationHistoryRecord::new(
            record.title,
            record.body,
            record.data,
            message.token_count(),
            &response,
        );
        if let Err(e) = self.append_history(history).await {
            tracing::error!(record_id = %id, error = %e, "Failed to write notification history");
            record_failed = true;
        }

        if record_failed {
            QueueOutcome::RecordFailed(response)
        } else {
            QueueOutcome::Sent(response)
        }
    }

    /// Drain records that are still waiting in the queue, oldest first.
    ///
    /// Announcements published while no subscriber was listening are lost,
    /// so the trigger runs this after every (re)subscription. Records that
    /// failed earlier are retried here as well.
    pub async fn drain_pending(
        &self,
        limit: usize,
    ) -> std::result::Result<Vec<(String, QueueOutcome)>, StoreError> {
        let ids = self.stores.queue.pending(limit).await?;

        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = self.drain_queued(&id).await;
            outcomes.push((id, outcome));
        }

        Ok(outcomes)
    }

    /// Send to the devices registered for a list of user emails
    #[tracing::instrument(
        name = "dispatch.send_to_users",
        skip(self, auth, request),
        fields(caller = auth.map(|c| c.uid.as_str()).unwrap_or("-"))
    )]
    pub async fn send_to_users(
        &self,
        auth: Option<&Caller>,
        request: SendToUsersRequest,
    ) -> Result<CallableResponse> {
        DispatchMetrics::record_invocation(ENTRY_USERS);
        self.stats.targeted_invocations.fetch_add(1, Ordering::Relaxed);

        let result = self.send_to_users_inner(auth, request).await;
        DispatchMetrics::record_outcome(ENTRY_USERS, callable_outcome(&result));
        result
    }

    async fn send_to_users_inner(
        &self,
        auth: Option<&Caller>,
        request: SendToUsersRequest,
    ) -> Result<CallableResponse> {
        let caller = Self::authorize(auth)?;

        let user_emails = match request.user_emails {
            Some(emails) if !emails.is_empty() => emails,
            _ => {
                return Err(AppError::InvalidArgument(
                    "userEmails must be a non-empty array".to_string(),
                ))
            }
        };
        let content = required_content(request.title, request.body, request.data)?;

        let records = self
            .stores
            .tokens
            .find_by_emails(&user_emails)
            .await
            .map_err(|e| internal("Failed to look up user tokens", e))?;

        let tokens = collect_tokens(&records);
        tracing::debug!(
            requested = user_emails.len(),
            tokens = tokens.len(),
            "Resolved recipient tokens"
        );

        if tokens.is_empty() {
            self.stats.empty_dispatches.fetch_add(1, Ordering::Relaxed);
            return Ok(CallableResponse::no_recipients(
                "No valid tokens found for the specified users",
            ));
        }

        self.send_and_record(content, tokens, &caller.uid, user_emails)
            .await
    }

    /// Send to every registered device
    #[tracing::instrument(
        name = "dispatch.send_to_all",
        skip(self, auth, request),
        fields(caller = auth.map(|c| c.uid.as_str()).unwrap_or("-"))
    )]
    pub async fn send_to_all(
        &self,
        auth: Option<&Caller>,
        request: SendToAllRequest,
    ) -> Result<CallableResponse> {
        DispatchMetrics::record_invocation(ENTRY_ALL);
        self.stats.broadcast_invocations.fetch_add(1, Ordering::Relaxed);

        let result = self.send_to_all_inner(auth, request).await;
        DispatchMetrics::record_outcome(ENTRY_ALL, callable_outcome(&result));
        result
    }

    async fn send_to_all_inner(
        &self,
        auth: Option<&Caller>,
        request: SendToAllRequest,
    ) -> Result<CallableResponse> {
        let caller = Self::authorize(auth)?;
        let content = required_content(request.title, request.body, request.data)?;

        let records = self
            .stores
            .tokens
            .all()
            .await
            .map_err(|e| internal("Failed to load user tokens", e))?;

        let tokens = collect_tokens(&records);
        if tokens.is_empty() {
            self.stats.empty_dispatches.fetch_add(1, Ordering::Relaxed);
            return Ok(CallableResponse::no_recipients("No users found with valid tokens"));
        }

        let marker = vec![self.broadcast_marker.clone()];
        self.send_and_record(content, tokens, &caller.uid, marker)
            .await
    }

    /// Most recent history records, newest first
    pub async fn recent_history(
        &self,
        auth: Option<&Caller>,
        limit: usize,
    ) -> Result<Vec<StoredHistoryRecord>> {
        Self::authorize(auth)?;

        self.stores
            .history
            .recent(limit.clamp(1, MAX_HISTORY_LIMIT))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to read notification history");
                AppError::Internal("Failed to read notification history".to_string())
            })
    }

    async fn send_and_record(
        &self,
        content: Content,
        tokens: Vec<String>,
        sent_by: &str,
        user_emails: Vec<String>,
    ) -> Result<CallableResponse> {
        let notification = self
            .options
            .resolve(Some(&content.title), Some(&content.body));
        let message = MulticastMessage::new(notification, content.data.clone(), tokens, &self.options)
            .map_err(|e| internal("Failed to build message", e))?;

        let response = self
            .deliver(&message)
            .await
            .map_err(|e| internal("Error sending notification", e))?;

        tracing::info!(
            success_count = response.success_count,
            failure_count = response.failure_count,
            "Notification sent"
        );

        let history = NotificationHistoryRecord::new(
            Some(content.title),
            Some(content.body),
            content.data,
            message.token_count(),
            &response,
        )
        .sent_by(sent_by, user_emails);

        self.append_history(history)
            .await
            .map_err(|e| internal("Failed to write notification history", e))?;

        Ok(CallableResponse::sent(&response))
    }

    async fn deliver(&self, message: &MulticastMessage) -> std::result::Result<BatchResponse, DeliveryError> {
        match self.delivery.send_multicast(message).await {
            Ok(response) => {
                DeliveryMetrics::record_batch(message.token_count(), &response);
                self.stats.multicasts_sent.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .tokens_submitted
                    .fetch_add(message.token_count() as u64, Ordering::Relaxed);
                self.stats
                    .total_success
                    .fetch_add(response.success_count as u64, Ordering::Relaxed);
                self.stats
                    .total_failure
                    .fetch_add(response.failure_count as u64, Ordering::Relaxed);
                Ok(response)
            }
            Err(e) => {
                DeliveryMetrics::record_error();
                self.stats.delivery_errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    async fn append_history(
        &self,
        record: NotificationHistoryRecord,
    ) -> std::result::Result<StoredHistoryRecord, StoreError> {
        let stored = self.stores.history.append(record).await?;
        self.stats.history_written.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(history_id = %stored.id, "Notification history recorded");
        Ok(stored)
    }
}

fn required_content(
    title: Option<String>,
    body: Option<String>,
    data: Option<NotificationData>,
) -> Result<Content> {
    match (title, body) {
        (Some(title), Some(body)) if !title.is_empty() && !body.is_empty() => {
            Ok(Content { title, body, data })
        }
        _ => Err(AppError::InvalidArgument(
            "title and body are required".to_string(),
        )),
    }
}

fn internal(context: &str, error: impl std::fmt::Display) -> AppError {
    tracing::error!(error = %error, "{}", context);
    AppError::Internal("Failed to send notification".to_string())
}

fn callable_outcome(result: &Result<CallableResponse>) -> &'static str {
    match result {
        Ok(response) if response.success => "sent",
        Ok(_) => "no_recipients",
        Err(e) => match e {
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::InvalidArgument(_) => "invalid_argument",
            AppError::Internal(_) | AppError::Config(_) => "internal",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStores;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDelivery {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl PushDelivery for RecordingDelivery {
        async fn send_multicast(
            &self,
            message: &MulticastMessage,
        ) -> std::result::Result<BatchResponse, DeliveryError> {
            self.calls.lock().unwrap().push(message.tokens.clone());
            Ok(BatchResponse::new(message.token_count(), 0))
        }
    }

    fn dispatcher() -> (NotificationDispatcher, Arc<RecordingDelivery>, MemoryStores) {
        let delivery = Arc::new(RecordingDelivery::default());
        let stores = MemoryStores::new();
        let dispatcher = NotificationDispatcher::new(
            delivery.clone(),
            stores.backends(),
            &DispatchConfig::default(),
        );
        (dispatcher, delivery, stores)
    }

    #[test]
    fn test_authorize() {
        assert!(matches!(
            NotificationDispatcher::authorize(None),
            Err(AppError::Unauthenticated(_))
        ));
        let caller = Caller::new("uid-1");
        assert_eq!(
            NotificationDispatcher::authorize(Some(&caller)).unwrap().uid,
            "uid-1"
        );
    }

    #[test]
    fn test_required_content() {
        assert!(required_content(Some("a".into()), Some("b".into()), None).is_ok());
        assert!(required_content(Some("".into()), Some("b".into()), None).is_err());
        assert!(required_content(Some("a".into()), None, None).is_err());
    }

    #[tokio::test]
    async fn test_unauthenticated_checked_before_arguments() {
        let (dispatcher, delivery, _) = dispatcher();

        let err = dispatcher
            .send_to_users(None, SendToUsersRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unauthenticated");
        assert!(delivery.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outcome_label() {
        let (dispatcher, _, _) = dispatcher();
        let outcome = dispatcher.drain_queued("missing").await;
        assert_eq!(outcome, QueueOutcome::AlreadyProcessed);
        assert_eq!(outcome.label(), "already_processed");
        assert_eq!(dispatcher.stats().snapshot().queue_invocations, 1);
    }

    #[tokio::test]
    async fn test_broadcast_records_marker() {
        let (dispatcher, delivery, stores) = dispatcher();
        stores
            .tokens
            .register(crate::notification::UserTokenRecord::new("a@x.com", "tok-a"));

        let caller = Caller::new("admin");
        let response = dispatcher
            .send_to_all(
                Some(&caller),
                SendToAllRequest {
                    title: Some("Hi".into()),
                    body: Some("All".into()),
                    data: None,
                },
            )
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(delivery.calls.lock().unwrap().len(), 1);

        let history = stores.history.records();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].record.sent_by.as_deref(), Some("admin"));
        assert_eq!(
            history[0].record.user_emails,
            Some(vec!["all_users".to_string()])
        );
    }
}
