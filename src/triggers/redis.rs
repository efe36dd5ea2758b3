use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::config::RedisConfig;
use crate::metrics::TriggerMetrics;
use crate::notification::NotificationDispatcher;
use crate::redis::ReconnectBackoff;

/// Channel announcing new `notification_queue` records
pub const DEFAULT_QUEUE_CHANNEL: &str = "notification_queue:created";

/// Announcement published when a queue record is created.
///
/// Producers send either `{"id": "<record id>"}` or the bare id.
#[derive(Debug, Deserialize)]
pub struct QueueCreatedMessage {
    pub id: String,
}

/// Extract the record id from a pub/sub payload
pub fn parse_record_id(payload: &str) -> Option<String> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('{') {
        return serde_json::from_str::<QueueCreatedMessage>(trimmed)
            .ok()
            .map(|m| m.id)
            .filter(|id| !id.is_empty());
    }

    // A JSON string literal or a plain id
    match serde_json::from_str::<String>(trimmed) {
        Ok(id) if !id.is_empty() => Some(id),
        Ok(_) => None,
        Err(_) => Some(trimmed.to_string()),
    }
}

/// Subscribes to the queue-created channels and drains each announced record.
///
/// Pub/sub only reaches connected subscribers, so every successful
/// subscription is followed by a catch-up sweep over the queue table. A
/// record created while the process was down or reconnecting, or one whose
/// earlier send failed, is drained by that sweep.
pub struct QueueTriggerSubscriber {
    config: RedisConfig,
    dispatcher: Arc<NotificationDispatcher>,
    shutdown: broadcast::Sender<()>,
}

impl QueueTriggerSubscriber {
    pub fn new(config: RedisConfig, dispatcher: Arc<NotificationDispatcher>) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            config,
            dispatcher,
            shutdown,
        }
    }

    /// Get a shutdown signal sender
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Run until a shutdown signal arrives, reconnecting on connection loss
    pub async fn start(&self) -> anyhow::Result<()> {
        let channels = self.channels();
        tracing::info!(channels = ?channels, "Starting queue trigger subscriber");

        let mut backoff = ReconnectBackoff::new(self.config.reconnect.clone());
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            match self.run_subscription_loop(&channels, &mut backoff).await {
                Ok(()) => {
                    tracing::info!("Queue trigger subscriber stopped gracefully");
                    break;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    TriggerMetrics::record_reconnection();
                    tracing::error!(
                        error = %e,
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "Queue trigger subscription error, reconnecting"
                    );

                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            tracing::info!("Shutdown requested while reconnecting");
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        Ok(())
    }

    fn channels(&self) -> Vec<String> {
        if self.config.channels.is_empty() {
            vec![DEFAULT_QUEUE_CHANNEL.to_string()]
        } else {
            self.config.channels.clone()
        }
    }

    async fn run_subscription_loop(
        &self,
        channels: &[String],
        backoff: &mut ReconnectBackoff,
    ) -> anyhow::Result<()> {
        let client = redis::Client::open(self.config.url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;

        for channel in channels {
            if channel.contains('*') || channel.contains('?') || channel.contains('[') {
                pubsub.psubscribe(channel).await?;
                tracing::debug!(pattern = %channel, "Subscribed to pattern");
            } else {
                pubsub.subscribe(channel).await?;
                tracing::debug!(channel = %channel, "Subscribed to channel");
            }
        }

        tracing::info!("Queue trigger subscription established");
        backoff.reset();

        // Announcements published during the sweep wait on the connection until
        // the stream is polled; ids it already drained resolve to AlreadyProcessed.
        self.catch_up().await;

        let mut message_stream = pubsub.on_message();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Received shutdown signal");
                    return Ok(());
                }
                msg = message_stream.next() => {
                    let Some(msg) = msg else {
                        anyhow::bail!("Redis message stream ended");
                    };

                    let channel = msg.get_channel_name().to_string();
                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            TriggerMetrics::record_invalid();
                            tracing::warn!(error = %e, "Failed to get message payload");
                            continue;
                        }
                    };

                    self.handle_message(&channel, &payload).await;
                }
            }
        }
    }

    /// Drain records left in the queue table without a delivered announcement.
    /// Returns how many records were picked up.
    pub async fn catch_up(&self) -> usize {
        match self
            .dispatcher
            .drain_pending(self.config.catch_up_batch_size)
            .await
        {
            Ok(outcomes) => {
                TriggerMetrics::record_catch_up(outcomes.len());
                if !outcomes.is_empty() {
                    tracing::info!(records = outcomes.len(), "Drained waiting queue records");
                }
                outcomes.len()
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to list waiting queue records");
                0
            }
        }
    }

    async fn handle_message(&self, channel: &str, payload: &str) {
        TriggerMetrics::record_received();

        let Some(id) = parse_record_id(payload) else {
            TriggerMetrics::record_invalid();
            tracing::warn!(
                channel = %channel,
                payload = %payload,
                "Queue trigger message carries no record id"
            );
            return;
        };

        let outcome = self.dispatcher.drain_queued(&id).await;

        tracing::debug!(
            channel = %channel,
            record_id = %id,
            outcome = outcome.label(),
            "Processed queue trigger"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_message() {
        assert_eq!(parse_record_id(r#"{"id": "q-123"}"#), Some("q-123".to_string()));
        assert_eq!(
            parse_record_id(r#"{"id": "q-1", "created_at": "2024-01-01T00:00:00Z"}"#),
            Some("q-1".to_string())
        );
    }

    #[test]
    fn test_parse_bare_id() {
        assert_eq!(parse_record_id("q-123\n"), Some("q-123".to_string()));
        assert_eq!(parse_record_id(r#""q-123""#), Some("q-123".to_string()));
    }

    #[test]
    fn test_parse_rejects_empty_and_malformed() {
        assert_eq!(parse_record_id(""), None);
        assert_eq!(parse_record_id("   "), None);
        assert_eq!(parse_record_id(r#"{"id": ""}"#), None);
        assert_eq!(parse_record_id(r#"{"record": "q-1"}"#), None);
        assert_eq!(parse_record_id(r#""""#), None);
    }

    #[test]
    fn test_default_channel() {
        let config = RedisConfig::default();
        assert!(config.channels.is_empty());
        assert_eq!(DEFAULT_QUEUE_CHANNEL, "notification_queue:created");
    }
}
