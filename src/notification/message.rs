//! Multicast payload shaping.
//!
//! Every dispatcher hands the delivery client a [`MulticastMessage`]: the
//! notification block, the data map, the recipient tokens and the platform
//! delivery hints. The hints and the fallback title/body come from
//! [`MessageOptions`], resolved once from configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DispatchConfig;

use super::NotificationData;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("A multicast message needs at least one token")]
    NoTokens,
}

/// Defaults and platform hints applied to every outgoing message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageOptions {
    pub default_title: String,
    pub default_body: String,
    pub android_channel_id: String,
    pub apns_sound: String,
    pub apns_badge: u32,
}

impl MessageOptions {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            default_title: config.default_title.clone(),
            default_body: config.default_body.clone(),
            android_channel_id: config.android_channel_id.clone(),
            apns_sound: config.apns_sound.clone(),
            apns_badge: config.apns_badge,
        }
    }

    /// Resolve title and body, falling back to the defaults when unset or empty
    pub fn resolve(&self, title: Option<&str>, body: Option<&str>) -> MessageNotification {
        let pick = |value: Option<&str>, fallback: &str| {
            value
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };

        MessageNotification {
            title: pick(title, &self.default_title),
            body: pick(body, &self.default_body),
        }
    }
}

impl Default for MessageOptions {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageNotification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AndroidPriority {
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AndroidNotificationPriority {
    PriorityDefault,
    PriorityHigh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AndroidNotification {
    pub channel_id: String,
    pub notification_priority: AndroidNotificationPriority,
    pub default_sound: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AndroidConfig {
    pub priority: AndroidPriority,
    pub notification: AndroidNotification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aps {
    pub sound: String,
    pub badge: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApnsConfig {
    pub payload: ApnsPayload,
}

/// The payload handed to the delivery API, addressed to many tokens at once
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MulticastMessage {
    pub notification: MessageNotification,
    pub data: NotificationData,
    pub tokens: Vec<String>,
    pub android: AndroidConfig,
    pub apns: ApnsConfig,
}

impl MulticastMessage {
    /// Build a message for `tokens`. Rejects an empty token list.
    pub fn new(
        notification: MessageNotification,
        data: Option<NotificationData>,
        tokens: Vec<String>,
        options: &MessageOptions,
    ) -> Result<Self, MessageError> {
        if tokens.is_empty() {
            return Err(MessageError::NoTokens);
        }

        Ok(Self {
            notification,
            data: data.unwrap_or_default(),
            tokens,
            android: AndroidConfig {
                priority: AndroidPriority::High,
                notification: AndroidNotification {
                    channel_id: options.android_channel_id.clone(),
                    notification_priority: AndroidNotificationPriority::PriorityHigh,
                    default_sound: true,
                },
            },
            apns: ApnsConfig {
                payload: ApnsPayload {
                    aps: Aps {
                        sound: options.apns_sound.clone(),
                        badge: options.apns_badge,
                    },
                },
            },
        })
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Split into the per-token messages sent over the wire
    pub fn messages(&self) -> impl Iterator<Item = TokenMessage<'_>> {
        self.tokens.iter().map(move |token| TokenMessage {
            token,
            notification: &self.notification,
            data: &self.data,
            android: &self.android,
            apns: &self.apns,
        })
    }
}

/// A single-recipient view of a [`MulticastMessage`]
#[derive(Debug, Clone, Serialize)]
pub struct TokenMessage<'a> {
    pub token: &'a str,
    pub notification: &'a MessageNotification,
    #[serde(skip_serializing_if = "is_empty_data")]
    pub data: &'a NotificationData,
    pub android: &'a AndroidConfig,
    pub apns: &'a ApnsConfig,
}

fn is_empty_data(data: &&NotificationData) -> bool {
    data.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_resolve_uses_defaults() {
        let options = MessageOptions::default();

        let resolved = options.resolve(None, Some(""));
        assert_eq!(resolved.title, "Regala e3dady");
        assert_eq!(resolved.body, "You have a new notification");

        let resolved = options.resolve(Some("Sale"), Some("50% off"));
        assert_eq!(resolved.title, "Sale");
        assert_eq!(resolved.body, "50% off");
    }

    #[test]
    fn test_empty_tokens_rejected() {
        let options = MessageOptions::default();
        let result = MulticastMessage::new(options.resolve(None, None), None, vec![], &options);
        assert_eq!(result.unwrap_err(), MessageError::NoTokens);
    }

    #[test]
    fn test_platform_hints() {
        let options = MessageOptions::default();
        let message = MulticastMessage::new(
            options.resolve(Some("Hi"), Some("There")),
            None,
            tokens(&["tok1"]),
            &options,
        )
        .unwrap();

        let wire = serde_json::to_value(message.messages().next().unwrap()).unwrap();
        assert_eq!(
            wire,
            json!({
                "token": "tok1",
                "notification": {"title": "Hi", "body": "There"},
                "android": {
                    "priority": "HIGH",
                    "notification": {
                        "channel_id": "high_importance_channel",
                        "notification_priority": "PRIORITY_HIGH",
                        "default_sound": true
                    }
                },
                "apns": {"payload": {"aps": {"sound": "default", "badge": 1}}}
            })
        );
    }

    #[test]
    fn test_messages_fan_out_per_token() {
        let options = MessageOptions::default();
        let mut data = NotificationData::new();
        data.insert("screen".to_string(), "offers".to_string());

        let message = MulticastMessage::new(
            options.resolve(Some("Sale"), None),
            Some(data),
            tokens(&["tok1", "tok2"]),
            &options,
        )
        .unwrap();

        let sent: Vec<&str> = message.messages().map(|m| m.token).collect();
        assert_eq!(sent, vec!["tok1", "tok2"]);
        assert!(message.messages().all(|m| m.data["screen"] == "offers"));
    }
}
