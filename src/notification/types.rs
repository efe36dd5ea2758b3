use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Arbitrary key-value payload forwarded as the message `data` block
pub type NotificationData = HashMap<String, String>;

/// A pending send request waiting in the notification queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueuedNotification {
    /// Record id within the queue collection
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub data: Option<NotificationData>,
    /// Recipient device tokens (may be absent on malformed records)
    #[serde(default)]
    pub tokens: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl QueuedNotification {
    /// Tokens to deliver to, empty when the field is missing
    pub fn tokens(&self) -> &[String] {
        self.tokens.as_deref().unwrap_or_default()
    }

    pub fn has_tokens(&self) -> bool {
        !self.tokens().is_empty()
    }
}

/// Binding of a user email to a device token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTokenRecord {
    pub email: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl UserTokenRecord {
    pub fn new(email: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            token: Some(token.into()),
        }
    }

    /// The device token, if present and non-empty
    pub fn valid_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Collect the usable device tokens from a set of lookup records
pub fn collect_tokens(records: &[UserTokenRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.valid_token())
        .map(str::to_string)
        .collect()
}

/// Request body of the targeted dispatcher.
///
/// Fields of the wrong JSON type read as absent so that validation, not
/// body parsing, decides the error reported to the caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendToUsersRequest {
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub user_emails: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub body: Option<String>,
    #[serde(default)]
    pub data: Option<NotificationData>,
}

/// Request body of the broadcast dispatcher
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendToAllRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub body: Option<String>,
    #[serde(default)]
    pub data: Option<NotificationData>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => None,
    })
}

/// Structured result returned to direct callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallableResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_count: Option<usize>,
}

impl CallableResponse {
    pub fn no_recipients(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            success_count: None,
            failure_count: None,
        }
    }

    pub fn sent(response: &BatchResponse) -> Self {
        Self {
            success: true,
            message: format!("Notification sent to {} users", response.success_count),
            success_count: Some(response.success_count),
            failure_count: Some(response.failure_count),
        }
    }
}

/// Aggregate outcome of one multicast send
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub success_count: usize,
    pub failure_count: usize,
}

impl BatchResponse {
    pub fn new(success_count: usize, failure_count: usize) -> Self {
        Self {
            success_count,
            failure_count,
        }
    }

    pub fn total(&self) -> usize {
        self.success_count + self.failure_count
    }
}

/// Audit entry written once per dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationHistoryRecord {
    pub title: Option<String>,
    pub body: Option<String>,
    pub data: Option<NotificationData>,
    pub tokens_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_emails: Option<Vec<String>>,
}

impl NotificationHistoryRecord {
    pub fn new(
        title: Option<String>,
        body: Option<String>,
        data: Option<NotificationData>,
        tokens_count: usize,
        response: &BatchResponse,
    ) -> Self {
        Self {
            title,
            body,
            data,
            tokens_count,
            success_count: response.success_count,
            failure_count: response.failure_count,
            sent_by: None,
            user_emails: None,
        }
    }

    /// Tag the entry with the caller and the recipients they addressed
    pub fn sent_by(mut self, uid: impl Into<String>, user_emails: Vec<String>) -> Self {
        self.sent_by = Some(uid.into());
        self.user_emails = Some(user_emails);
        self
    }
}

/// History entry as persisted, with its store-assigned id and timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredHistoryRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub record: NotificationHistoryRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_queued_notification_missing_tokens() {
        let record: QueuedNotification =
            serde_json::from_value(json!({"id": "q1", "title": "Hi"})).unwrap();
        assert!(record.tokens.is_none());
        assert!(!record.has_tokens());
        assert!(record.tokens().is_empty());
    }

    #[test]
    fn test_collect_tokens_skips_empty_and_missing() {
        let records = vec![
            UserTokenRecord::new("a@x.com", "tok-a"),
            UserTokenRecord::new("b@x.com", ""),
            UserTokenRecord {
                email: "c@x.com".to_string(),
                token: None,
            },
        ];

        assert_eq!(collect_tokens(&records), vec!["tok-a".to_string()]);
    }

    #[test]
    fn test_callable_response_shape() {
        let ok = CallableResponse::sent(&BatchResponse::new(3, 1));
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(
            value,
            json!({
                "success": true,
                "message": "Notification sent to 3 users",
                "successCount": 3,
                "failureCount": 1
            })
        );

        let empty = CallableResponse::no_recipients("No users found with valid tokens");
        let value = serde_json::to_value(&empty).unwrap();
        assert_eq!(
            value,
            json!({"success": false, "message": "No users found with valid tokens"})
        );
    }

    #[test]
    fn test_send_to_users_request_camel_case() {
        let request: SendToUsersRequest = serde_json::from_value(json!({
            "userEmails": ["a@x.com"],
            "title": "Hi",
            "body": "There",
            "data": {"screen": "home"}
        }))
        .unwrap();

        assert_eq!(request.user_emails, Some(vec!["a@x.com".to_string()]));
        assert_eq!(request.data.unwrap()["screen"], "home");
    }

    #[test]
    fn test_wrong_types_read_as_absent() {
        let request: SendToUsersRequest = serde_json::from_value(json!({
            "userEmails": "a@x.com",
            "title": 5,
            "body": "There"
        }))
        .unwrap();

        assert!(request.user_emails.is_none());
        assert!(request.title.is_none());
        assert_eq!(request.body.as_deref(), Some("There"));

        let request: SendToUsersRequest =
            serde_json::from_value(json!({"userEmails": ["a@x.com", 7]})).unwrap();
        assert!(request.user_emails.is_none());
    }

    #[test]
    fn test_history_record_tagging() {
        let record = NotificationHistoryRecord::new(
            Some("Hi".into()),
            Some("There".into()),
            None,
            2,
            &BatchResponse::new(2, 0),
        )
        .sent_by("uid-1", vec!["all_users".to_string()]);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["tokensCount"], 2);
        assert_eq!(value["sentBy"], "uid-1");
        assert_eq!(value["userEmails"], json!(["all_users"]));
    }
}
