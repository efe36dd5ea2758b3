use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::config::FcmConfig;
use crate::metrics::DeliveryMetrics;
use crate::notification::{BatchResponse, MulticastMessage, TokenMessage};

use super::{AccessTokenProvider, DeliveryError, PushDelivery, ServiceAccountKey};

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: TokenMessage<'a>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    validate_only: bool,
}

/// Outcome of a single per-token request
enum TokenOutcome {
    Sent,
    Rejected,
    Transport(reqwest::Error),
}

/// FCM HTTP v1 client.
///
/// A multicast is fanned out as one `messages:send` request per token with
/// bounded concurrency. Rejected tokens are counted as failures. The call as
/// a whole fails only when no access token can be obtained or when every
/// request failed at the transport level.
pub struct FcmClient {
    http: reqwest::Client,
    tokens: AccessTokenProvider,
    send_url: String,
    max_concurrent_requests: usize,
    request_timeout: Duration,
    validate_only: bool,
}

impl FcmClient {
    /// Create a client from configuration, loading the service account key
    pub fn new(config: &FcmConfig) -> Result<Self, DeliveryError> {
        let key = ServiceAccountKey::from_file(&config.credentials_file)?;
        Self::with_key(config, key)
    }

    pub fn with_key(config: &FcmConfig, key: ServiceAccountKey) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        let tokens = AccessTokenProvider::new(key, http.clone())?;

        tracing::info!(
            project_id = %config.project_id,
            client_email = %tokens.client_email(),
            validate_only = config.validate_only,
            "FCM client initialized"
        );

        Ok(Self {
            http,
            tokens,
            send_url: send_url(&config.endpoint, &config.project_id),
            max_concurrent_requests: config.max_concurrent_requests.max(1),
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
            validate_only: config.validate_only,
        })
    }

    async fn send_one(&self, access_token: &str, message: TokenMessage<'_>) -> TokenOutcome {
        let token = message.token;
        let request = SendRequest {
            message,
            validate_only: self.validate_only,
        };

        let response = match self
            .http
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&request)
            .timeout(self.request_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return TokenOutcome::Transport(e),
        };

        if response.status().is_success() {
            return TokenOutcome::Sent;
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(
            token = %token,
            status = %status.as_u16(),
            error = %body,
            "FCM rejected message"
        );
        TokenOutcome::Rejected
    }
}

#[async_trait]
impl PushDelivery for FcmClient {
    #[tracing::instrument(
        name = "fcm.send_multicast",
        skip(self, message),
        fields(token_count = message.token_count())
    )]
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<BatchResponse, DeliveryError> {
        let access_token = self.tokens.access_token().await?;
        let started = Instant::now();

        let requests: Vec<_> = message
            .messages()
            .map(|m| self.send_one(&access_token, m))
            .collect();
        let outcomes: Vec<TokenOutcome> = stream::iter(requests)
            .buffer_unordered(self.max_concurrent_requests)
            .collect()
            .await;

        DeliveryMetrics::observe_latency(started.elapsed());

        let mut sent = 0;
        let mut rejected = 0;
        let mut last_transport_error = None;
        let mut transport_failures = 0;

        for outcome in outcomes {
            match outcome {
                TokenOutcome::Sent => sent += 1,
                TokenOutcome::Rejected => rejected += 1,
                TokenOutcome::Transport(e) => {
                    transport_failures += 1;
                    last_transport_error = Some(e);
                }
            }
        }

        if sent == 0 && rejected == 0 {
            if let Some(e) = last_transport_error {
                return Err(DeliveryError::Http(e));
            }
        }

        if let Some(e) = last_transport_error {
            tracing::warn!(
                failures = transport_failures,
                error = %e,
                "Some FCM requests failed at the transport level"
            );
        }

        Ok(BatchResponse::new(sent, rejected + transport_failures))
    }
}

fn send_url(endpoint: &str, project_id: &str) -> String {
    format!(
        "{}/v1/projects/{}/messages:send",
        endpoint.trim_end_matches('/'),
        project_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::MessageOptions;

    #[test]
    fn test_send_url() {
        assert_eq!(
            send_url("https://fcm.googleapis.com/", "regala-app"),
            "https://fcm.googleapis.com/v1/projects/regala-app/messages:send"
        );
    }

    #[test]
    fn test_request_body_omits_validate_only_by_default() {
        let options = MessageOptions::default();
        let message = MulticastMessage::new(
            options.resolve(Some("Hi"), Some("There")),
            None,
            vec!["tok1".to_string()],
            &options,
        )
        .unwrap();

        let request = SendRequest {
            message: message.messages().next().unwrap(),
            validate_only: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["message"]["token"], "tok1");
        assert!(value.get("validate_only").is_none());

        let request = SendRequest {
            message: message.messages().next().unwrap(),
            validate_only: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["validate_only"], true);
    }
}
