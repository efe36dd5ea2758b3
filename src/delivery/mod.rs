//! Push delivery: the hosted messaging API behind a narrow trait.
//!
//! Dispatchers only see [`PushDelivery`]. The production implementation is
//! [`FcmClient`], which talks to the FCM HTTP v1 API using a service account.

mod credentials;
mod fcm;

use async_trait::async_trait;
use thiserror::Error;

use crate::notification::{BatchResponse, MulticastMessage};

pub use credentials::{AccessTokenProvider, ServiceAccountKey, FCM_SCOPE};
pub use fcm::FcmClient;

/// Errors that fail a whole multicast call.
///
/// Per-token rejections are not errors; they are counted in
/// [`BatchResponse::failure_count`].
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Invalid credentials: {0}")]
    Credentials(String),

    #[error("Delivery unavailable: {0}")]
    Unavailable(String),
}

/// Sends one multicast message and reports aggregate counts
#[async_trait]
pub trait PushDelivery: Send + Sync {
    async fn send_multicast(&self, message: &MulticastMessage) -> Result<BatchResponse, DeliveryError>;
}
