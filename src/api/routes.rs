use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;
use crate::triggers::{notification_history, send_notification_to_all, send_notification_to_users};

use super::health::{health, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Direct-call dispatchers
        .nest(
            "/api/v1",
            Router::new()
                .route("/notifications/send-to-users", post(send_notification_to_users))
                .route("/notifications/send-to-all", post(send_notification_to_all))
                .route("/notifications/history", get(notification_history)),
        )
}
