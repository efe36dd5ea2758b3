//! Direct-call entry points.
//!
//! Authentication is resolved from the `Authorization` header before the body
//! is looked at, so an anonymous caller always gets `unauthenticated` even
//! when the body is malformed.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use serde::Deserialize;

use crate::auth::CallContext;
use crate::error::{AppError, Result};
use crate::notification::{
    CallableResponse, NotificationDispatcher, SendToAllRequest, SendToUsersRequest,
    StoredHistoryRecord,
};
use crate::server::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 20;

fn parse_body<T>(ctx: &CallContext, body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    NotificationDispatcher::authorize(ctx.auth.as_ref())?;

    body.map(|Json(request)| request).map_err(|rejection| {
        AppError::InvalidArgument(format!("Invalid request body: {}", rejection.body_text()))
    })
}

/// Send a notification to the devices of the given users
#[tracing::instrument(name = "http.send_to_users", skip_all)]
pub async fn send_notification_to_users(
    State(state): State<AppState>,
    ctx: CallContext,
    body: std::result::Result<Json<SendToUsersRequest>, JsonRejection>,
) -> Result<Json<CallableResponse>> {
    let request = parse_body(&ctx, body)?;
    let response = state
        .dispatcher
        .send_to_users(ctx.auth.as_ref(), request)
        .await?;
    Ok(Json(response))
}

/// Send a notification to every registered device
#[tracing::instrument(name = "http.send_to_all", skip_all)]
pub async fn send_notification_to_all(
    State(state): State<AppState>,
    ctx: CallContext,
    body: std::result::Result<Json<SendToAllRequest>, JsonRejection>,
) -> Result<Json<CallableResponse>> {
    let request = parse_body(&ctx, body)?;
    let response = state
        .dispatcher
        .send_to_all(ctx.auth.as_ref(), request)
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Recent notification history, newest first
pub async fn notification_history(
    State(state): State<AppState>,
    ctx: CallContext,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<StoredHistoryRecord>>> {
    let records = state
        .dispatcher
        .recent_history(
            ctx.auth.as_ref(),
            query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        )
        .await?;
    Ok(Json(records))
}
