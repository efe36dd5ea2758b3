use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::error::AppError;
use crate::server::AppState;

use super::Caller;

/// Authentication context of a direct call.
///
/// A request without an `Authorization` header yields `auth: None`; the
/// dispatcher decides how to react. A header carrying an invalid token is
/// rejected outright.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub auth: Option<Caller>,
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

impl FromRequestParts<AppState> for CallContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_bearer_token(parts) else {
            return Ok(CallContext { auth: None });
        };

        let claims = state.jwt_validator.validate(token).map_err(|e| {
            tracing::warn!(error = %e, "Rejected bearer token");
            AppError::Unauthenticated("User must be authenticated".to_string())
        })?;

        Ok(CallContext {
            auth: Some(Caller::from(claims)),
        })
    }
}
