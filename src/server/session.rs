use super::state::ServerState;
use crate::webhooks::constant_time_eq;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::IntoResponse,
};
use tracing::debug;

/// Proof that the request carried the configured admin bearer token.
#[derive(Debug)]
pub struct AdminSession;

pub enum SessionExtractionError {
    Unauthenticated,
    AccessDenied,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionExtractionError::Unauthenticated => StatusCode::UNAUTHORIZED.into_response(),
            SessionExtractionError::AccessDenied => StatusCode::FORBIDDEN.into_response(),
        }
    }
}

fn extract_bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?;
    Some(token.trim().to_string())
}

impl FromRequestParts<ServerState> for AdminSession {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = ctx.config.admin_token.as_deref().filter(|t| !t.is_empty()) else {
            debug!("Admin request rejected: no admin token configured");
            return Err(SessionExtractionError::AccessDenied);
        };
        let Some(presented) = extract_bearer_token(parts) else {
            debug!("Admin request without bearer token");
            return Err(SessionExtractionError::Unauthenticated);
        };
        if constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
            Ok(AdminSession)
        } else {
            debug!("Admin request with wrong bearer token");
            Err(SessionExtractionError::AccessDenied)
        }
    }
}
