//! `POST /v1/webhooks/signing`: inbound signing-provider events.
//!
//! A 2xx tells the provider to stop redelivering, so it is only returned once
//! the event is durably recorded (applied, a duplicate, or deliberately
//! ignored). Storage failures answer 500 and the provider retries.

use super::metrics::record_webhook_outcome;
use super::state::ServerState;
use crate::signing::EventOutcome;
use crate::webhooks::{parse_payload, verify_request, WebhookError, WebhookPayload};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::{debug, error, info, warn};

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::Authentication(_) => StatusCode::UNAUTHORIZED,
            WebhookError::Malformed(_) => StatusCode::BAD_REQUEST,
            WebhookError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn outcome_label(err: &WebhookError) -> &'static str {
    match err {
        WebhookError::Authentication(_) => "unauthorized",
        WebhookError::Malformed(_) => "malformed",
        WebhookError::PayloadTooLarge(_) => "too_large",
    }
}

fn reject(err: WebhookError) -> Response {
    record_webhook_outcome(outcome_label(&err));
    err.into_response()
}

async fn receive_signing_webhook(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(manager) = state.workflow.clone() else {
        record_webhook_outcome("unavailable");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "signing workflow is not configured" })),
        )
            .into_response();
    };

    let limit = state.config.webhook_max_body_bytes;
    let body = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(_) => return reject(WebhookError::PayloadTooLarge(limit)),
    };

    if let Err(err) = verify_request(state.config.webhook_secret.as_deref(), &headers, &body) {
        warn!("Rejected signing webhook: {}", err);
        return reject(err);
    }

    let event = match parse_payload(&body) {
        Ok(WebhookPayload::Event(event)) => event,
        Ok(WebhookPayload::Unrecognized { event_type }) => {
            warn!("Ignoring signing webhook of unrecognized type {}", event_type);
            record_webhook_outcome("ignored");
            return (StatusCode::OK, Json(json!({ "outcome": "ignored" }))).into_response();
        }
        Err(err) => {
            warn!("Rejected signing webhook: {}", err);
            return reject(err);
        }
    };

    match manager.record_event(&event) {
        Ok(outcome) => {
            if outcome == EventOutcome::Applied {
                info!(
                    "Applied {} event {} for submitter {}",
                    event.kind.as_str(),
                    event.event_id,
                    event.submitter_ref
                );
            } else {
                debug!(
                    "Signing event {} recorded as {}",
                    event.event_id,
                    outcome.as_str()
                );
            }
            record_webhook_outcome(outcome.as_str());
            (
                StatusCode::OK,
                Json(json!({ "outcome": outcome, "event_id": event.event_id })),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to record signing event {}: {}", event.event_id, e);
            record_webhook_outcome("error");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn make_webhook_routes(state: ServerState) -> Router {
    Router::new()
        .route("/signing", post(receive_signing_webhook))
        .with_state(state)
}
