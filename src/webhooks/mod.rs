//! Inbound signing-provider webhooks: authentication and payload parsing.
//! The HTTP route lives in `server::webhook_routes`.

mod auth;
mod payload;

pub(crate) use auth::constant_time_eq;
pub use auth::{sign, verify_request, SECRET_HEADER, SIGNATURE_HEADER};
pub use payload::{parse_payload, ProviderEventType, WebhookPayload};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook authentication failed: {0}")]
    Authentication(String),
    #[error("malformed webhook payload: {0}")]
    Malformed(String),
    #[error("webhook payload exceeds {0} bytes")]
    PayloadTooLarge(usize),
}
