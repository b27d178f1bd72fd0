//! Provider webhook payloads.
//!
//! The provider posts DocuSeal-style bodies:
//!
//! ```json
//! {
//!   "event_id": "evt_01",
//!   "event_type": "form.completed",
//!   "timestamp": "2024-05-01T10:00:00Z",
//!   "data": { "id": 1042, "submission_id": 77, "email": "ada@example.com" }
//! }
//! ```
//!
//! `data.id` is the provider-side submitter id. `event_id` is optional; when
//! absent, a stable id is derived from the event type, submitter and timestamp
//! so redeliveries of the same event still deduplicate.

use super::WebhookError;
use crate::signing::{SigningEvent, SigningEventKind};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Event types the provider is known to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEventType {
    FormViewed,
    FormStarted,
    FormCompleted,
    FormDeclined,
    FormExpired,
}

impl ProviderEventType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "form.viewed" => Some(ProviderEventType::FormViewed),
            "form.started" => Some(ProviderEventType::FormStarted),
            "form.completed" => Some(ProviderEventType::FormCompleted),
            "form.declined" => Some(ProviderEventType::FormDeclined),
            "form.expired" => Some(ProviderEventType::FormExpired),
            _ => None,
        }
    }

    pub fn kind(&self) -> SigningEventKind {
        match self {
            ProviderEventType::FormViewed | ProviderEventType::FormStarted => {
                SigningEventKind::Viewed
            }
            ProviderEventType::FormCompleted => SigningEventKind::Completed,
            ProviderEventType::FormDeclined => SigningEventKind::Declined,
            ProviderEventType::FormExpired => SigningEventKind::Expired,
        }
    }
}

#[derive(Debug, Clone)]
pub enum WebhookPayload {
    Event(SigningEvent),
    /// Well-formed, but of a type this service does not act on.
    Unrecognized { event_type: String },
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    event_id: Option<String>,
    event_type: String,
    #[serde(default)]
    timestamp: Option<String>,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    id: Value,
    #[serde(default)]
    submission_id: Option<Value>,
}

/// Ids arrive as numbers or strings depending on the provider version.
fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn parse_payload(body: &[u8]) -> Result<WebhookPayload, WebhookError> {
    let raw: RawPayload = serde_json::from_slice(body)
        .map_err(|e| WebhookError::Malformed(format!("invalid payload: {}", e)))?;

    let Some(event_type) = ProviderEventType::parse(&raw.event_type) else {
        return Ok(WebhookPayload::Unrecognized {
            event_type: raw.event_type,
        });
    };

    let submitter_ref = id_to_string(&raw.data.id)
        .ok_or_else(|| WebhookError::Malformed("data.id must be a string or number".into()))?;
    let submission_id = raw.data.submission_id.as_ref().and_then(id_to_string);

    let occurred_at = match raw.timestamp.as_deref() {
        Some(ts) => DateTime::parse_from_rfc3339(ts)
            .map_err(|_| WebhookError::Malformed(format!("invalid timestamp '{}'", ts)))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let event_id = match raw.event_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => derive_event_id(&raw.event_type, &submitter_ref, raw.timestamp.as_deref()),
    };

    Ok(WebhookPayload::Event(SigningEvent {
        event_id,
        submission_id,
        submitter_ref,
        kind: event_type.kind(),
        occurred_at,
    }))
}

fn derive_event_id(event_type: &str, submitter_ref: &str, timestamp: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event_type.as_bytes());
    hasher.update(b"|");
    hasher.update(submitter_ref.as_bytes());
    hasher.update(b"|");
    hasher.update(timestamp.unwrap_or("").as_bytes());
    format!("derived-{}", hex::encode(hasher.finalize()))
}
