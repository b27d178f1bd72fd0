//! Authenticity checks for inbound signing-provider webhooks.
//!
//! Accepted proofs, in order of preference:
//! - `X-Signature`: hex HMAC-SHA256 of the raw body under the shared secret,
//!   optionally prefixed with `sha256=`
//! - `X-Webhook-Secret`: the shared secret itself
//!
//! Anything else, including a server with no secret configured, is rejected.

use super::WebhookError;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const SECRET_HEADER: &str = "x-webhook-secret";

pub fn verify_request(
    secret: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), WebhookError> {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return Err(WebhookError::Authentication(
            "no webhook secret configured".into(),
        ));
    };

    if let Some(signature) = headers.get(SIGNATURE_HEADER) {
        let signature = signature
            .to_str()
            .map_err(|_| WebhookError::Authentication("unreadable signature header".into()))?;
        return verify_signature(secret, body, signature);
    }

    if let Some(presented) = headers.get(SECRET_HEADER) {
        if constant_time_eq(presented.as_bytes(), secret.as_bytes()) {
            return Ok(());
        }
        return Err(WebhookError::Authentication("secret mismatch".into()));
    }

    Err(WebhookError::Authentication(
        "missing signature header".into(),
    ))
}

fn verify_signature(secret: &str, body: &[u8], signature: &str) -> Result<(), WebhookError> {
    let hex_digest = signature.trim();
    let hex_digest = hex_digest.strip_prefix("sha256=").unwrap_or(hex_digest);
    let expected = hex::decode(hex_digest)
        .map_err(|_| WebhookError::Authentication("signature is not hex".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::Authentication("unusable webhook secret".into()))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::Authentication("signature mismatch".into()))
}

/// Hex HMAC-SHA256 of `body`, as a provider would put in `X-Signature`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length, so this never fails.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"event_type":"form.completed"}"#;

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_valid_signature_is_accepted() {
        let signature = sign(SECRET, BODY);
        assert!(verify_request(Some(SECRET), &headers(SIGNATURE_HEADER, &signature), BODY).is_ok());
        let prefixed = format!("sha256={}", signature);
        assert!(verify_request(Some(SECRET), &headers(SIGNATURE_HEADER, &prefixed), BODY).is_ok());
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let signature = sign(SECRET, BODY);
        let result = verify_request(
            Some(SECRET),
            &headers(SIGNATURE_HEADER, &signature),
            br#"{"event_type":"form.declined"}"#,
        );
        assert!(matches!(result, Err(WebhookError::Authentication(_))));
    }

    #[test]
    fn test_shared_secret_header() {
        assert!(verify_request(Some(SECRET), &headers(SECRET_HEADER, SECRET), BODY).is_ok());
        assert!(verify_request(Some(SECRET), &headers(SECRET_HEADER, "whsec_tesT"), BODY).is_err());
    }

    #[test]
    fn test_fails_closed() {
        // No proof at all.
        assert!(verify_request(Some(SECRET), &HeaderMap::new(), BODY).is_err());
        // Garbage signature.
        assert!(verify_request(Some(SECRET), &headers(SIGNATURE_HEADER, "zz"), BODY).is_err());
        // No secret configured: even a "valid" signature under an empty key is refused.
        let signature = sign("", BODY);
        assert!(verify_request(None, &headers(SIGNATURE_HEADER, &signature), BODY).is_err());
        assert!(verify_request(Some(""), &headers(SECRET_HEADER, ""), BODY).is_err());
    }
}
