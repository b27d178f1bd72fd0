//! Per-request logging and HTTP metrics.
//!
//! Every request is timed and counted. What gets logged depends on the
//! configured [`RequestsLoggingLevel`]; credentials and webhook secrets are
//! masked at every level.

use super::super::state::ServerState;
use crate::server::metrics::{categorize_endpoint, record_http_request};
use crate::webhooks::{SECRET_HEADER, SIGNATURE_HEADER};
use axum::extract::State;
use axum::{
    body::{Body, Bytes},
    http::{
        header::{AUTHORIZATION, CONTENT_LENGTH, COOKIE},
        HeaderMap, Request, Response, StatusCode,
    },
    middleware::Next,
    response::IntoResponse,
};
use std::time::Instant;
use tracing::{error, info};

#[derive(PartialEq, PartialOrd, Clone, Debug, Default, clap::ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    #[default]
    Path,
    Headers,
    Body,
}

impl std::fmt::Display for RequestsLoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Bodies at or above this size are summarized instead of printed.
const BODY_LOG_LIMIT: usize = 1024;

fn is_masked(name: &str) -> bool {
    name == AUTHORIZATION.as_str()
        || name == COOKIE.as_str()
        || name.eq_ignore_ascii_case(SIGNATURE_HEADER)
        || name.eq_ignore_ascii_case(SECRET_HEADER)
}

fn log_headers(direction: &str, headers: &HeaderMap) {
    for (name, value) in headers {
        if is_masked(name.as_str()) {
            info!("  {} header {}: <masked>", direction, name);
        } else {
            info!("  {} header {}: {:?}", direction, name, value);
        }
    }
}

/// Buffers a body small enough to print, logs it and hands back an
/// equivalent body. Bodies of unknown or excessive length pass through
/// untouched.
async fn log_body(direction: &str, headers: &HeaderMap, body: Body) -> Result<Body, axum::Error> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    match declared {
        None => {
            info!("  {} body: no usable content-length, not buffered", direction);
            Ok(body)
        }
        Some(len) if len >= BODY_LOG_LIMIT => {
            info!("  {} body: {} bytes, not printed", direction, len);
            Ok(body)
        }
        Some(len) => {
            let bytes: Bytes = axum::body::to_bytes(body, len).await?;
            info!("  {} body: {}", direction, String::from_utf8_lossy(&bytes));
            Ok(Body::from(bytes))
        }
    }
}

pub async fn log_requests(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> impl IntoResponse {
    let level = state.config.requests_logging_level.clone();
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    if level >= RequestsLoggingLevel::Path {
        info!("--> {} {}", method, request.uri());
    }

    let (parts, body) = request.into_parts();
    if level >= RequestsLoggingLevel::Headers {
        log_headers("request", &parts.headers);
    }
    let body = if level >= RequestsLoggingLevel::Body {
        match log_body("request", &parts.headers, body).await {
            Ok(body) => body,
            Err(e) => {
                error!("Could not buffer request body of {} {}: {}", method, path, e);
                return StatusCode::BAD_REQUEST.into_response();
            }
        }
    } else {
        body
    };

    let response = next.run(Request::from_parts(parts, body)).await;
    let status = response.status().as_u16();
    let elapsed = start.elapsed();

    if level >= RequestsLoggingLevel::Path {
        info!(
            "<-- {} {} {} in {}ms",
            method,
            path,
            status,
            elapsed.as_millis()
        );
    }
    record_http_request(&method, &categorize_endpoint(&path), status, elapsed);

    let (parts, body) = response.into_parts();
    if level >= RequestsLoggingLevel::Headers {
        log_headers("response", &parts.headers);
    }
    if level < RequestsLoggingLevel::Body {
        return Response::from_parts(parts, body);
    }
    match log_body("response", &parts.headers, body).await {
        Ok(body) => Response::from_parts(parts, body),
        Err(e) => {
            error!("Could not buffer response body of {} {}: {}", method, path, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
