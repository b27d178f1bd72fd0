//! Shared constants for end-to-end tests
//!
//! When credentials or timeouts change, update only this file.

// ============================================================================
// Credentials
// ============================================================================

/// Bearer token accepted by the admin API of every test server
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Shared secret for signing-provider webhooks
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Template every test contract is created from
pub const TEMPLATE_REF: &str = "tpl-nda";

/// Submission id handed out by the scripted signing provider
pub const SUBMISSION_ID: &str = "subm-e2e";

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Poll interval when waiting for server readiness (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Timeout for HTTP requests in tests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
