//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for the server's endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use signflow_server::webhooks::{sign, SIGNATURE_HEADER};
use std::time::Duration;

/// HTTP test client, optionally carrying the admin bearer token
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    token: Option<String>,
}

impl TestClient {
    /// Creates a client without credentials
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            token: None,
        }
    }

    /// Creates a client that authenticates as the admin
    pub fn admin(base_url: String) -> Self {
        Self::with_token(base_url, ADMIN_TOKEN)
    }

    pub fn with_token(base_url: String, token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            ..Self::new(base_url)
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Response {
        builder.send().await.expect("Request failed")
    }

    // ========================================================================
    // Public Endpoints
    // ========================================================================

    pub async fn home(&self) -> Response {
        self.send(self.request(reqwest::Method::GET, "/")).await
    }

    pub async fn metrics(&self) -> Response {
        self.send(self.request(reqwest::Method::GET, "/metrics"))
            .await
    }

    // ========================================================================
    // Webhooks
    // ========================================================================

    /// Posts a raw body signed with the test webhook secret
    pub async fn post_signed_webhook(&self, body: &[u8]) -> Response {
        self.post_webhook_with_signature(body, &sign(WEBHOOK_SECRET, body))
            .await
    }

    pub async fn post_webhook_with_signature(&self, body: &[u8], signature: &str) -> Response {
        self.send(
            self.client
                .post(format!("{}/v1/webhooks/signing", self.base_url))
                .header("content-type", "application/json")
                .header(SIGNATURE_HEADER, signature)
                .body(body.to_vec()),
        )
        .await
    }

    /// Posts a signed provider event about one submitter
    pub async fn post_submitter_event(
        &self,
        event_id: &str,
        event_type: &str,
        external_id: &str,
    ) -> Response {
        let body = json!({
            "event_id": event_id,
            "event_type": event_type,
            "timestamp": "2026-03-01T12:00:00Z",
            "data": { "id": external_id, "submission_id": SUBMISSION_ID }
        });
        self.post_signed_webhook(&serde_json::to_vec(&body).unwrap())
            .await
    }

    // ========================================================================
    // Admin: Contracts
    // ========================================================================

    pub async fn create_contract(&self, title: &str) -> Response {
        self.send(
            self.request(reqwest::Method::POST, "/v1/admin/contracts")
                .json(&json!({ "title": title, "template_ref": TEMPLATE_REF })),
        )
        .await
    }

    pub async fn get_contract(&self, contract_id: &str) -> Response {
        self.send(self.request(
            reqwest::Method::GET,
            &format!("/v1/admin/contracts/{}", contract_id),
        ))
        .await
    }

    pub async fn delete_contract(&self, contract_id: &str) -> Response {
        self.send(self.request(
            reqwest::Method::DELETE,
            &format!("/v1/admin/contracts/{}", contract_id),
        ))
        .await
    }

    pub async fn send_contract(
        &self,
        contract_id: &str,
        ordering_mode: &str,
        submitters: Value,
    ) -> Response {
        self.send(
            self.request(
                reqwest::Method::POST,
                &format!("/v1/admin/contracts/{}/send", contract_id),
            )
            .json(&json!({ "ordering_mode": ordering_mode, "submitters": submitters })),
        )
        .await
    }

    pub async fn reconcile_contract(&self, contract_id: &str) -> Response {
        self.send(self.request(
            reqwest::Method::POST,
            &format!("/v1/admin/contracts/{}/reconcile", contract_id),
        ))
        .await
    }

    // ========================================================================
    // Admin: Jobs
    // ========================================================================

    pub async fn admin_list_jobs(&self) -> Response {
        self.send(self.request(reqwest::Method::GET, "/v1/admin/jobs"))
            .await
    }

    pub async fn admin_get_job(&self, job_id: &str) -> Response {
        self.send(self.request(
            reqwest::Method::GET,
            &format!("/v1/admin/jobs/{}", job_id),
        ))
        .await
    }

    pub async fn admin_trigger_job(&self, job_id: &str) -> Response {
        self.send(self.request(
            reqwest::Method::POST,
            &format!("/v1/admin/jobs/{}/trigger", job_id),
        ))
        .await
    }

    pub async fn admin_get_job_history(&self, job_id: &str) -> Response {
        self.send(self.request(
            reqwest::Method::GET,
            &format!("/v1/admin/jobs/{}/history", job_id),
        ))
        .await
    }

    // ========================================================================
    // Admin: Notifications, Alerts, Pipeline
    // ========================================================================

    pub async fn failed_notifications(&self) -> Response {
        self.send(self.request(reqwest::Method::GET, "/v1/admin/notifications/failed"))
            .await
    }

    pub async fn create_alert_rule(&self, rule: Value) -> Response {
        self.send(
            self.request(reqwest::Method::POST, "/v1/admin/alerts/rules")
                .json(&rule),
        )
        .await
    }

    pub async fn alert_triggers(&self) -> Response {
        self.send(self.request(reqwest::Method::GET, "/v1/admin/alerts/triggers"))
            .await
    }

    pub async fn create_pipeline_entity(&self, entity: Value) -> Response {
        self.send(
            self.request(reqwest::Method::POST, "/v1/admin/pipeline/entities")
                .json(&entity),
        )
        .await
    }

    pub async fn create_pipeline_rule(&self, rule: Value) -> Response {
        self.send(
            self.request(reqwest::Method::POST, "/v1/admin/pipeline/rules")
                .json(&rule),
        )
        .await
    }

    pub async fn list_pipeline_entities(&self) -> Response {
        self.send(self.request(reqwest::Method::GET, "/v1/admin/pipeline/entities"))
            .await
    }
}
