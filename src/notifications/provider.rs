//! Client for the external notification (email) provider.

use crate::provider_error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// Returns the provider's message id.
    async fn send(
        &self,
        to_address: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<String, ProviderError>;
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Deserialize)]
struct SendEmailResponse {
    id: String,
}

/// Resend-style HTTP email API with bearer authentication.
pub struct HttpNotificationProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    from_address: String,
}

impl HttpNotificationProvider {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        from_address: String,
        timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            from_address,
        })
    }
}

#[async_trait]
impl NotificationProvider for HttpNotificationProvider {
    async fn send(
        &self,
        to_address: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<String, ProviderError> {
        let mut request = self
            .client
            .post(format!("{}/emails", self.base_url))
            .json(&SendEmailRequest {
                from: &self.from_address,
                to: [to_address],
                subject,
                html: html_body,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }
        let sent: SendEmailResponse = response.json().await?;
        Ok(sent.id)
    }
}

/// Provider used when no email API is configured: every send fails
/// permanently so the attempt is surfaced to operators instead of lost.
pub struct DisabledNotificationProvider;

#[async_trait]
impl NotificationProvider for DisabledNotificationProvider {
    async fn send(&self, _to: &str, _subject: &str, _html: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Permanent(
            "notification provider is not configured".to_string(),
        ))
    }
}
