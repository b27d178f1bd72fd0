//! Client for the external signing provider.
//!
//! The HTTP implementation speaks a DocuSeal-style API: submissions are
//! created from a template with an ordered list of submitters and can be
//! queried later for per-submitter status.

use super::models::{NewSubmitter, OrderingMode, SigningEventKind};
use crate::provider_error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CreatedSubmission {
    pub submission_id: String,
    pub submitters: Vec<CreatedSubmitter>,
}

#[derive(Debug, Clone)]
pub struct CreatedSubmitter {
    pub email: String,
    pub external_id: String,
    pub signing_url: Option<String>,
}

/// Submitter state as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteSubmitterState {
    Awaiting,
    Sent,
    Opened,
    Completed,
    Declined,
    Expired,
}

impl RemoteSubmitterState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "awaiting" | "pending" => Some(RemoteSubmitterState::Awaiting),
            "sent" => Some(RemoteSubmitterState::Sent),
            "opened" | "viewed" | "started" => Some(RemoteSubmitterState::Opened),
            "completed" => Some(RemoteSubmitterState::Completed),
            "declined" => Some(RemoteSubmitterState::Declined),
            "expired" => Some(RemoteSubmitterState::Expired),
            _ => None,
        }
    }

    /// The event a webhook would have delivered for this state, if any.
    pub fn as_event_kind(&self) -> Option<SigningEventKind> {
        match self {
            RemoteSubmitterState::Awaiting | RemoteSubmitterState::Sent => None,
            RemoteSubmitterState::Opened => Some(SigningEventKind::Viewed),
            RemoteSubmitterState::Completed => Some(SigningEventKind::Completed),
            RemoteSubmitterState::Declined => Some(SigningEventKind::Declined),
            RemoteSubmitterState::Expired => Some(SigningEventKind::Expired),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteSubmitterStatus {
    pub external_id: String,
    pub email: String,
    pub state: RemoteSubmitterState,
}

#[async_trait]
pub trait SigningProvider: Send + Sync {
    async fn create_submission(
        &self,
        template_ref: &str,
        ordering_mode: OrderingMode,
        submitters: &[NewSubmitter],
    ) -> Result<CreatedSubmission, ProviderError>;

    async fn get_status(
        &self,
        submission_id: &str,
    ) -> Result<Vec<RemoteSubmitterStatus>, ProviderError>;
}

#[derive(Serialize)]
struct CreateSubmissionRequest<'a> {
    template_id: &'a str,
    send_email: bool,
    order: &'static str,
    submitters: Vec<SubmitterPayload<'a>>,
}

#[derive(Serialize)]
struct SubmitterPayload<'a> {
    name: &'a str,
    email: &'a str,
    role: &'a str,
}

#[derive(Deserialize)]
struct SubmitterResponse {
    id: serde_json::Value,
    #[serde(default)]
    submission_id: Option<serde_json::Value>,
    email: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    embed_src: Option<String>,
}

#[derive(Deserialize)]
struct SubmissionResponse {
    submitters: Vec<SubmitterResponse>,
}

/// Provider ids may come back as numbers or strings.
fn id_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct HttpSigningProvider {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    signing_url_base: Option<String>,
}

impl HttpSigningProvider {
    pub fn new(
        base_url: String,
        api_token: Option<String>,
        signing_url_base: Option<String>,
        timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            signing_url_base,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_token {
            Some(token) => builder.header("X-Auth-Token", token),
            None => builder,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status(status, &body))
    }
}

#[async_trait]
impl SigningProvider for HttpSigningProvider {
    async fn create_submission(
        &self,
        template_ref: &str,
        ordering_mode: OrderingMode,
        submitters: &[NewSubmitter],
    ) -> Result<CreatedSubmission, ProviderError> {
        let body = CreateSubmissionRequest {
            template_id: template_ref,
            // Invitations are sent by our own notification dispatcher.
            send_email: false,
            order: match ordering_mode {
                OrderingMode::Sequential => "preserved",
                OrderingMode::Parallel => "random",
            },
            submitters: submitters
                .iter()
                .map(|s| SubmitterPayload {
                    name: &s.name,
                    email: &s.email,
                    role: &s.role,
                })
                .collect(),
        };

        let response = self
            .request(reqwest::Method::POST, "/submissions")
            .json(&body)
            .send()
            .await?;
        let created: Vec<SubmitterResponse> = Self::check(response).await?.json().await?;

        let submission_id = created
            .iter()
            .find_map(|s| s.submission_id.as_ref().map(id_to_string))
            .ok_or_else(|| {
                ProviderError::Permanent("submission response without submission_id".into())
            })?;

        let submitters = created
            .into_iter()
            .map(|s| CreatedSubmitter {
                signing_url: s.embed_src.or_else(|| {
                    self.signing_url_base
                        .as_ref()
                        .map(|base| format!("{}{}", base, id_to_string(&s.id)))
                }),
                external_id: id_to_string(&s.id),
                email: s.email,
            })
            .collect();

        Ok(CreatedSubmission {
            submission_id,
            submitters,
        })
    }

    async fn get_status(
        &self,
        submission_id: &str,
    ) -> Result<Vec<RemoteSubmitterStatus>, ProviderError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/submissions/{}", submission_id),
            )
            .send()
            .await?;
        let submission: SubmissionResponse = Self::check(response).await?.json().await?;

        Ok(submission
            .submitters
            .into_iter()
            .filter_map(|s| {
                let state = s
                    .status
                    .as_deref()
                    .and_then(RemoteSubmitterState::parse)?;
                Some(RemoteSubmitterStatus {
                    external_id: id_to_string(&s.id),
                    email: s.email,
                    state,
                })
            })
            .collect())
    }
}
