//! In-process stand-ins for the external providers.

use super::constants::SUBMISSION_ID;
use async_trait::async_trait;
use signflow_server::notifications::NotificationProvider;
use signflow_server::provider_error::ProviderError;
use signflow_server::signing::{
    CreatedSubmission, CreatedSubmitter, NewSubmitter, OrderingMode, RemoteSubmitterState,
    RemoteSubmitterStatus, SigningProvider,
};
use std::sync::Mutex;

/// Signing provider that assigns `ext-<email>` ids and reports whatever
/// remote states the test sets.
#[derive(Default)]
pub struct ScriptedSigningProvider {
    remote: Mutex<Vec<RemoteSubmitterStatus>>,
}

impl ScriptedSigningProvider {
    #[allow(dead_code)]
    pub fn set_remote(&self, email: &str, state: RemoteSubmitterState) {
        let mut remote = self.remote.lock().unwrap();
        remote.retain(|r| r.email != email);
        remote.push(RemoteSubmitterStatus {
            external_id: external_id(email),
            email: email.to_string(),
            state,
        });
    }
}

pub fn external_id(email: &str) -> String {
    format!("ext-{}", email)
}

#[async_trait]
impl SigningProvider for ScriptedSigningProvider {
    async fn create_submission(
        &self,
        _template_ref: &str,
        _ordering_mode: OrderingMode,
        submitters: &[NewSubmitter],
    ) -> Result<CreatedSubmission, ProviderError> {
        Ok(CreatedSubmission {
            submission_id: SUBMISSION_ID.to_string(),
            submitters: submitters
                .iter()
                .map(|s| CreatedSubmitter {
                    email: s.email.clone(),
                    external_id: external_id(&s.email),
                    signing_url: Some(format!("https://sign.example.com/s/{}", s.email)),
                })
                .collect(),
        })
    }

    async fn get_status(
        &self,
        _submission_id: &str,
    ) -> Result<Vec<RemoteSubmitterStatus>, ProviderError> {
        Ok(self.remote.lock().unwrap().clone())
    }
}

/// Notification provider that accepts every message and remembers recipients.
#[derive(Default)]
pub struct RecordingNotificationProvider {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotificationProvider {
    #[allow(dead_code)]
    pub fn recipients(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(to, _)| to.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationProvider for RecordingNotificationProvider {
    async fn send(
        &self,
        to_address: &str,
        subject: &str,
        _html_body: &str,
    ) -> Result<String, ProviderError> {
        self.sent
            .lock()
            .unwrap()
            .push((to_address.to_string(), subject.to_string()));
        Ok(format!("msg-{}", to_address))
    }
}
