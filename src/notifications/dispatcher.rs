//! Notification dispatcher.
//!
//! `dispatch` records a PENDING attempt and hands delivery to a tracked task;
//! callers never wait for the provider. Delivery retries transient failures
//! with exponential backoff and marks the attempt FAILED_PERMANENT once the
//! error is permanent or the attempt budget is spent.

use super::models::{NotificationAttempt, NotificationStatus, NotificationTarget};
use super::provider::NotificationProvider;
use super::retry_policy::RetryPolicy;
use super::store::NotificationStore;
use super::template::{RenderedMessage, TemplateContext};
use crate::server::metrics::{
    notification_delivery_finished, notification_delivery_started, record_notification_outcome,
};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct NotificationDispatcher {
    provider: Arc<dyn NotificationProvider>,
    store: Arc<dyn NotificationStore>,
    policy: RetryPolicy,
    tracker: TaskTracker,
}

impl NotificationDispatcher {
    pub fn new(
        provider: Arc<dyn NotificationProvider>,
        store: Arc<dyn NotificationStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            store,
            policy,
            tracker: TaskTracker::new(),
        }
    }

    /// Persist a PENDING attempt and spawn its delivery. Returns as soon as
    /// the attempt row exists. Must be called from within a tokio runtime.
    pub fn dispatch(
        &self,
        target: NotificationTarget,
        context: TemplateContext,
    ) -> Result<NotificationAttempt> {
        let message = context.render();
        let attempt =
            self.store
                .create_attempt(&target, context.kind(), &message.subject, Utc::now())?;
        debug!(
            "Queued {} notification {} for {}",
            context.kind().as_str(),
            attempt.id,
            target.recipient
        );

        let this = self.clone();
        let attempt_id = attempt.id.clone();
        notification_delivery_started();
        self.tracker.spawn(async move {
            this.deliver(&attempt_id, &target.recipient, &message).await;
            notification_delivery_finished();
        });
        Ok(attempt)
    }

    /// Deliver one message, retrying transient failures. Returns the final status.
    pub async fn deliver(
        &self,
        attempt_id: &str,
        recipient: &str,
        message: &RenderedMessage,
    ) -> NotificationStatus {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match self
                .provider
                .send(recipient, &message.subject, &message.html_body)
                .await
            {
                Ok(message_id) => {
                    self.update(
                        attempt_id,
                        attempts,
                        NotificationStatus::Sent,
                        None,
                        Some(&message_id),
                    );
                    info!(
                        "Notification {} delivered to {} after {} attempt(s)",
                        attempt_id, recipient, attempts
                    );
                    record_notification_outcome(NotificationStatus::Sent.as_str());
                    return NotificationStatus::Sent;
                }
                Err(err) if self.policy.should_retry(&err, attempts) => {
                    let delay = self.policy.backoff(attempts);
                    warn!(
                        "Notification {} attempt {}/{} failed ({}), retrying in {:?}",
                        attempt_id, attempts, self.policy.max_attempts, err, delay
                    );
                    self.update(
                        attempt_id,
                        attempts,
                        NotificationStatus::FailedTransient,
                        Some(err.message()),
                        None,
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!(
                        "Notification {} to {} failed permanently after {} attempt(s): {}",
                        attempt_id, recipient, attempts, err
                    );
                    self.update(
                        attempt_id,
                        attempts,
                        NotificationStatus::FailedPermanent,
                        Some(err.message()),
                        None,
                    );
                    record_notification_outcome(NotificationStatus::FailedPermanent.as_str());
                    return NotificationStatus::FailedPermanent;
                }
            }
        }
    }

    fn update(
        &self,
        attempt_id: &str,
        attempts: u32,
        status: NotificationStatus,
        last_error: Option<&str>,
        message_id: Option<&str>,
    ) {
        if let Err(e) = self.store.update_attempt(
            attempt_id,
            attempts,
            status,
            last_error,
            message_id,
            Utc::now(),
        ) {
            error!(
                "Failed to record notification {} as {}: {:#}",
                attempt_id,
                status.as_str(),
                e
            );
        }
    }

    /// Deliveries spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every delivery spawned so far has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stop accepting work and wait up to `timeout` for in-flight deliveries.
    /// Returns `false` if some were still running when the timeout hit.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "{} notification deliveries still in flight at shutdown",
                    self.in_flight()
                );
                false
            }
        }
    }
}
