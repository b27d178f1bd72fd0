use super::models::{NotificationAttempt, NotificationKind, NotificationStatus, NotificationTarget};
use anyhow::Result;
use chrono::{DateTime, Utc};

pub trait NotificationStore: Send + Sync {
    /// Create a PENDING attempt row with zero attempts.
    fn create_attempt(
        &self,
        target: &NotificationTarget,
        kind: NotificationKind,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<NotificationAttempt>;

    /// Record the result of one delivery try.
    fn update_attempt(
        &self,
        attempt_id: &str,
        attempt_count: u32,
        status: NotificationStatus,
        last_error: Option<&str>,
        provider_message_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    fn get_attempt(&self, attempt_id: &str) -> Result<Option<NotificationAttempt>>;
    fn list_attempts_by_status(
        &self,
        status: NotificationStatus,
        limit: usize,
    ) -> Result<Vec<NotificationAttempt>>;
    fn list_attempts_for_submitter(&self, submitter_id: &str) -> Result<Vec<NotificationAttempt>>;
    fn count_attempts_by_status(&self, status: NotificationStatus) -> Result<usize>;
}
