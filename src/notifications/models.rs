use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Sent,
    FailedTransient,
    FailedPermanent,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Sent => "SENT",
            NotificationStatus::FailedTransient => "FAILED_TRANSIENT",
            NotificationStatus::FailedPermanent => "FAILED_PERMANENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(NotificationStatus::Pending),
            "SENT" => Some(NotificationStatus::Sent),
            "FAILED_TRANSIENT" => Some(NotificationStatus::FailedTransient),
            "FAILED_PERMANENT" => Some(NotificationStatus::FailedPermanent),
            _ => None,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            NotificationStatus::Sent | NotificationStatus::FailedPermanent
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SigningRequest,
    AlertTriggered,
    StageChanged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::SigningRequest => "signing_request",
            NotificationKind::AlertTriggered => "alert_triggered",
            NotificationKind::StageChanged => "stage_changed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "signing_request" => Some(NotificationKind::SigningRequest),
            "alert_triggered" => Some(NotificationKind::AlertTriggered),
            "stage_changed" => Some(NotificationKind::StageChanged),
            _ => None,
        }
    }
}

/// One outbound message and the state of its delivery.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationAttempt {
    pub id: String,
    /// Weak reference: the submitter may have been deleted since.
    pub submitter_id: Option<String>,
    pub contract_id: Option<String>,
    pub recipient: String,
    pub channel: String,
    pub kind: NotificationKind,
    pub subject: String,
    pub attempt_count: u32,
    pub status: NotificationStatus,
    pub last_error: Option<String>,
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a notification goes and what it relates to.
#[derive(Debug, Clone)]
pub struct NotificationTarget {
    pub recipient: String,
    pub submitter_id: Option<String>,
    pub contract_id: Option<String>,
}

impl NotificationTarget {
    pub fn email(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            submitter_id: None,
            contract_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_conversion() {
        for status in [
            NotificationStatus::Pending,
            NotificationStatus::Sent,
            NotificationStatus::FailedTransient,
            NotificationStatus::FailedPermanent,
        ] {
            assert_eq!(NotificationStatus::parse(status.as_str()), Some(status));
        }
        assert!(NotificationStatus::parse("failed").is_none());
    }

    #[test]
    fn test_final_statuses() {
        assert!(NotificationStatus::Sent.is_final());
        assert!(NotificationStatus::FailedPermanent.is_final());
        assert!(!NotificationStatus::FailedTransient.is_final());
        assert!(!NotificationStatus::Pending.is_final());
    }
}
