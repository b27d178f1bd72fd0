use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Draft,
    Sent,
    InProgress,
    Completed,
    Declined,
    Expired,
}

impl ContractStatus {
    pub const ALL: [ContractStatus; 6] = [
        ContractStatus::Draft,
        ContractStatus::Sent,
        ContractStatus::InProgress,
        ContractStatus::Completed,
        ContractStatus::Declined,
        ContractStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "DRAFT",
            ContractStatus::Sent => "SENT",
            ContractStatus::InProgress => "IN_PROGRESS",
            ContractStatus::Completed => "COMPLETED",
            ContractStatus::Declined => "DECLINED",
            ContractStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Sent or in progress: the contract still accepts submitter transitions.
    pub fn is_open(&self) -> bool {
        matches!(self, ContractStatus::Sent | ContractStatus::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContractStatus::Completed | ContractStatus::Declined | ContractStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderingMode {
    Sequential,
    Parallel,
}

impl OrderingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderingMode::Sequential => "SEQUENTIAL",
            OrderingMode::Parallel => "PARALLEL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SEQUENTIAL" => Some(OrderingMode::Sequential),
            "PARALLEL" => Some(OrderingMode::Parallel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmitterStatus {
    Pending,
    Notified,
    Opened,
    Completed,
    Declined,
    Expired,
}

impl SubmitterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitterStatus::Pending => "PENDING",
            SubmitterStatus::Notified => "NOTIFIED",
            SubmitterStatus::Opened => "OPENED",
            SubmitterStatus::Completed => "COMPLETED",
            SubmitterStatus::Declined => "DECLINED",
            SubmitterStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(SubmitterStatus::Pending),
            "NOTIFIED" => Some(SubmitterStatus::Notified),
            "OPENED" => Some(SubmitterStatus::Opened),
            "COMPLETED" => Some(SubmitterStatus::Completed),
            "DECLINED" => Some(SubmitterStatus::Declined),
            "EXPIRED" => Some(SubmitterStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmitterStatus::Completed | SubmitterStatus::Declined | SubmitterStatus::Expired
        )
    }

    /// Whether `self -> target` is a legal forward move.
    ///
    /// Leaving PENDING is reserved to the workflow's own notify step; provider
    /// events for a submitter that was never notified are out of order.
    pub fn can_transition_to(&self, target: SubmitterStatus) -> bool {
        use SubmitterStatus::*;
        matches!(
            (self, target),
            (Pending, Notified)
                | (Notified, Opened)
                | (Notified, Completed)
                | (Opened, Completed)
                | (Notified, Declined)
                | (Opened, Declined)
                | (Notified, Expired)
                | (Opened, Expired)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Contract {
    pub id: String,
    pub title: String,
    pub template_ref: String,
    pub status: ContractStatus,
    pub ordering_mode: OrderingMode,
    /// Submission id assigned by the signing provider on send.
    pub submission_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Submitter {
    pub id: String,
    pub contract_id: String,
    /// Submitter id on the signing provider side.
    pub external_id: Option<String>,
    pub name: String,
    pub email: String,
    pub role: String,
    pub signing_order: Option<i64>,
    pub status: SubmitterStatus,
    /// Link the signer follows, when the provider returned one.
    pub signing_url: Option<String>,
    pub notified_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewContract {
    pub title: String,
    pub template_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubmitter {
    pub name: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub signing_order: Option<i64>,
}

fn default_role() -> String {
    "signer".to_string()
}

/// A submitter as accepted by the signing provider, ready to be persisted.
#[derive(Debug, Clone)]
pub struct SubmitterRecord {
    pub id: String,
    pub submitter: NewSubmitter,
    pub external_id: Option<String>,
    pub signing_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractWithSubmitters {
    #[serde(flatten)]
    pub contract: Contract,
    pub submitters: Vec<Submitter>,
}

/// Provider event kinds the workflow understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningEventKind {
    Viewed,
    Completed,
    Declined,
    Expired,
}

impl SigningEventKind {
    pub fn target_status(&self) -> SubmitterStatus {
        match self {
            SigningEventKind::Viewed => SubmitterStatus::Opened,
            SigningEventKind::Completed => SubmitterStatus::Completed,
            SigningEventKind::Declined => SubmitterStatus::Declined,
            SigningEventKind::Expired => SubmitterStatus::Expired,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SigningEventKind::Viewed => "viewed",
            SigningEventKind::Completed => "completed",
            SigningEventKind::Declined => "declined",
            SigningEventKind::Expired => "expired",
        }
    }
}

/// Internal shape of an inbound provider event.
#[derive(Debug, Clone)]
pub struct SigningEvent {
    pub event_id: String,
    pub submission_id: Option<String>,
    /// Provider-side submitter id.
    pub submitter_ref: String,
    pub kind: SigningEventKind,
    pub occurred_at: DateTime<Utc>,
}

/// What `record_event` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Applied,
    Duplicate,
    OutOfOrder,
    Conflict,
    UnknownSubmitter,
    Ignored,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Applied => "applied",
            EventOutcome::Duplicate => "duplicate",
            EventOutcome::OutOfOrder => "out_of_order",
            EventOutcome::Conflict => "conflict",
            EventOutcome::UnknownSubmitter => "unknown_submitter",
            EventOutcome::Ignored => "ignored",
        }
    }
}

/// Contract status as a function of its submitters.
///
/// DRAFT contracts stay DRAFT. A contract whose submitters have only been
/// notified is still SENT; it is IN_PROGRESS once a submitter opened the
/// document or some, but not all, have completed.
pub fn aggregate_status(current: ContractStatus, submitters: &[Submitter]) -> ContractStatus {
    if current == ContractStatus::Draft || submitters.is_empty() {
        return current;
    }
    let count = |status: SubmitterStatus| submitters.iter().filter(|s| s.status == status).count();

    if count(SubmitterStatus::Declined) > 0 {
        ContractStatus::Declined
    } else if count(SubmitterStatus::Expired) > 0 {
        ContractStatus::Expired
    } else if count(SubmitterStatus::Completed) == submitters.len() {
        ContractStatus::Completed
    } else if count(SubmitterStatus::Opened) > 0 || count(SubmitterStatus::Completed) > 0 {
        ContractStatus::InProgress
    } else {
        ContractStatus::Sent
    }
}
