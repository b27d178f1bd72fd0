use crate::signing::ContractStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An entity moving through pipeline stages (e.g. a deal or a listing).
#[derive(Debug, Clone, Serialize)]
pub struct PipelineEntity {
    pub id: String,
    pub name: String,
    pub stage: String,
    /// Incremented on every stage write; part of the optimistic-concurrency check.
    pub version: i64,
    pub stage_entered_at: DateTime<Utc>,
    pub contract_id: Option<String>,
    pub owner_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPipelineEntity {
    pub name: String,
    pub stage: String,
    #[serde(default)]
    pub contract_id: Option<String>,
    #[serde(default)]
    pub owner_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionCondition {
    /// The entity has been in its stage for at least `min_secs`.
    TimeInStage { min_secs: u64 },
    /// The entity's linked contract has this status.
    ContractStatus { status: ContractStatus },
    Always,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionRule {
    pub id: i64,
    pub from_stage: String,
    pub to_stage: String,
    pub condition: TransitionCondition,
    /// Evaluation order; lower first.
    pub position: i64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTransitionRule {
    pub from_stage: String,
    pub to_stage: String,
    pub condition: TransitionCondition,
    #[serde(default)]
    pub position: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTransition {
    pub id: i64,
    pub entity_id: String,
    pub from_stage: String,
    pub to_stage: String,
    /// `None` for manual edits.
    pub rule_id: Option<i64>,
    pub transitioned_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_json_shape() {
        let condition: TransitionCondition =
            serde_json::from_str(r#"{"type":"time_in_stage","min_secs":3600}"#).unwrap();
        assert_eq!(condition, TransitionCondition::TimeInStage { min_secs: 3600 });

        let condition: TransitionCondition =
            serde_json::from_str(r#"{"type":"contract_status","status":"COMPLETED"}"#).unwrap();
        assert_eq!(
            condition,
            TransitionCondition::ContractStatus {
                status: ContractStatus::Completed
            }
        );

        let json = serde_json::to_string(&TransitionCondition::Always).unwrap();
        assert_eq!(json, r#"{"type":"always"}"#);
    }
}
