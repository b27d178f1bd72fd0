use super::models::{
    NewPipelineEntity, NewTransitionRule, PipelineEntity, StageTransition, TransitionRule,
};
use anyhow::Result;
use chrono::{DateTime, Utc};

pub trait PipelineStore: Send + Sync {
    fn create_entity(&self, new: &NewPipelineEntity, now: DateTime<Utc>) -> Result<PipelineEntity>;
    fn get_entity(&self, entity_id: &str) -> Result<Option<PipelineEntity>>;
    fn list_entities(&self) -> Result<Vec<PipelineEntity>>;

    /// Write `new_stage` only if the entity is still at `expected_stage` and
    /// `expected_version`; the transition is logged in the same transaction.
    /// Returns `false` when a concurrent writer changed the entity first.
    fn compare_and_set_stage(
        &self,
        entity_id: &str,
        expected_stage: &str,
        expected_version: i64,
        new_stage: &str,
        rule_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    fn create_rule(&self, new: &NewTransitionRule) -> Result<TransitionRule>;
    /// Enabled rules ordered by position.
    fn list_rules(&self) -> Result<Vec<TransitionRule>>;

    fn list_transitions(&self, entity_id: &str) -> Result<Vec<StageTransition>>;
}
