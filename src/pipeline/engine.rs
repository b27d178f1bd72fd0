//! Rule-driven stage automation for pipeline entities.
//!
//! One pass reads every entity once and applies at most one transition to
//! each. Writes are conditioned on the stage and version that were read, so a
//! manual edit landing between the read and the write wins and the automated
//! transition is dropped.

use super::models::{PipelineEntity, TransitionCondition, TransitionRule};
use super::store::PipelineStore;
use crate::notifications::{NotificationDispatcher, NotificationTarget, TemplateContext};
use crate::signing::SigningStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineRunSummary {
    pub evaluated: usize,
    pub transitioned: usize,
    pub conflicts: usize,
    pub failed: usize,
}

/// Result of a manual stage edit.
#[derive(Debug, Clone)]
pub enum StageEdit {
    Applied(PipelineEntity),
    /// The entity no longer matches the expected stage/version; carries its
    /// current state.
    Conflict(PipelineEntity),
    NotFound,
}

pub struct PipelineEngine {
    store: Arc<dyn PipelineStore>,
    signing: Arc<dyn SigningStore>,
    dispatcher: NotificationDispatcher,
}

impl PipelineEngine {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        signing: Arc<dyn SigningStore>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            signing,
            dispatcher,
        }
    }

    pub fn run_once(&self, now: DateTime<Utc>) -> Result<PipelineRunSummary> {
        let rules = self.store.list_rules()?;
        let entities = self.store.list_entities()?;
        let mut summary = PipelineRunSummary::default();

        for entity in &entities {
            summary.evaluated += 1;
            let rule = match self.first_matching_rule(entity, &rules, now) {
                Ok(Some(rule)) => rule,
                Ok(None) => continue,
                Err(e) => {
                    summary.failed += 1;
                    warn!("Pipeline entity {} skipped: {:#}", entity.id, e);
                    continue;
                }
            };

            let applied = self.store.compare_and_set_stage(
                &entity.id,
                &entity.stage,
                entity.version,
                &rule.to_stage,
                Some(rule.id),
                now,
            )?;
            if !applied {
                summary.conflicts += 1;
                warn!(
                    "Pipeline entity {} changed concurrently, dropping {} -> {} (rule {})",
                    entity.id, entity.stage, rule.to_stage, rule.id
                );
                continue;
            }

            summary.transitioned += 1;
            info!(
                "Pipeline entity {} ({}) {} -> {} by rule {}",
                entity.id, entity.name, entity.stage, rule.to_stage, rule.id
            );
            self.notify(entity, &entity.stage, &rule.to_stage);
        }

        debug!(
            "Pipeline pass: {} evaluated, {} moved, {} conflicts",
            summary.evaluated, summary.transitioned, summary.conflicts
        );
        Ok(summary)
    }

    /// Manual stage edit with the same compare-and-set discipline as the
    /// automated pass.
    pub fn set_stage(
        &self,
        entity_id: &str,
        expected_stage: &str,
        expected_version: i64,
        new_stage: &str,
        now: DateTime<Utc>,
    ) -> Result<StageEdit> {
        let Some(entity) = self.store.get_entity(entity_id)? else {
            return Ok(StageEdit::NotFound);
        };
        let applied = self.store.compare_and_set_stage(
            entity_id,
            expected_stage,
            expected_version,
            new_stage,
            None,
            now,
        )?;
        let current = self.store.get_entity(entity_id)?.unwrap_or(entity);
        if !applied {
            warn!(
                "Manual stage edit of {} rejected: expected {}@{}, found {}@{}",
                entity_id, expected_stage, expected_version, current.stage, current.version
            );
            return Ok(StageEdit::Conflict(current));
        }
        info!(
            "Pipeline entity {} manually moved {} -> {}",
            entity_id, expected_stage, new_stage
        );
        self.notify(&current, expected_stage, new_stage);
        Ok(StageEdit::Applied(current))
    }

    fn first_matching_rule<'a>(
        &self,
        entity: &PipelineEntity,
        rules: &'a [TransitionRule],
        now: DateTime<Utc>,
    ) -> Result<Option<&'a TransitionRule>> {
        for rule in rules.iter().filter(|r| r.from_stage == entity.stage) {
            if self.condition_holds(&rule.condition, entity, now)? {
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }

    fn condition_holds(
        &self,
        condition: &TransitionCondition,
        entity: &PipelineEntity,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(match condition {
            TransitionCondition::Always => true,
            TransitionCondition::TimeInStage { min_secs } => {
                let in_stage = now.signed_duration_since(entity.stage_entered_at);
                in_stage.num_seconds() >= *min_secs as i64
            }
            TransitionCondition::ContractStatus { status } => match &entity.contract_id {
                Some(contract_id) => self
                    .signing
                    .get_contract(contract_id)?
                    .is_some_and(|c| c.status == *status),
                None => false,
            },
        })
    }

    /// Spawned, not awaited.
    fn notify(&self, entity: &PipelineEntity, from_stage: &str, to_stage: &str) {
        let Some(owner) = entity.owner_email.clone() else {
            return;
        };
        let context = TemplateContext::StageChanged {
            entity_name: entity.name.clone(),
            from_stage: from_stage.to_string(),
            to_stage: to_stage.to_string(),
        };
        if let Err(e) = self
            .dispatcher
            .dispatch(NotificationTarget::email(owner), context)
        {
            error!(
                "Failed to queue stage notification for {}: {:#}",
                entity.id, e
            );
        }
    }
}
