use super::{new_id, SqliteWorkflowStore};
use crate::pipeline::{
    NewPipelineEntity, NewTransitionRule, PipelineEntity, PipelineStore, StageTransition,
    TransitionCondition, TransitionRule,
};
use crate::sqlite_persistence::{from_unix_millis, invalid_value, lock_conn, to_unix_millis};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

const ENTITY_COLUMNS: &str = "id, name, stage, version, stage_entered_at, contract_id, \
     owner_email, created_at, updated_at";
const RULE_COLUMNS: &str = "id, from_stage, to_stage, condition, position, enabled";

fn row_to_entity(row: &rusqlite::Row) -> rusqlite::Result<PipelineEntity> {
    Ok(PipelineEntity {
        id: row.get("id")?,
        name: row.get("name")?,
        stage: row.get("stage")?,
        version: row.get("version")?,
        stage_entered_at: from_unix_millis(row.get("stage_entered_at")?),
        contract_id: row.get("contract_id")?,
        owner_email: row.get("owner_email")?,
        created_at: from_unix_millis(row.get("created_at")?),
        updated_at: from_unix_millis(row.get("updated_at")?),
    })
}

fn row_to_rule(row: &rusqlite::Row) -> rusqlite::Result<TransitionRule> {
    let condition: String = row.get("condition")?;
    Ok(TransitionRule {
        id: row.get("id")?,
        from_stage: row.get("from_stage")?,
        to_stage: row.get("to_stage")?,
        condition: serde_json::from_str::<TransitionCondition>(&condition)
            .map_err(|_| invalid_value("condition", &condition))?,
        position: row.get("position")?,
        enabled: row.get::<_, i64>("enabled")? != 0,
    })
}

fn row_to_transition(row: &rusqlite::Row) -> rusqlite::Result<StageTransition> {
    Ok(StageTransition {
        id: row.get("id")?,
        entity_id: row.get("entity_id")?,
        from_stage: row.get("from_stage")?,
        to_stage: row.get("to_stage")?,
        rule_id: row.get("rule_id")?,
        transitioned_at: from_unix_millis(row.get("transitioned_at")?),
    })
}

impl PipelineStore for SqliteWorkflowStore {
    fn create_entity(&self, new: &NewPipelineEntity, now: DateTime<Utc>) -> Result<PipelineEntity> {
        let conn = lock_conn(&self.conn)?;
        let id = new_id();
        let now_ts = to_unix_millis(&now);
        conn.execute(
            "INSERT INTO pipeline_entities (id, name, stage, version, stage_entered_at,
                 contract_id, owner_email, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?4, ?4)",
            params![id, new.name, new.stage, now_ts, new.contract_id, new.owner_email],
        )?;
        let entity = conn.query_row(
            &format!("SELECT {ENTITY_COLUMNS} FROM pipeline_entities WHERE id = ?1"),
            params![id],
            row_to_entity,
        )?;
        Ok(entity)
    }

    fn get_entity(&self, entity_id: &str) -> Result<Option<PipelineEntity>> {
        let conn = lock_conn(&self.conn)?;
        let entity = conn
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM pipeline_entities WHERE id = ?1"),
                params![entity_id],
                row_to_entity,
            )
            .optional()?;
        Ok(entity)
    }

    fn list_entities(&self) -> Result<Vec<PipelineEntity>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM pipeline_entities ORDER BY created_at, id"
        ))?;
        let entities = stmt
            .query_map([], row_to_entity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entities)
    }

    fn compare_and_set_stage(
        &self,
        entity_id: &str,
        expected_stage: &str,
        expected_version: i64,
        new_stage: &str,
        rule_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;
        let now_ts = to_unix_millis(&now);

        let updated = tx.execute(
            "UPDATE pipeline_entities
             SET stage = ?4, version = version + 1, stage_entered_at = ?5, updated_at = ?5
             WHERE id = ?1 AND stage = ?2 AND version = ?3",
            params![entity_id, expected_stage, expected_version, new_stage, now_ts],
        )?;
        if updated == 0 {
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO pipeline_transitions (entity_id, from_stage, to_stage, rule_id, transitioned_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![entity_id, expected_stage, new_stage, rule_id, now_ts],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn create_rule(&self, new: &NewTransitionRule) -> Result<TransitionRule> {
        let conn = lock_conn(&self.conn)?;
        let condition =
            serde_json::to_string(&new.condition).context("Failed to encode rule condition")?;
        conn.execute(
            "INSERT INTO pipeline_rules (from_stage, to_stage, condition, position, enabled)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![new.from_stage, new.to_stage, condition, new.position],
        )?;
        let rule = conn.query_row(
            &format!("SELECT {RULE_COLUMNS} FROM pipeline_rules WHERE id = last_insert_rowid()"),
            [],
            row_to_rule,
        )?;
        Ok(rule)
    }

    fn list_rules(&self) -> Result<Vec<TransitionRule>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM pipeline_rules WHERE enabled = 1 ORDER BY position, id"
        ))?;
        let rules = stmt
            .query_map([], row_to_rule)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rules)
    }

    fn list_transitions(&self, entity_id: &str) -> Result<Vec<StageTransition>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, entity_id, from_stage, to_stage, rule_id, transitioned_at
             FROM pipeline_transitions WHERE entity_id = ?1 ORDER BY id",
        )?;
        let transitions = stmt
            .query_map(params![entity_id], row_to_transition)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(transitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_and_set_stage() {
        let store = SqliteWorkflowStore::in_memory().unwrap();
        let entity = store
            .create_entity(
                &NewPipelineEntity {
                    name: "12 Main St".into(),
                    stage: "lead".into(),
                    contract_id: None,
                    owner_email: None,
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(entity.version, 0);

        assert!(store
            .compare_and_set_stage(&entity.id, "lead", 0, "qualified", Some(1), Utc::now())
            .unwrap());
        // Stale version: the write is refused.
        assert!(!store
            .compare_and_set_stage(&entity.id, "qualified", 0, "won", None, Utc::now())
            .unwrap());

        let entity = store.get_entity(&entity.id).unwrap().unwrap();
        assert_eq!(entity.stage, "qualified");
        assert_eq!(entity.version, 1);

        let transitions = store.list_transitions(&entity.id).unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].from_stage, "lead");
        assert_eq!(transitions[0].rule_id, Some(1));
    }

    #[test]
    fn test_rules_are_ordered_by_position() {
        let store = SqliteWorkflowStore::in_memory().unwrap();
        store
            .create_rule(&NewTransitionRule {
                from_stage: "lead".into(),
                to_stage: "stale".into(),
                condition: TransitionCondition::TimeInStage { min_secs: 60 },
                position: 10,
            })
            .unwrap();
        let first = store
            .create_rule(&NewTransitionRule {
                from_stage: "lead".into(),
                to_stage: "qualified".into(),
                condition: TransitionCondition::Always,
                position: 1,
            })
            .unwrap();

        let rules = store.list_rules().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, first.id);
        assert_eq!(
            rules[1].condition,
            TransitionCondition::TimeInStage { min_secs: 60 }
        );
    }
}
