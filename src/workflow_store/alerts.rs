use super::{new_id, SqliteWorkflowStore};
use crate::alerts::{AlertRule, AlertStore, AlertTrigger, ComparisonOperator, NewAlertRule};
use crate::sqlite_persistence::{from_unix_millis, invalid_value, lock_conn, to_unix_millis};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::time::Duration;

const RULE_COLUMNS: &str = "id, name, metric, operator, threshold, cooldown_secs, enabled, \
     recipient, last_triggered_at, created_at";

fn row_to_rule(row: &rusqlite::Row) -> rusqlite::Result<AlertRule> {
    let operator: String = row.get("operator")?;
    Ok(AlertRule {
        id: row.get("id")?,
        name: row.get("name")?,
        metric: row.get("metric")?,
        operator: ComparisonOperator::parse(&operator)
            .ok_or_else(|| invalid_value("operator", &operator))?,
        threshold: row.get("threshold")?,
        cooldown: Duration::from_secs(row.get::<_, i64>("cooldown_secs")?.max(0) as u64),
        enabled: row.get::<_, i64>("enabled")? != 0,
        recipient: row.get("recipient")?,
        last_triggered_at: row.get::<_, Option<i64>>("last_triggered_at")?.map(from_unix_millis),
        created_at: from_unix_millis(row.get("created_at")?),
    })
}

fn row_to_trigger(row: &rusqlite::Row) -> rusqlite::Result<AlertTrigger> {
    Ok(AlertTrigger {
        id: row.get("id")?,
        rule_id: row.get("rule_id")?,
        metric_value: row.get("metric_value")?,
        threshold: row.get("threshold")?,
        triggered_at: from_unix_millis(row.get("triggered_at")?),
    })
}

impl SqliteWorkflowStore {
    fn query_rules(&self, sql_where: &str) -> Result<Vec<AlertRule>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM alert_rules WHERE {sql_where} ORDER BY created_at, id"
        ))?;
        let rules = stmt
            .query_map([], row_to_rule)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rules)
    }
}

impl AlertStore for SqliteWorkflowStore {
    fn create_rule(&self, new: &NewAlertRule, now: DateTime<Utc>) -> Result<AlertRule> {
        let conn = lock_conn(&self.conn)?;
        let id = new_id();
        conn.execute(
            "INSERT INTO alert_rules (id, name, metric, operator, threshold, cooldown_secs,
                 enabled, recipient, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                new.name,
                new.metric,
                new.operator.as_str(),
                new.threshold,
                new.cooldown_secs as i64,
                new.enabled as i64,
                new.recipient,
                to_unix_millis(&now)
            ],
        )?;
        let rule = conn.query_row(
            &format!("SELECT {RULE_COLUMNS} FROM alert_rules WHERE id = ?1"),
            params![id],
            row_to_rule,
        )?;
        Ok(rule)
    }

    fn get_rule(&self, rule_id: &str) -> Result<Option<AlertRule>> {
        let conn = lock_conn(&self.conn)?;
        let rule = conn
            .query_row(
                &format!("SELECT {RULE_COLUMNS} FROM alert_rules WHERE id = ?1"),
                params![rule_id],
                row_to_rule,
            )
            .optional()?;
        Ok(rule)
    }

    fn list_rules(&self) -> Result<Vec<AlertRule>> {
        self.query_rules("1 = 1")
    }

    fn list_enabled_rules(&self) -> Result<Vec<AlertRule>> {
        self.query_rules("enabled = 1")
    }

    fn delete_rule(&self, rule_id: &str) -> Result<bool> {
        let conn = lock_conn(&self.conn)?;
        let deleted = conn.execute("DELETE FROM alert_rules WHERE id = ?1", params![rule_id])?;
        Ok(deleted > 0)
    }

    fn try_stamp_trigger(
        &self,
        rule_id: &str,
        expected_last_triggered: Option<DateTime<Utc>>,
        metric_value: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertTrigger>> {
        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;
        let now_ts = to_unix_millis(&now);

        let stamped = tx.execute(
            "UPDATE alert_rules SET last_triggered_at = ?2
             WHERE id = ?1 AND last_triggered_at IS ?3",
            params![
                rule_id,
                now_ts,
                expected_last_triggered.as_ref().map(to_unix_millis)
            ],
        )?;
        if stamped == 0 {
            return Ok(None);
        }

        tx.execute(
            "INSERT INTO alert_triggers (rule_id, metric_value, threshold, triggered_at)
             SELECT id, ?2, threshold, ?3 FROM alert_rules WHERE id = ?1",
            params![rule_id, metric_value, now_ts],
        )?;
        let trigger = tx.query_row(
            "SELECT id, rule_id, metric_value, threshold, triggered_at
             FROM alert_triggers WHERE id = last_insert_rowid()",
            [],
            row_to_trigger,
        )?;
        tx.commit()?;
        Ok(Some(trigger))
    }

    fn list_triggers(&self, rule_id: Option<&str>, limit: usize) -> Result<Vec<AlertTrigger>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, rule_id, metric_value, threshold, triggered_at FROM alert_triggers
             WHERE ?1 IS NULL OR rule_id = ?1
             ORDER BY triggered_at DESC, id DESC LIMIT ?2",
        )?;
        let triggers = stmt
            .query_map(params![rule_id, limit as i64], row_to_trigger)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(triggers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_rule() -> NewAlertRule {
        NewAlertRule {
            name: "backlog".into(),
            metric: "contracts.stale".into(),
            operator: ComparisonOperator::GreaterThan,
            threshold: 10.0,
            cooldown_secs: 600,
            enabled: true,
            recipient: Some("ops@example.com".into()),
        }
    }

    #[test]
    fn test_create_and_list_rules() {
        let store = SqliteWorkflowStore::in_memory().unwrap();
        let rule = store.create_rule(&new_rule(), Utc::now()).unwrap();
        let disabled = store
            .create_rule(
                &NewAlertRule {
                    enabled: false,
                    ..new_rule()
                },
                Utc::now(),
            )
            .unwrap();

        assert_eq!(rule.operator, ComparisonOperator::GreaterThan);
        assert_eq!(rule.cooldown, Duration::from_secs(600));
        assert!(rule.last_triggered_at.is_none());
        assert_eq!(store.list_rules().unwrap().len(), 2);
        let enabled = store.list_enabled_rules().unwrap();
        assert_eq!(enabled.len(), 1);
        assert_ne!(enabled[0].id, disabled.id);
    }

    #[test]
    fn test_stamp_is_conditional_on_previous_value() {
        let store = SqliteWorkflowStore::in_memory().unwrap();
        let rule = store.create_rule(&new_rule(), Utc::now()).unwrap();
        let t0 = from_unix_millis(1_700_000_000_000);

        let trigger = store.try_stamp_trigger(&rule.id, None, 12.0, t0).unwrap();
        assert!(trigger.is_some());
        // A concurrent evaluator that also read `None` loses.
        assert!(store
            .try_stamp_trigger(&rule.id, None, 12.0, t0)
            .unwrap()
            .is_none());

        let rule = store.get_rule(&rule.id).unwrap().unwrap();
        assert_eq!(rule.last_triggered_at, Some(t0));

        let triggers = store.list_triggers(Some(&rule.id), 10).unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].metric_value, 12.0);
        assert_eq!(triggers[0].threshold, 10.0);
        assert_eq!(store.list_triggers(None, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_rule_removes_triggers() {
        let store = SqliteWorkflowStore::in_memory().unwrap();
        let rule = store.create_rule(&new_rule(), Utc::now()).unwrap();
        store
            .try_stamp_trigger(&rule.id, None, 11.0, Utc::now())
            .unwrap();

        assert!(store.delete_rule(&rule.id).unwrap());
        assert!(store.list_triggers(None, 10).unwrap().is_empty());
    }
}
