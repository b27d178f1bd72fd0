use super::models::{AlertRule, AlertTrigger, NewAlertRule};
use anyhow::Result;
use chrono::{DateTime, Utc};

pub trait AlertStore: Send + Sync {
    fn create_rule(&self, new: &NewAlertRule, now: DateTime<Utc>) -> Result<AlertRule>;
    fn get_rule(&self, rule_id: &str) -> Result<Option<AlertRule>>;
    fn list_rules(&self) -> Result<Vec<AlertRule>>;
    fn list_enabled_rules(&self) -> Result<Vec<AlertRule>>;
    fn delete_rule(&self, rule_id: &str) -> Result<bool>;

    /// Stamp `last_triggered_at = now` only if it still equals
    /// `expected_last_triggered`, and record the trigger in the same
    /// transaction. `None` means another evaluation stamped the rule first.
    fn try_stamp_trigger(
        &self,
        rule_id: &str,
        expected_last_triggered: Option<DateTime<Utc>>,
        metric_value: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertTrigger>>;

    /// Most recent first, optionally for a single rule.
    fn list_triggers(&self, rule_id: Option<&str>, limit: usize) -> Result<Vec<AlertTrigger>>;
}
