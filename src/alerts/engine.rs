//! Threshold alert evaluation.

use super::metric_source::MetricSource;
use super::models::{AlertRule, AlertTrigger};
use super::store::AlertStore;
use crate::notifications::{NotificationDispatcher, NotificationTarget, TemplateContext};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct AlertEngine {
    store: Arc<dyn AlertStore>,
    metrics: Arc<dyn MetricSource>,
    dispatcher: NotificationDispatcher,
    default_recipient: Option<String>,
}

impl AlertEngine {
    pub fn new(
        store: Arc<dyn AlertStore>,
        metrics: Arc<dyn MetricSource>,
        dispatcher: NotificationDispatcher,
        default_recipient: Option<String>,
    ) -> Self {
        Self {
            store,
            metrics,
            dispatcher,
            default_recipient,
        }
    }

    /// Evaluate every enabled rule at `now` and return the ids of the rules
    /// that fired. A rule that cannot be evaluated is logged and skipped.
    pub fn evaluate(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let rules = self.store.list_enabled_rules()?;
        let mut fired = Vec::new();

        for rule in &rules {
            match self.evaluate_rule(rule, now) {
                Ok(Some(trigger)) => {
                    self.notify(rule, &trigger);
                    fired.push(rule.id.clone());
                }
                Ok(None) => {}
                Err(e) => warn!("Alert rule {} ({}) skipped: {:#}", rule.id, rule.name, e),
            }
        }

        debug!(
            "Evaluated {} alert rule(s), {} fired",
            rules.len(),
            fired.len()
        );
        Ok(fired)
    }

    fn evaluate_rule(&self, rule: &AlertRule, now: DateTime<Utc>) -> Result<Option<AlertTrigger>> {
        let value = self
            .metrics
            .metric_value(&rule.metric, now)?
            .ok_or_else(|| anyhow::anyhow!("unknown metric '{}'", rule.metric))?;

        if !rule.operator.holds(value, rule.threshold) {
            return Ok(None);
        }
        if !rule.cooldown_elapsed(now) {
            debug!(
                "Alert rule {} holds ({} {} {}) but is cooling down",
                rule.name,
                value,
                rule.operator.as_str(),
                rule.threshold
            );
            return Ok(None);
        }

        let trigger = self
            .store
            .try_stamp_trigger(&rule.id, rule.last_triggered_at, value, now)?;
        if trigger.is_none() {
            warn!(
                "Alert rule {} was stamped by a concurrent evaluation, not firing",
                rule.name
            );
        }
        Ok(trigger)
    }

    fn notify(&self, rule: &AlertRule, trigger: &AlertTrigger) {
        info!(
            "Alert '{}' fired: {} = {} {} {}",
            rule.name,
            rule.metric,
            trigger.metric_value,
            rule.operator.as_str(),
            rule.threshold
        );

        let Some(recipient) = rule
            .recipient
            .clone()
            .or_else(|| self.default_recipient.clone())
        else {
            warn!("Alert '{}' has no recipient, trigger recorded only", rule.name);
            return;
        };

        let context = TemplateContext::AlertTriggered {
            rule_name: rule.name.clone(),
            metric: rule.metric.clone(),
            value: trigger.metric_value,
            operator: rule.operator.as_str().to_string(),
            threshold: rule.threshold,
        };
        if let Err(e) = self
            .dispatcher
            .dispatch(NotificationTarget::email(recipient), context)
        {
            error!("Failed to queue alert notification for {}: {:#}", rule.name, e);
        }
    }
}
