use crate::notifications::{NotificationStatus, NotificationStore};
use crate::pipeline::PipelineStore;
use crate::signing::{ContractStatus, SigningStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Supplies the current value of a named metric. `Ok(None)` means the
/// metric name is not known to this source.
pub trait MetricSource: Send + Sync {
    fn metric_value(&self, metric: &str, now: DateTime<Utc>) -> Result<Option<f64>>;
}

/// Metrics computed from workflow state:
///
/// - `contracts.status.<status>`: contracts currently in that status
/// - `contracts.open`: SENT plus IN_PROGRESS contracts
/// - `contracts.stale`: open contracts not updated within the stale threshold
/// - `notifications.failed` / `notifications.pending`: attempts by status
/// - `pipeline.stage.<stage>`: entities currently in that stage
pub struct WorkflowMetricSource {
    signing: Arc<dyn SigningStore>,
    notifications: Arc<dyn NotificationStore>,
    pipeline: Arc<dyn PipelineStore>,
    stale_threshold: chrono::Duration,
}

impl WorkflowMetricSource {
    pub fn new(
        signing: Arc<dyn SigningStore>,
        notifications: Arc<dyn NotificationStore>,
        pipeline: Arc<dyn PipelineStore>,
        stale_threshold: chrono::Duration,
    ) -> Self {
        Self {
            signing,
            notifications,
            pipeline,
            stale_threshold,
        }
    }
}

impl MetricSource for WorkflowMetricSource {
    fn metric_value(&self, metric: &str, now: DateTime<Utc>) -> Result<Option<f64>> {
        if let Some(status) = metric.strip_prefix("contracts.status.") {
            let Some(status) = ContractStatus::parse(&status.to_uppercase()) else {
                return Ok(None);
            };
            let count = self.signing.list_contracts(&[status])?.len();
            return Ok(Some(count as f64));
        }
        if let Some(stage) = metric.strip_prefix("pipeline.stage.") {
            let count = self
                .pipeline
                .list_entities()?
                .iter()
                .filter(|e| e.stage == stage)
                .count();
            return Ok(Some(count as f64));
        }

        let value = match metric {
            "contracts.open" => self
                .signing
                .list_contracts(&[ContractStatus::Sent, ContractStatus::InProgress])?
                .len(),
            "contracts.stale" => self
                .signing
                .stale_contracts(now - self.stale_threshold)?
                .len(),
            "notifications.failed" => self
                .notifications
                .count_attempts_by_status(NotificationStatus::FailedPermanent)?,
            "notifications.pending" => self
                .notifications
                .count_attempts_by_status(NotificationStatus::Pending)?,
            _ => return Ok(None),
        };
        Ok(Some(value as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::NewPipelineEntity;
    use crate::signing::NewContract;
    use crate::workflow_store::SqliteWorkflowStore;

    #[test]
    fn test_workflow_metrics() {
        let store = Arc::new(SqliteWorkflowStore::in_memory().unwrap());
        let source = WorkflowMetricSource::new(
            store.clone(),
            store.clone(),
            store.clone(),
            chrono::Duration::hours(1),
        );
        let now = Utc::now();
        for title in ["a", "b"] {
            store
                .create_contract(
                    &NewContract {
                        title: title.into(),
                        template_ref: "tpl".into(),
                    },
                    now,
                )
                .unwrap();
        }
        store
            .create_entity(
                &NewPipelineEntity {
                    name: "Lot 4".into(),
                    stage: "lead".into(),
                    contract_id: None,
                    owner_email: None,
                },
                now,
            )
            .unwrap();

        assert_eq!(
            source.metric_value("contracts.status.draft", now).unwrap(),
            Some(2.0)
        );
        assert_eq!(
            source.metric_value("contracts.status.SENT", now).unwrap(),
            Some(0.0)
        );
        assert_eq!(source.metric_value("contracts.open", now).unwrap(), Some(0.0));
        assert_eq!(
            source.metric_value("pipeline.stage.lead", now).unwrap(),
            Some(1.0)
        );
        assert_eq!(
            source.metric_value("notifications.failed", now).unwrap(),
            Some(0.0)
        );
        assert_eq!(source.metric_value("cpu.load", now).unwrap(), None);
        assert_eq!(
            source.metric_value("contracts.status.bogus", now).unwrap(),
            None
        );
    }
}
