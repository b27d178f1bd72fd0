//! Reconciliation sweep for signing workflows.
//!
//! Covers webhook deliveries that never arrived: expires overdue contracts,
//! then asks the signing provider for the state of every open contract that
//! has not changed within the stale threshold.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError},
};
use crate::signing::SignatureWorkflowManager;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct ContractReconciliationJob {
    manager: Arc<SignatureWorkflowManager>,
    interval: Duration,
    stale_threshold: chrono::Duration,
}

impl ContractReconciliationJob {
    pub fn new(
        manager: Arc<SignatureWorkflowManager>,
        interval: Duration,
        stale_threshold: Duration,
    ) -> Self {
        Self {
            manager,
            interval,
            stale_threshold: chrono::Duration::from_std(stale_threshold)
                .unwrap_or(chrono::Duration::hours(1)),
        }
    }
}

#[async_trait]
impl BackgroundJob for ContractReconciliationJob {
    fn id(&self) -> &'static str {
        "contract_reconciliation"
    }

    fn name(&self) -> &'static str {
        "Contract Reconciliation"
    }

    fn description(&self) -> &'static str {
        "Expire overdue contracts and reconcile stale ones against the signing provider"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let summary = self
            .manager
            .reconcile_stale(ctx.now, self.stale_threshold)
            .await
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        info!(
            "Reconciliation: {} checked, {} transition(s) applied, {} expired, {} failed",
            summary.checked, summary.applied, summary.expired, summary.failed
        );
        if summary.failed > 0 && summary.failed == summary.checked {
            return Err(JobError::ExecutionFailed(format!(
                "all {} stale contract(s) failed to reconcile",
                summary.failed
            )));
        }
        Ok(())
    }
}
