//! Periodic alert rule evaluation.

use crate::alerts::AlertEngine;
use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct AlertEvaluationJob {
    engine: Arc<AlertEngine>,
    interval: Duration,
}

impl AlertEvaluationJob {
    pub fn new(engine: Arc<AlertEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }
}

#[async_trait]
impl BackgroundJob for AlertEvaluationJob {
    fn id(&self) -> &'static str {
        "alert_evaluation"
    }

    fn name(&self) -> &'static str {
        "Alert Evaluation"
    }

    fn description(&self) -> &'static str {
        "Evaluate enabled alert rules and notify on threshold breaches"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let fired = self.engine.evaluate(ctx.now)?;
        if !fired.is_empty() {
            info!("{} alert rule(s) fired: {:?}", fired.len(), fired);
        }
        Ok(())
    }
}
