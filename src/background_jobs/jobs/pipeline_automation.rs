//! Periodic pipeline automation pass.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError},
};
use crate::pipeline::PipelineEngine;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct PipelineAutomationJob {
    engine: Arc<PipelineEngine>,
    interval: Duration,
}

impl PipelineAutomationJob {
    pub fn new(engine: Arc<PipelineEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }
}

#[async_trait]
impl BackgroundJob for PipelineAutomationJob {
    fn id(&self) -> &'static str {
        "pipeline_automation"
    }

    fn name(&self) -> &'static str {
        "Pipeline Automation"
    }

    fn description(&self) -> &'static str {
        "Apply stage transition rules to pipeline entities"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let summary = self.engine.run_once(ctx.now)?;
        if summary.transitioned > 0 || summary.conflicts > 0 {
            info!(
                "Pipeline automation: {} moved, {} conflicts, {} failed",
                summary.transitioned, summary.conflicts, summary.failed
            );
        }
        Ok(())
    }
}
