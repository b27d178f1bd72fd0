use super::context::JobContext;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during job execution.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found")]
    NotFound,
    #[error("Job is already running")]
    AlreadyRunning,
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Job was cancelled")]
    Cancelled,
    #[error("Job timed out")]
    Timeout,
}

impl From<anyhow::Error> for JobError {
    fn from(e: anyhow::Error) -> Self {
        JobError::ExecutionFailed(format!("{:#}", e))
    }
}

/// A recurring job driven by the scheduler loop.
///
/// `id()` is the handler key: it names the persisted scheduled task and keys
/// the reentrancy guard, so two executions of the same job never overlap.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// How often the job should run. Written to the task store at registration.
    fn interval(&self) -> Duration;

    /// Run once. Implementations should check `ctx.is_cancelled()` between
    /// units of work and return `JobError::Cancelled` when it is set.
    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}
