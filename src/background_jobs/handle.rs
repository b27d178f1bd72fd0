use super::guard::RunningSet;
use super::job::{BackgroundJob, JobError};
use crate::task_store::{JobRun, ScheduledTask, TaskOutcome, TaskStore};
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Information about a registered job for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub interval_secs: u64,
    pub is_running: bool,
    pub next_run_at: Option<String>,
    pub last_outcome: Option<TaskOutcome>,
    pub last_error: Option<String>,
    pub last_run: Option<JobRunInfo>,
}

/// Serializable job run information.
#[derive(Debug, Clone, Serialize)]
pub struct JobRunInfo {
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub triggered_by: String,
}

impl From<JobRun> for JobRunInfo {
    fn from(run: JobRun) -> Self {
        JobRunInfo {
            started_at: run.started_at.to_rfc3339(),
            finished_at: run.finished_at.map(|dt| dt.to_rfc3339()),
            status: run.status.as_str().to_string(),
            error_message: run.error_message,
            triggered_by: run.triggered_by,
        }
    }
}

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    TriggerJob {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
}

/// Shared state between scheduler and handle.
pub struct SharedJobState {
    /// Set at registration, never changes afterwards.
    pub jobs: HashMap<String, Arc<dyn BackgroundJob>>,
}

/// Handle to interact with the job scheduler from HTTP handlers.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    shared_state: Arc<RwLock<SharedJobState>>,
    running: RunningSet,
    task_store: Arc<dyn TaskStore>,
}

impl SchedulerHandle {
    pub fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        shared_state: Arc<RwLock<SharedJobState>>,
        running: RunningSet,
        task_store: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            command_tx,
            shared_state,
            running,
            task_store,
        }
    }

    fn job_info(&self, job: &Arc<dyn BackgroundJob>) -> Result<JobInfo> {
        let task: Option<ScheduledTask> = self.task_store.get_task(job.id())?;
        let last_run = self.task_store.get_last_run(job.id())?.map(JobRunInfo::from);
        Ok(JobInfo {
            id: job.id().to_string(),
            name: job.name().to_string(),
            description: job.description().to_string(),
            interval_secs: job.interval().as_secs(),
            is_running: self.running.is_running(job.id()),
            next_run_at: task.as_ref().map(|t| t.next_run_at.to_rfc3339()),
            last_outcome: task.as_ref().and_then(|t| t.last_outcome),
            last_error: task.and_then(|t| t.last_error),
            last_run,
        })
    }

    /// All registered jobs, sorted by id.
    pub async fn list_jobs(&self) -> Result<Vec<JobInfo>> {
        let state = self.shared_state.read().await;
        let mut jobs = state
            .jobs
            .values()
            .map(|job| self.job_info(job))
            .collect::<Result<Vec<_>>>()?;
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobInfo>> {
        let state = self.shared_state.read().await;
        state.jobs.get(job_id).map(|job| self.job_info(job)).transpose()
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.running.is_running(job_id)
    }

    /// Trigger a job manually. Returns once the job has been started.
    pub async fn trigger_job(&self, job_id: &str) -> Result<(), JobError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(SchedulerCommand::TriggerJob {
                job_id: job_id.to_string(),
                response: response_tx,
            })
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler not available".to_string()))?;

        response_rx
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler did not respond".to_string()))?
    }

    pub fn get_job_history(&self, job_id: &str, limit: usize) -> Result<Vec<JobRunInfo>> {
        Ok(self
            .task_store
            .get_job_history(job_id, limit)?
            .into_iter()
            .map(JobRunInfo::from)
            .collect())
    }
}
