mod models;
mod schema;
mod sqlite_task_store;

pub use models::*;
pub use schema::TASK_VERSIONED_SCHEMAS;
pub use sqlite_task_store::SqliteTaskStore;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub trait TaskStore: Send + Sync {
    // Scheduled tasks
    /// Register a task, or refresh the interval of an already persisted one.
    fn upsert_task(
        &self,
        task_key: &str,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<ScheduledTask>;
    fn get_task(&self, task_key: &str) -> Result<Option<ScheduledTask>>;
    fn list_tasks(&self) -> Result<Vec<ScheduledTask>>;
    /// Tasks whose next run is at or before `now`.
    fn due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>>;
    /// Stamp `last_run_at = ran_at` and `next_run_at = ran_at + interval`,
    /// regardless of the outcome.
    fn record_task_attempt(
        &self,
        task_key: &str,
        ran_at: DateTime<Utc>,
        outcome: TaskOutcome,
        error: Option<&str>,
    ) -> Result<ScheduledTask>;

    // Run history
    fn record_job_start(&self, job_id: &str, triggered_by: &str) -> Result<i64>;
    fn record_job_finish(
        &self,
        run_id: i64,
        status: JobRunStatus,
        error_message: Option<String>,
    ) -> Result<()>;
    fn get_job_history(&self, job_id: &str, limit: usize) -> Result<Vec<JobRun>>;
    fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>>;
    fn mark_stale_jobs_failed(&self) -> Result<usize>;
}
