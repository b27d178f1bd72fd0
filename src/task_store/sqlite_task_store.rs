use super::models::{JobRun, JobRunStatus, ScheduledTask, TaskOutcome};
use super::schema::TASK_VERSIONED_SCHEMAS;
use super::TaskStore;
use crate::sqlite_persistence::{from_unix_millis, lock_conn, open_versioned, to_unix_millis};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

const TASK_COLUMNS: &str =
    "task_key, interval_secs, next_run_at, last_run_at, last_outcome, last_error";
const RUN_COLUMNS: &str =
    "id, job_id, started_at, finished_at, status, error_message, triggered_by";

impl SqliteTaskStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();
        let mut conn = Connection::open(path).context("Failed to open server database")?;
        open_versioned(&mut conn, TASK_VERSIONED_SCHEMAS, is_new_db, "server")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        open_versioned(&mut conn, TASK_VERSIONED_SCHEMAS, true, "server")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<ScheduledTask> {
        let interval_secs: i64 = row.get("interval_secs")?;
        let last_outcome: Option<String> = row.get("last_outcome")?;
        Ok(ScheduledTask {
            task_key: row.get("task_key")?,
            interval: Duration::from_secs(interval_secs.max(0) as u64),
            next_run_at: from_unix_millis(row.get("next_run_at")?),
            last_run_at: row.get::<_, Option<i64>>("last_run_at")?.map(from_unix_millis),
            last_outcome: last_outcome.as_deref().and_then(TaskOutcome::parse),
            last_error: row.get("last_error")?,
        })
    }

    fn row_to_job_run(row: &rusqlite::Row) -> rusqlite::Result<JobRun> {
        let status: String = row.get("status")?;
        Ok(JobRun {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            started_at: from_unix_millis(row.get("started_at")?),
            finished_at: row.get::<_, Option<i64>>("finished_at")?.map(from_unix_millis),
            status: JobRunStatus::parse(&status).unwrap_or(JobRunStatus::Failed),
            error_message: row.get("error_message")?,
            triggered_by: row.get("triggered_by")?,
        })
    }
}

impl TaskStore for SqliteTaskStore {
    fn upsert_task(
        &self,
        task_key: &str,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<ScheduledTask> {
        let conn = lock_conn(&self.conn)?;
        // A persisted next_run_at survives restarts; only the interval is refreshed.
        conn.execute(
            "INSERT INTO scheduled_tasks (task_key, interval_secs, next_run_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(task_key) DO UPDATE SET interval_secs = ?2",
            params![task_key, interval.as_secs() as i64, to_unix_millis(&now)],
        )?;
        let task = conn.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE task_key = ?1"),
            params![task_key],
            Self::row_to_task,
        )?;
        Ok(task)
    }

    fn get_task(&self, task_key: &str) -> Result<Option<ScheduledTask>> {
        let conn = lock_conn(&self.conn)?;
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE task_key = ?1"),
                params![task_key],
                Self::row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks ORDER BY task_key"
        ))?;
        let tasks = stmt
            .query_map([], Self::row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    fn due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks
             WHERE next_run_at <= ?1 ORDER BY next_run_at, task_key"
        ))?;
        let tasks = stmt
            .query_map(params![to_unix_millis(&now)], Self::row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    fn record_task_attempt(
        &self,
        task_key: &str,
        ran_at: DateTime<Utc>,
        outcome: TaskOutcome,
        error: Option<&str>,
    ) -> Result<ScheduledTask> {
        let conn = lock_conn(&self.conn)?;
        conn.execute(
            "UPDATE scheduled_tasks
             SET last_run_at = ?2, next_run_at = ?2 + interval_secs * 1000,
                 last_outcome = ?3, last_error = ?4
             WHERE task_key = ?1",
            params![task_key, to_unix_millis(&ran_at), outcome.as_str(), error],
        )?;
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE task_key = ?1"),
                params![task_key],
                Self::row_to_task,
            )
            .with_context(|| format!("Scheduled task {} not found", task_key))?;
        Ok(task)
    }

    fn record_job_start(&self, job_id: &str, triggered_by: &str) -> Result<i64> {
        let conn = lock_conn(&self.conn)?;
        conn.execute(
            "INSERT INTO job_runs (job_id, started_at, status, triggered_by)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                job_id,
                to_unix_millis(&Utc::now()),
                JobRunStatus::Running.as_str(),
                triggered_by
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn record_job_finish(
        &self,
        run_id: i64,
        status: JobRunStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let conn = lock_conn(&self.conn)?;
        conn.execute(
            "UPDATE job_runs SET finished_at = ?1, status = ?2, error_message = ?3 WHERE id = ?4",
            params![to_unix_millis(&Utc::now()), status.as_str(), error_message, run_id],
        )?;
        Ok(())
    }

    fn get_job_history(&self, job_id: &str, limit: usize) -> Result<Vec<JobRun>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM job_runs WHERE job_id = ?1
             ORDER BY started_at DESC, id DESC LIMIT ?2"
        ))?;
        let runs = stmt
            .query_map(params![job_id, limit as i64], Self::row_to_job_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>> {
        Ok(self.get_job_history(job_id, 1)?.into_iter().next())
    }

    fn mark_stale_jobs_failed(&self) -> Result<usize> {
        let conn = lock_conn(&self.conn)?;
        let count = conn.execute(
            "UPDATE job_runs SET status = ?1, finished_at = ?2, error_message = ?3
             WHERE status = ?4",
            params![
                JobRunStatus::Failed.as_str(),
                to_unix_millis(&Utc::now()),
                "Job was interrupted (server restart)",
                JobRunStatus::Running.as_str()
            ],
        )?;
        Ok(count)
    }
}
