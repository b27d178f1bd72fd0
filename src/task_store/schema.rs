//! SQLite schema for the server database: scheduled tasks and their run history.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Scheduled tasks and run history
// =============================================================================

const SCHEDULED_TASKS_TABLE_V1: Table = Table {
    name: "scheduled_tasks",
    columns: &[
        sqlite_column!("task_key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("interval_secs", &SqlType::Integer, non_null = true),
        sqlite_column!("next_run_at", &SqlType::Integer, non_null = true),
        sqlite_column!("last_run_at", &SqlType::Integer),
        sqlite_column!("last_outcome", &SqlType::Text),
        sqlite_column!("last_error", &SqlType::Text),
    ],
    indices: &[("idx_scheduled_tasks_next_run", "next_run_at")],
    unique_constraints: &[],
};

const JOB_RUNS_TABLE_V1: Table = Table {
    name: "job_runs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("job_id", &SqlType::Text, non_null = true),
        sqlite_column!("started_at", &SqlType::Integer, non_null = true),
        sqlite_column!("finished_at", &SqlType::Integer),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("triggered_by", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_job_runs_job_id_started", "job_id, started_at DESC"),
        ("idx_job_runs_status", "status"),
    ],
    unique_constraints: &[],
};

pub const TASK_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[SCHEDULED_TASKS_TABLE_V1, JOB_RUNS_TABLE_V1],
    migration: None,
}];
