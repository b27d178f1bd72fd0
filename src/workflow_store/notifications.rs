use super::{new_id, SqliteWorkflowStore};
use crate::notifications::{
    NotificationAttempt, NotificationKind, NotificationStatus, NotificationStore,
    NotificationTarget,
};
use crate::sqlite_persistence::{from_unix_millis, invalid_value, lock_conn, to_unix_millis};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

const ATTEMPT_COLUMNS: &str = "id, submitter_id, contract_id, recipient, channel, kind, subject, \
     attempt_count, status, last_error, provider_message_id, created_at, updated_at";

fn row_to_attempt(row: &rusqlite::Row) -> rusqlite::Result<NotificationAttempt> {
    let kind: String = row.get("kind")?;
    let status: String = row.get("status")?;
    Ok(NotificationAttempt {
        id: row.get("id")?,
        submitter_id: row.get("submitter_id")?,
        contract_id: row.get("contract_id")?,
        recipient: row.get("recipient")?,
        channel: row.get("channel")?,
        kind: NotificationKind::parse(&kind).ok_or_else(|| invalid_value("kind", &kind))?,
        subject: row.get("subject")?,
        attempt_count: row.get::<_, i64>("attempt_count")?.max(0) as u32,
        status: NotificationStatus::parse(&status)
            .ok_or_else(|| invalid_value("status", &status))?,
        last_error: row.get("last_error")?,
        provider_message_id: row.get("provider_message_id")?,
        created_at: from_unix_millis(row.get("created_at")?),
        updated_at: from_unix_millis(row.get("updated_at")?),
    })
}

impl NotificationStore for SqliteWorkflowStore {
    fn create_attempt(
        &self,
        target: &NotificationTarget,
        kind: NotificationKind,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<NotificationAttempt> {
        let conn = lock_conn(&self.conn)?;
        let id = new_id();
        conn.execute(
            "INSERT INTO notification_attempts (id, submitter_id, contract_id, recipient, channel,
                 kind, subject, attempt_count, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'email', ?5, ?6, 0, ?7, ?8, ?8)",
            params![
                id,
                target.submitter_id,
                target.contract_id,
                target.recipient,
                kind.as_str(),
                subject,
                NotificationStatus::Pending.as_str(),
                to_unix_millis(&now)
            ],
        )?;
        let attempt = conn.query_row(
            &format!("SELECT {ATTEMPT_COLUMNS} FROM notification_attempts WHERE id = ?1"),
            params![id],
            row_to_attempt,
        )?;
        Ok(attempt)
    }

    fn update_attempt(
        &self,
        attempt_id: &str,
        attempt_count: u32,
        status: NotificationStatus,
        last_error: Option<&str>,
        provider_message_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = lock_conn(&self.conn)?;
        conn.execute(
            "UPDATE notification_attempts
             SET attempt_count = ?2, status = ?3, last_error = COALESCE(?4, last_error),
                 provider_message_id = COALESCE(?5, provider_message_id), updated_at = ?6
             WHERE id = ?1",
            params![
                attempt_id,
                attempt_count as i64,
                status.as_str(),
                last_error,
                provider_message_id,
                to_unix_millis(&now)
            ],
        )?;
        Ok(())
    }

    fn get_attempt(&self, attempt_id: &str) -> Result<Option<NotificationAttempt>> {
        let conn = lock_conn(&self.conn)?;
        let attempt = conn
            .query_row(
                &format!("SELECT {ATTEMPT_COLUMNS} FROM notification_attempts WHERE id = ?1"),
                params![attempt_id],
                row_to_attempt,
            )
            .optional()?;
        Ok(attempt)
    }

    fn list_attempts_by_status(
        &self,
        status: NotificationStatus,
        limit: usize,
    ) -> Result<Vec<NotificationAttempt>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM notification_attempts
             WHERE status = ?1 ORDER BY updated_at DESC LIMIT ?2"
        ))?;
        let attempts = stmt
            .query_map(params![status.as_str(), limit as i64], row_to_attempt)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(attempts)
    }

    fn list_attempts_for_submitter(&self, submitter_id: &str) -> Result<Vec<NotificationAttempt>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM notification_attempts
             WHERE submitter_id = ?1 ORDER BY created_at, rowid"
        ))?;
        let attempts = stmt
            .query_map(params![submitter_id], row_to_attempt)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(attempts)
    }

    fn count_attempts_by_status(&self, status: NotificationStatus) -> Result<usize> {
        let conn = lock_conn(&self.conn)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notification_attempts WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
