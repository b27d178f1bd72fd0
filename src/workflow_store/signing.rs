use super::{new_id, SqliteWorkflowStore};
use crate::signing::{
    aggregate_status, Contract, ContractStatus, NewContract, OrderingMode, SigningStore,
    Submitter, SubmitterRecord, SubmitterStatus,
};
use crate::sqlite_persistence::{from_unix_millis, invalid_value, lock_conn, to_unix_millis};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

const CONTRACT_COLUMNS: &str = "id, title, template_ref, status, ordering_mode, submission_id, \
     created_at, sent_at, completed_at, expires_at, updated_at";
const SUBMITTER_COLUMNS: &str = "id, contract_id, external_id, name, email, role, signing_order, \
     status, signing_url, notified_at, opened_at, completed_at, updated_at";
const OPEN_STATUSES: &str = "('SENT', 'IN_PROGRESS')";

fn row_to_contract(row: &rusqlite::Row) -> rusqlite::Result<Contract> {
    let status: String = row.get("status")?;
    let ordering_mode: String = row.get("ordering_mode")?;
    Ok(Contract {
        id: row.get("id")?,
        title: row.get("title")?,
        template_ref: row.get("template_ref")?,
        status: ContractStatus::parse(&status).ok_or_else(|| invalid_value("status", &status))?,
        ordering_mode: OrderingMode::parse(&ordering_mode)
            .ok_or_else(|| invalid_value("ordering_mode", &ordering_mode))?,
        submission_id: row.get("submission_id")?,
        created_at: from_unix_millis(row.get("created_at")?),
        sent_at: row.get::<_, Option<i64>>("sent_at")?.map(from_unix_millis),
        completed_at: row.get::<_, Option<i64>>("completed_at")?.map(from_unix_millis),
        expires_at: row.get::<_, Option<i64>>("expires_at")?.map(from_unix_millis),
        updated_at: from_unix_millis(row.get("updated_at")?),
    })
}

fn row_to_submitter(row: &rusqlite::Row) -> rusqlite::Result<Submitter> {
    let status: String = row.get("status")?;
    Ok(Submitter {
        id: row.get("id")?,
        contract_id: row.get("contract_id")?,
        external_id: row.get("external_id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        role: row.get("role")?,
        signing_order: row.get("signing_order")?,
        status: SubmitterStatus::parse(&status).ok_or_else(|| invalid_value("status", &status))?,
        signing_url: row.get("signing_url")?,
        notified_at: row.get::<_, Option<i64>>("notified_at")?.map(from_unix_millis),
        opened_at: row.get::<_, Option<i64>>("opened_at")?.map(from_unix_millis),
        completed_at: row.get::<_, Option<i64>>("completed_at")?.map(from_unix_millis),
        updated_at: from_unix_millis(row.get("updated_at")?),
    })
}

fn query_contract(conn: &Connection, contract_id: &str) -> Result<Option<Contract>> {
    let contract = conn
        .query_row(
            &format!("SELECT {CONTRACT_COLUMNS} FROM contracts WHERE id = ?1"),
            params![contract_id],
            row_to_contract,
        )
        .optional()?;
    Ok(contract)
}

fn query_submitters(conn: &Connection, contract_id: &str) -> Result<Vec<Submitter>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SUBMITTER_COLUMNS} FROM submitters WHERE contract_id = ?1
         ORDER BY signing_order IS NULL, signing_order, position"
    ))?;
    let submitters = stmt
        .query_map(params![contract_id], row_to_submitter)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(submitters)
}

impl SqliteWorkflowStore {
    fn query_contracts(&self, sql_where: &str, args: &[i64]) -> Result<Vec<Contract>> {
        let conn = lock_conn(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE {sql_where} ORDER BY updated_at, id"
        ))?;
        let contracts = stmt
            .query_map(params_from_iter(args.iter()), row_to_contract)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(contracts)
    }
}

impl SigningStore for SqliteWorkflowStore {
    fn create_contract(&self, new: &NewContract, now: DateTime<Utc>) -> Result<Contract> {
        let conn = lock_conn(&self.conn)?;
        let id = new_id();
        conn.execute(
            "INSERT INTO contracts (id, title, template_ref, status, ordering_mode, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id,
                new.title,
                new.template_ref,
                ContractStatus::Draft.as_str(),
                OrderingMode::Parallel.as_str(),
                to_unix_millis(&now)
            ],
        )?;
        query_contract(&conn, &id)?
            .ok_or_else(|| anyhow::anyhow!("Contract {} vanished after insert", id))
    }

    fn get_contract(&self, contract_id: &str) -> Result<Option<Contract>> {
        let conn = lock_conn(&self.conn)?;
        query_contract(&conn, contract_id)
    }

    fn delete_contract(&self, contract_id: &str) -> Result<bool> {
        let conn = lock_conn(&self.conn)?;
        let deleted = conn.execute("DELETE FROM contracts WHERE id = ?1", params![contract_id])?;
        Ok(deleted > 0)
    }

    fn list_contracts(&self, statuses: &[ContractStatus]) -> Result<Vec<Contract>> {
        if statuses.is_empty() {
            return self.query_contracts("1 = 1", &[]);
        }
        let list = statuses
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        self.query_contracts(&format!("status IN ({})", list), &[])
    }

    fn stale_contracts(&self, updated_before: DateTime<Utc>) -> Result<Vec<Contract>> {
        self.query_contracts(
            &format!("status IN {OPEN_STATUSES} AND updated_at <= ?1"),
            &[to_unix_millis(&updated_before)],
        )
    }

    fn overdue_contracts(&self, now: DateTime<Utc>) -> Result<Vec<Contract>> {
        self.query_contracts(
            &format!("status IN {OPEN_STATUSES} AND expires_at IS NOT NULL AND expires_at <= ?1"),
            &[to_unix_millis(&now)],
        )
    }

    fn mark_sent(
        &self,
        contract_id: &str,
        ordering_mode: OrderingMode,
        submission_id: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        submitters: &[SubmitterRecord],
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;
        let now_ts = to_unix_millis(&now);

        let updated = tx.execute(
            "UPDATE contracts
             SET status = ?2, ordering_mode = ?3, submission_id = ?4, expires_at = ?5,
                 sent_at = ?6, updated_at = ?6
             WHERE id = ?1 AND status = ?7",
            params![
                contract_id,
                ContractStatus::Sent.as_str(),
                ordering_mode.as_str(),
                submission_id,
                expires_at.as_ref().map(to_unix_millis),
                now_ts,
                ContractStatus::Draft.as_str()
            ],
        )?;
        if updated == 0 {
            // Dropping the transaction rolls it back.
            return Ok(false);
        }

        for (position, record) in submitters.iter().enumerate() {
            tx.execute(
                "INSERT INTO submitters (id, contract_id, external_id, name, email, role,
                     signing_order, status, signing_url, updated_at, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id,
                    contract_id,
                    record.external_id,
                    record.submitter.name,
                    record.submitter.email,
                    record.submitter.role,
                    record.submitter.signing_order,
                    SubmitterStatus::Pending.as_str(),
                    record.signing_url,
                    now_ts,
                    position as i64
                ],
            )?;
        }
        tx.commit()?;
        Ok(true)
    }

    fn list_submitters(&self, contract_id: &str) -> Result<Vec<Submitter>> {
        let conn = lock_conn(&self.conn)?;
        query_submitters(&conn, contract_id)
    }

    fn get_submitter(&self, submitter_id: &str) -> Result<Option<Submitter>> {
        let conn = lock_conn(&self.conn)?;
        let submitter = conn
            .query_row(
                &format!("SELECT {SUBMITTER_COLUMNS} FROM submitters WHERE id = ?1"),
                params![submitter_id],
                row_to_submitter,
            )
            .optional()?;
        Ok(submitter)
    }

    fn find_submitter_by_external_id(&self, external_id: &str) -> Result<Option<Submitter>> {
        let conn = lock_conn(&self.conn)?;
        let submitter = conn
            .query_row(
                &format!("SELECT {SUBMITTER_COLUMNS} FROM submitters WHERE external_id = ?1"),
                params![external_id],
                row_to_submitter,
            )
            .optional()?;
        Ok(submitter)
    }

    fn transition_submitter(
        &self,
        submitter_id: &str,
        from: SubmitterStatus,
        to: SubmitterStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let stamp = match to {
            SubmitterStatus::Notified => ", notified_at = ?4",
            SubmitterStatus::Opened => ", opened_at = ?4",
            SubmitterStatus::Completed => ", completed_at = ?4",
            _ => "",
        };
        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;
        let at_ts = to_unix_millis(&at);
        // The owning contract must still be open at write time, so an expiry
        // committed after the caller's read cannot be followed by a move.
        let updated = tx.execute(
            &format!(
                "UPDATE submitters SET status = ?3, updated_at = ?4{stamp}
                 WHERE id = ?1 AND status = ?2
                   AND EXISTS (SELECT 1 FROM contracts
                               WHERE contracts.id = submitters.contract_id
                                 AND contracts.status IN {OPEN_STATUSES})"
            ),
            params![submitter_id, from.as_str(), to.as_str(), at_ts],
        )?;
        if updated == 0 {
            return Ok(false);
        }
        tx.execute(
            "UPDATE contracts SET updated_at = ?2
             WHERE id = (SELECT contract_id FROM submitters WHERE id = ?1)",
            params![submitter_id, at_ts],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn refresh_contract_status(
        &self,
        contract_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ContractStatus>> {
        let conn = lock_conn(&self.conn)?;
        let Some(contract) = query_contract(&conn, contract_id)? else {
            return Ok(None);
        };
        if !contract.status.is_open() {
            return Ok(Some(contract.status));
        }
        let submitters = query_submitters(&conn, contract_id)?;
        let status = aggregate_status(contract.status, &submitters);
        if status != contract.status {
            let now_ts = to_unix_millis(&now);
            conn.execute(
                "UPDATE contracts SET status = ?2, updated_at = ?3,
                     completed_at = CASE WHEN ?2 = 'COMPLETED' THEN ?3 ELSE completed_at END
                 WHERE id = ?1 AND status = ?4",
                params![contract_id, status.as_str(), now_ts, contract.status.as_str()],
            )?;
        }
        Ok(Some(status))
    }

    fn expire_contract(&self, contract_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction()?;
        let now_ts = to_unix_millis(&now);
        let updated = tx.execute(
            &format!(
                "UPDATE contracts SET status = ?2, updated_at = ?3
                 WHERE id = ?1 AND status IN {OPEN_STATUSES}"
            ),
            params![contract_id, ContractStatus::Expired.as_str(), now_ts],
        )?;
        if updated == 0 {
            return Ok(false);
        }
        tx.execute(
            "UPDATE submitters SET status = ?2, updated_at = ?3
             WHERE contract_id = ?1 AND status IN ('NOTIFIED', 'OPENED')",
            params![contract_id, SubmitterStatus::Expired.as_str(), now_ts],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn record_inbound_event(
        &self,
        event_id: &str,
        event_type: &str,
        received_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = lock_conn(&self.conn)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO inbound_events (event_id, event_type, received_at)
             VALUES (?1, ?2, ?3)",
            params![event_id, event_type, to_unix_millis(&received_at)],
        )?;
        Ok(inserted == 1)
    }

    fn forget_inbound_event(&self, event_id: &str) -> Result<bool> {
        let conn = lock_conn(&self.conn)?;
        let deleted = conn.execute(
            "DELETE FROM inbound_events WHERE event_id = ?1",
            params![event_id],
        )?;
        Ok(deleted > 0)
    }
}
