use super::models::{
    Contract, ContractStatus, NewContract, OrderingMode, Submitter, SubmitterRecord,
    SubmitterStatus,
};
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Persistence for contracts, their submitters and the inbound event ledger.
///
/// Every status write is conditional on the status the caller last read; a
/// `false` return means another writer got there first.
pub trait SigningStore: Send + Sync {
    fn create_contract(&self, new: &NewContract, now: DateTime<Utc>) -> Result<Contract>;
    fn get_contract(&self, contract_id: &str) -> Result<Option<Contract>>;
    /// Deletes the contract and, by cascade, its submitters.
    fn delete_contract(&self, contract_id: &str) -> Result<bool>;
    fn list_contracts(&self, statuses: &[ContractStatus]) -> Result<Vec<Contract>>;
    /// Open contracts whose last update is at or before `updated_before`.
    fn stale_contracts(&self, updated_before: DateTime<Utc>) -> Result<Vec<Contract>>;
    /// Open contracts whose expiry lies at or before `now`.
    fn overdue_contracts(&self, now: DateTime<Utc>) -> Result<Vec<Contract>>;

    /// Atomically moves a DRAFT contract to SENT and inserts its submitters as
    /// PENDING. Returns `false` without writing anything if the contract is no
    /// longer DRAFT.
    fn mark_sent(
        &self,
        contract_id: &str,
        ordering_mode: OrderingMode,
        submission_id: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        submitters: &[SubmitterRecord],
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Submitters ordered by signing order, then insertion order.
    fn list_submitters(&self, contract_id: &str) -> Result<Vec<Submitter>>;
    fn get_submitter(&self, submitter_id: &str) -> Result<Option<Submitter>>;
    fn find_submitter_by_external_id(&self, external_id: &str) -> Result<Option<Submitter>>;

    /// `UPDATE ... WHERE status = from`, and only while the owning contract is
    /// still SENT or IN_PROGRESS. Stamps the matching timestamp column.
    fn transition_submitter(
        &self,
        submitter_id: &str,
        from: SubmitterStatus,
        to: SubmitterStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Recompute the aggregate status from the submitters under one lock and
    /// persist it if it changed. Terminal and DRAFT contracts are left alone.
    fn refresh_contract_status(
        &self,
        contract_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ContractStatus>>;

    /// Expire an open contract: NOTIFIED/OPENED submitters become EXPIRED and
    /// the contract becomes EXPIRED. Returns `false` if it was no longer open.
    fn expire_contract(&self, contract_id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Insert-if-absent into the dedup ledger. `true` when the event is new.
    fn record_inbound_event(
        &self,
        event_id: &str,
        event_type: &str,
        received_at: DateTime<Utc>,
    ) -> Result<bool>;
    /// Drop a ledger entry whose processing failed, so a redelivery of the
    /// same event is applied rather than reported as a duplicate.
    fn forget_inbound_event(&self, event_id: &str) -> Result<bool>;
}
