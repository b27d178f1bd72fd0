//! Signature workflow manager.
//!
//! Webhook deliveries and reconciliation sweeps both funnel into
//! [`SignatureWorkflowManager::apply_transition`], which only ever writes a
//! submitter status conditioned on the status it just read.

use super::models::{
    Contract, ContractStatus, ContractWithSubmitters, EventOutcome, NewContract, NewSubmitter,
    OrderingMode, SigningEvent, Submitter, SubmitterRecord, SubmitterStatus,
};
use super::provider::SigningProvider;
use super::store::SigningStore;
use crate::notifications::{NotificationDispatcher, NotificationTarget, TemplateContext};
use crate::provider_error::ProviderError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("concurrent update: {0}")]
    Conflict(String),
    #[error("out-of-order transition: {0}")]
    OutOfOrder(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub contract_id: String,
    pub applied: usize,
    pub discarded: usize,
    pub expired: bool,
    pub status: ContractStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    pub checked: usize,
    pub applied: usize,
    pub expired: usize,
    pub failed: usize,
}

pub struct SignatureWorkflowManager {
    store: Arc<dyn SigningStore>,
    provider: Arc<dyn SigningProvider>,
    dispatcher: NotificationDispatcher,
    contract_ttl: Option<chrono::Duration>,
}

impl SignatureWorkflowManager {
    pub fn new(
        store: Arc<dyn SigningStore>,
        provider: Arc<dyn SigningProvider>,
        dispatcher: NotificationDispatcher,
        contract_ttl: Option<chrono::Duration>,
    ) -> Self {
        Self {
            store,
            provider,
            dispatcher,
            contract_ttl,
        }
    }

    // =========================================================================
    // Contract records
    // =========================================================================

    pub fn create_contract(&self, new: &NewContract) -> Result<Contract, WorkflowError> {
        if new.title.trim().is_empty() {
            return Err(WorkflowError::Validation("title must not be empty".into()));
        }
        if new.template_ref.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "template_ref must not be empty".into(),
            ));
        }
        let contract = self.store.create_contract(new, Utc::now())?;
        info!("Created contract {} ({})", contract.id, contract.title);
        Ok(contract)
    }

    pub fn get_contract(&self, contract_id: &str) -> Result<ContractWithSubmitters, WorkflowError> {
        let contract = self.load_contract(contract_id)?;
        let submitters = self.store.list_submitters(contract_id)?;
        Ok(ContractWithSubmitters {
            contract,
            submitters,
        })
    }

    pub fn delete_contract(&self, contract_id: &str) -> Result<(), WorkflowError> {
        if !self.store.delete_contract(contract_id)? {
            return Err(WorkflowError::NotFound(format!("contract {}", contract_id)));
        }
        info!("Deleted contract {}", contract_id);
        Ok(())
    }

    fn load_contract(&self, contract_id: &str) -> Result<Contract, WorkflowError> {
        self.store
            .get_contract(contract_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("contract {}", contract_id)))
    }

    // =========================================================================
    // Send
    // =========================================================================

    /// Submit a DRAFT contract to the signing provider and notify the first wave.
    pub async fn send(
        &self,
        contract_id: &str,
        mut submitters: Vec<NewSubmitter>,
        ordering_mode: OrderingMode,
    ) -> Result<ContractWithSubmitters, WorkflowError> {
        validate_submitters(&submitters, ordering_mode)?;

        let contract = self.load_contract(contract_id)?;
        if contract.status != ContractStatus::Draft {
            return Err(WorkflowError::Validation(format!(
                "contract {} is {}, only DRAFT contracts can be sent",
                contract_id,
                contract.status.as_str()
            )));
        }

        if ordering_mode == OrderingMode::Sequential {
            submitters.sort_by_key(|s| s.signing_order);
        }

        let created = self
            .provider
            .create_submission(&contract.template_ref, ordering_mode, &submitters)
            .await?;
        let mut remote_by_email: HashMap<String, _> = created
            .submitters
            .into_iter()
            .map(|s| (normalize_email(&s.email), s))
            .collect();

        let records: Vec<SubmitterRecord> = submitters
            .into_iter()
            .map(|submitter| {
                let remote = remote_by_email.remove(&normalize_email(&submitter.email));
                SubmitterRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    external_id: remote.as_ref().map(|r| r.external_id.clone()),
                    signing_url: remote.and_then(|r| r.signing_url),
                    submitter,
                }
            })
            .collect();

        let now = Utc::now();
        let expires_at = self.contract_ttl.map(|ttl| now + ttl);
        let sent = self.store.mark_sent(
            contract_id,
            ordering_mode,
            Some(&created.submission_id),
            expires_at,
            &records,
            now,
        )?;
        if !sent {
            warn!(
                "Contract {} left DRAFT while submission {} was being created",
                contract_id, created.submission_id
            );
            return Err(WorkflowError::Conflict(format!(
                "contract {} is no longer DRAFT",
                contract_id
            )));
        }
        info!(
            "Contract {} sent as submission {} ({} submitters, {})",
            contract_id,
            created.submission_id,
            records.len(),
            ordering_mode.as_str()
        );

        let contract = self.load_contract(contract_id)?;
        self.advance(&contract)?;
        self.get_contract(contract_id)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Apply one inbound provider event. Delivering the same event id twice
    /// is a no-op.
    pub fn record_event(&self, event: &SigningEvent) -> Result<EventOutcome, WorkflowError> {
        let is_new =
            self.store
                .record_inbound_event(&event.event_id, event.kind.as_str(), Utc::now())?;
        if !is_new {
            info!("Duplicate event {} ignored", event.event_id);
            return Ok(EventOutcome::Duplicate);
        }

        let result = self.apply_event(event);
        if let Err(e) = &result {
            warn!(
                "Event {} failed ({}), dropping it from the ledger for redelivery",
                event.event_id, e
            );
            if let Err(forget_err) = self.store.forget_inbound_event(&event.event_id) {
                error!(
                    "Failed to drop event {} from the ledger: {:#}",
                    event.event_id, forget_err
                );
            }
        }
        result
    }

    fn apply_event(&self, event: &SigningEvent) -> Result<EventOutcome, WorkflowError> {
        let Some(submitter) = self.store.find_submitter_by_external_id(&event.submitter_ref)?
        else {
            warn!(
                "Event {} references unknown submitter {}",
                event.event_id, event.submitter_ref
            );
            return Ok(EventOutcome::UnknownSubmitter);
        };

        debug!(
            "Event {}: submitter {} {}",
            event.event_id,
            submitter.id,
            event.kind.as_str()
        );
        self.apply_transition(&submitter.id, event.kind.target_status())
    }

    /// Move a submitter to `target` if that is a legal forward step from its
    /// current status, then refresh the contract and advance a sequential
    /// workflow on completion.
    pub fn apply_transition(
        &self,
        submitter_id: &str,
        target: SubmitterStatus,
    ) -> Result<EventOutcome, WorkflowError> {
        let submitter = self
            .store
            .get_submitter(submitter_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("submitter {}", submitter_id)))?;
        let contract = self.load_contract(&submitter.contract_id)?;

        if !contract.status.is_open() {
            warn!(
                "Discarding {} for submitter {}: contract {} is {}",
                target.as_str(),
                submitter.id,
                contract.id,
                contract.status.as_str()
            );
            return Ok(EventOutcome::OutOfOrder);
        }
        if submitter.status == target {
            debug!(
                "Submitter {} already {}, nothing to apply",
                submitter.id,
                target.as_str()
            );
            // An earlier delivery may have moved the submitter and then failed
            // before the contract caught up.
            self.settle(&contract, target)?;
            return Ok(EventOutcome::Ignored);
        }
        if !submitter.status.can_transition_to(target) {
            warn!(
                "Discarding out-of-order transition {} -> {} for submitter {} (contract {})",
                submitter.status.as_str(),
                target.as_str(),
                submitter.id,
                contract.id
            );
            return Ok(EventOutcome::OutOfOrder);
        }

        let applied =
            self.store
                .transition_submitter(&submitter.id, submitter.status, target, Utc::now())?;
        if !applied {
            warn!(
                "Concurrent update of submitter {}: {} -> {} dropped",
                submitter.id,
                submitter.status.as_str(),
                target.as_str()
            );
            return Ok(EventOutcome::Conflict);
        }
        info!(
            "Submitter {} {} -> {} (contract {})",
            submitter.id,
            submitter.status.as_str(),
            target.as_str(),
            contract.id
        );

        self.settle(&contract, target)?;
        Ok(EventOutcome::Applied)
    }

    /// Recompute the aggregate status after a submitter reached `target`, and
    /// notify the next signer when that was a completion.
    fn settle(&self, contract: &Contract, target: SubmitterStatus) -> Result<(), WorkflowError> {
        let status = self
            .store
            .refresh_contract_status(&contract.id, Utc::now())?
            .unwrap_or(contract.status);
        if status != contract.status {
            info!(
                "Contract {} {} -> {}",
                contract.id,
                contract.status.as_str(),
                status.as_str()
            );
        }

        if target == SubmitterStatus::Completed && status.is_open() {
            let contract = self.load_contract(&contract.id)?;
            self.advance(&contract)?;
        }
        Ok(())
    }

    /// Notify whoever is next. PARALLEL: every PENDING submitter. SEQUENTIAL:
    /// the lowest-order submitter that has not completed, if still PENDING.
    fn advance(&self, contract: &Contract) -> Result<usize, WorkflowError> {
        if !contract.status.is_open() {
            return Ok(0);
        }
        let submitters = self.store.list_submitters(&contract.id)?;
        let wave: Vec<&Submitter> = match contract.ordering_mode {
            OrderingMode::Parallel => submitters
                .iter()
                .filter(|s| s.status == SubmitterStatus::Pending)
                .collect(),
            OrderingMode::Sequential => submitters
                .iter()
                .filter(|s| s.status != SubmitterStatus::Completed)
                .min_by_key(|s| s.signing_order)
                .filter(|s| s.status == SubmitterStatus::Pending)
                .into_iter()
                .collect(),
        };

        let mut notified = 0;
        for submitter in wave {
            if self.notify(contract, submitter)? {
                notified += 1;
            }
        }
        Ok(notified)
    }

    fn notify(&self, contract: &Contract, submitter: &Submitter) -> Result<bool, WorkflowError> {
        let moved = self.store.transition_submitter(
            &submitter.id,
            SubmitterStatus::Pending,
            SubmitterStatus::Notified,
            Utc::now(),
        )?;
        if !moved {
            debug!(
                "Submitter {} not notified: a concurrent path notified it or closed contract {}",
                submitter.id, contract.id
            );
            return Ok(false);
        }

        let target = NotificationTarget {
            recipient: submitter.email.clone(),
            submitter_id: Some(submitter.id.clone()),
            contract_id: Some(contract.id.clone()),
        };
        let context = TemplateContext::SigningRequest {
            contract_title: contract.title.clone(),
            recipient_name: submitter.name.clone(),
            signing_link: submitter.signing_url.clone(),
        };
        // Delivery problems never hold the workflow back.
        if let Err(e) = self.dispatcher.dispatch(target, context) {
            error!(
                "Failed to queue notification for submitter {}: {:#}",
                submitter.id, e
            );
        }
        info!(
            "Notified submitter {} (order {:?}) on contract {}",
            submitter.id, submitter.signing_order, contract.id
        );
        Ok(true)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Pull authoritative submitter states from the provider and apply any
    /// transition not yet observed locally.
    pub async fn reconcile(&self, contract_id: &str) -> Result<ReconcileReport, WorkflowError> {
        let contract = self.load_contract(contract_id)?;
        let mut report = ReconcileReport {
            contract_id: contract_id.to_string(),
            applied: 0,
            discarded: 0,
            expired: false,
            status: contract.status,
        };
        if !contract.status.is_open() {
            return Ok(report);
        }

        let now = Utc::now();
        if contract.expires_at.is_some_and(|expires| expires <= now) {
            report.expired = self.expire(&contract, now)?;
            report.status = self.load_contract(contract_id)?.status;
            return Ok(report);
        }

        let Some(submission_id) = contract.submission_id.as_deref() else {
            warn!("Contract {} has no submission id to reconcile", contract_id);
            return Ok(report);
        };

        let remote = self.provider.get_status(submission_id).await?;
        let locals = self.store.list_submitters(contract_id)?;

        // Walk in signing order so a completion can advance the next signer
        // before that signer's own remote state is applied.
        let mut steps = Vec::new();
        for local in &locals {
            let found = remote.iter().find(|r| {
                local.external_id.as_deref() == Some(r.external_id.as_str())
                    || normalize_email(&r.email) == normalize_email(&local.email)
            });
            if let Some(kind) = found.and_then(|r| r.state.as_event_kind()) {
                steps.push((local.id.clone(), kind.target_status()));
            }
        }

        for (submitter_id, target) in steps {
            let Some(current) = self.store.get_submitter(&submitter_id)? else {
                continue;
            };
            if current.status == target || current.status.is_terminal() {
                continue;
            }
            match self.apply_transition(&submitter_id, target)? {
                EventOutcome::Applied => report.applied += 1,
                _ => report.discarded += 1,
            }
        }

        report.status = self.load_contract(contract_id)?.status;
        if report.applied > 0 {
            info!(
                "Reconciled contract {}: {} transition(s) applied, now {}",
                contract_id,
                report.applied,
                report.status.as_str()
            );
        }
        Ok(report)
    }

    /// Expire overdue contracts, then reconcile every open contract not
    /// updated since `stale_threshold`. A failing contract does not stop the sweep.
    pub async fn reconcile_stale(
        &self,
        now: DateTime<Utc>,
        stale_threshold: chrono::Duration,
    ) -> Result<SweepSummary, WorkflowError> {
        let mut summary = SweepSummary::default();

        for contract in self.store.overdue_contracts(now)? {
            if self.expire(&contract, now)? {
                summary.expired += 1;
            }
        }

        for contract in self.store.stale_contracts(now - stale_threshold)? {
            summary.checked += 1;
            match self.reconcile(&contract.id).await {
                Ok(report) => summary.applied += report.applied,
                Err(e) => {
                    summary.failed += 1;
                    warn!("Reconciliation of contract {} failed: {}", contract.id, e);
                }
            }
        }
        Ok(summary)
    }

    fn expire(&self, contract: &Contract, now: DateTime<Utc>) -> Result<bool, WorkflowError> {
        let expired = self.store.expire_contract(&contract.id, now)?;
        if expired {
            info!(
                "Contract {} expired (window ended {:?})",
                contract.id, contract.expires_at
            );
        }
        Ok(expired)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Reject submitter lists with blank or duplicate emails, or, in SEQUENTIAL
/// mode, missing or duplicate signing orders.
pub fn validate_submitters(
    submitters: &[NewSubmitter],
    ordering_mode: OrderingMode,
) -> Result<(), WorkflowError> {
    if submitters.is_empty() {
        return Err(WorkflowError::Validation(
            "at least one submitter is required".into(),
        ));
    }

    let mut emails = HashSet::new();
    for submitter in submitters {
        let email = normalize_email(&submitter.email);
        if email.is_empty() || !email.contains('@') {
            return Err(WorkflowError::Validation(format!(
                "invalid submitter email '{}'",
                submitter.email
            )));
        }
        if !emails.insert(email) {
            return Err(WorkflowError::Validation(format!(
                "duplicate submitter email '{}'",
                submitter.email
            )));
        }
    }

    if ordering_mode == OrderingMode::Sequential {
        let mut orders = HashSet::new();
        for submitter in submitters {
            let order = submitter.signing_order.ok_or_else(|| {
                WorkflowError::Validation(format!(
                    "submitter '{}' has no signing order",
                    submitter.email
                ))
            })?;
            if !orders.insert(order) {
                return Err(WorkflowError::Validation(format!(
                    "duplicate signing order {}",
                    order
                )));
            }
        }
    }
    Ok(())
}
