//! Multi-party signature workflows: contracts, submitters and the
//! provider-driven state machine that moves them.

mod manager;
mod models;
mod provider;
mod store;

#[cfg(test)]
pub(crate) use manager::test_support;
pub use manager::{
    validate_submitters, ReconcileReport, SignatureWorkflowManager, SweepSummary, WorkflowError,
};
pub use models::{
    aggregate_status, Contract, ContractStatus, ContractWithSubmitters, EventOutcome,
    NewContract, NewSubmitter, OrderingMode, SigningEvent, SigningEventKind, Submitter,
    SubmitterRecord, SubmitterStatus,
};
pub use provider::{
    CreatedSubmission, CreatedSubmitter, HttpSigningProvider, RemoteSubmitterState,
    RemoteSubmitterStatus, SigningProvider,
};
pub use store::SigningStore;
