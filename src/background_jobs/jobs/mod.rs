//! Recurring jobs driven by the scheduler loop.

pub mod alert_evaluation;
pub mod contract_reconciliation;
pub mod pipeline_automation;

pub use alert_evaluation::AlertEvaluationJob;
pub use contract_reconciliation::ContractReconciliationJob;
pub use pipeline_automation::PipelineAutomationJob;
