//! Threshold alert rules evaluated against workflow metrics.

mod engine;
mod metric_source;
mod models;
mod store;

pub use engine::AlertEngine;
pub use metric_source::{MetricSource, WorkflowMetricSource};
pub use models::{AlertRule, AlertTrigger, ComparisonOperator, NewAlertRule};
pub use store::AlertStore;
