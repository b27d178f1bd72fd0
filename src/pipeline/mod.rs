//! Stage pipeline for tracked entities, advanced by ordered transition rules.

mod engine;
mod models;
mod store;

pub use engine::{PipelineEngine, PipelineRunSummary, StageEdit};
pub use models::{
    NewPipelineEntity, NewTransitionRule, PipelineEntity, StageTransition, TransitionCondition,
    TransitionRule,
};
pub use store::PipelineStore;
