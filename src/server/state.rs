use axum::extract::FromRef;

use crate::alerts::AlertStore;
use crate::background_jobs::SchedulerHandle;
use crate::notifications::NotificationStore;
use crate::pipeline::{PipelineEngine, PipelineStore};
use crate::signing::SignatureWorkflowManager;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type OptionalWorkflowManager = Option<Arc<SignatureWorkflowManager>>;
pub type OptionalSchedulerHandle = Option<SchedulerHandle>;
pub type GuardedAlertStore = Arc<dyn AlertStore>;
pub type GuardedNotificationStore = Arc<dyn NotificationStore>;
pub type GuardedPipelineStore = Arc<dyn PipelineStore>;
pub type GuardedPipelineEngine = Arc<PipelineEngine>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    /// Absent when no signing provider is configured.
    pub workflow: OptionalWorkflowManager,
    pub scheduler_handle: OptionalSchedulerHandle,
    pub alert_store: GuardedAlertStore,
    pub notification_store: GuardedNotificationStore,
    pub pipeline_store: GuardedPipelineStore,
    pub pipeline_engine: GuardedPipelineEngine,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for OptionalWorkflowManager {
    fn from_ref(input: &ServerState) -> Self {
        input.workflow.clone()
    }
}

impl FromRef<ServerState> for OptionalSchedulerHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.scheduler_handle.clone()
    }
}

impl FromRef<ServerState> for GuardedAlertStore {
    fn from_ref(input: &ServerState) -> Self {
        input.alert_store.clone()
    }
}

impl FromRef<ServerState> for GuardedNotificationStore {
    fn from_ref(input: &ServerState) -> Self {
        input.notification_store.clone()
    }
}

impl FromRef<ServerState> for GuardedPipelineEngine {
    fn from_ref(input: &ServerState) -> Self {
        input.pipeline_engine.clone()
    }
}
