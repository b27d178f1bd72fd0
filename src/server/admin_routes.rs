//! Admin HTTP routes.
//!
//! Every handler requires an [`AdminSession`]:
//! - contracts: create, inspect, delete, send, reconcile
//! - jobs: list, inspect, history, manual trigger
//! - notifications: permanently failed deliveries
//! - alerts: rules and trigger history
//! - pipeline: entities, manual stage edits, transition rules

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::alerts::NewAlertRule;
use crate::background_jobs::{JobError, SchedulerHandle};
use crate::notifications::NotificationStatus;
use crate::pipeline::{NewPipelineEntity, NewTransitionRule, StageEdit};
use crate::signing::{
    NewContract, NewSubmitter, OrderingMode, SignatureWorkflowManager, WorkflowError,
};

use super::session::AdminSession;
use super::state::{
    GuardedAlertStore, GuardedNotificationStore, GuardedPipelineEngine, OptionalSchedulerHandle,
    OptionalWorkflowManager, ServerState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct SendContractBody {
    submitters: Vec<NewSubmitter>,
    #[serde(default)]
    ordering_mode: Option<OrderingMode>,
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct TriggersQuery {
    #[serde(default)]
    rule_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
struct StageEditBody {
    expected_stage: String,
    expected_version: i64,
    stage: String,
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = match &self {
            WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::Conflict(_) | WorkflowError::OutOfOrder(_) => StatusCode::CONFLICT,
            WorkflowError::Provider(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            WorkflowError::Provider(_) => StatusCode::BAD_GATEWAY,
            WorkflowError::Storage(e) => {
                warn!("Storage failure in signing workflow: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_response(status, self.to_string())
    }
}

fn get_workflow(
    workflow: &OptionalWorkflowManager,
) -> Result<&Arc<SignatureWorkflowManager>, Response> {
    workflow.as_ref().ok_or_else(|| {
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "signing workflow is not configured",
        )
    })
}

fn get_scheduler(scheduler: &OptionalSchedulerHandle) -> Result<&SchedulerHandle, Response> {
    scheduler.as_ref().ok_or_else(|| {
        error_response(StatusCode::SERVICE_UNAVAILABLE, "scheduler is not running")
    })
}

fn require_non_empty(field: &str, value: &str) -> Result<(), Response> {
    if value.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("{} must not be empty", field),
        ));
    }
    Ok(())
}

// =============================================================================
// Contracts
// =============================================================================

async fn create_contract(
    _session: AdminSession,
    State(workflow): State<OptionalWorkflowManager>,
    Json(body): Json<NewContract>,
) -> Response {
    let manager = match get_workflow(&workflow) {
        Ok(m) => m,
        Err(e) => return e,
    };
    match manager.create_contract(&body) {
        Ok(contract) => {
            info!("Created contract {} ({})", contract.id, contract.title);
            (StatusCode::CREATED, Json(contract)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn get_contract(
    _session: AdminSession,
    State(workflow): State<OptionalWorkflowManager>,
    Path(contract_id): Path<String>,
) -> Response {
    let manager = match get_workflow(&workflow) {
        Ok(m) => m,
        Err(e) => return e,
    };
    match manager.get_contract(&contract_id) {
        Ok(contract) => Json(contract).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn delete_contract(
    _session: AdminSession,
    State(workflow): State<OptionalWorkflowManager>,
    Path(contract_id): Path<String>,
) -> Response {
    let manager = match get_workflow(&workflow) {
        Ok(m) => m,
        Err(e) => return e,
    };
    match manager.delete_contract(&contract_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn send_contract(
    _session: AdminSession,
    State(workflow): State<OptionalWorkflowManager>,
    Path(contract_id): Path<String>,
    Json(body): Json<SendContractBody>,
) -> Response {
    let manager = match get_workflow(&workflow) {
        Ok(m) => m,
        Err(e) => return e,
    };
    let ordering_mode = body.ordering_mode.unwrap_or(OrderingMode::Sequential);
    match manager
        .send(&contract_id, body.submitters, ordering_mode)
        .await
    {
        Ok(contract) => Json(contract).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn reconcile_contract(
    _session: AdminSession,
    State(workflow): State<OptionalWorkflowManager>,
    Path(contract_id): Path<String>,
) -> Response {
    let manager = match get_workflow(&workflow) {
        Ok(m) => m,
        Err(e) => return e,
    };
    match manager.reconcile(&contract_id).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => e.into_response(),
    }
}

// =============================================================================
// Jobs
// =============================================================================

async fn list_jobs(
    _session: AdminSession,
    State(scheduler): State<OptionalSchedulerHandle>,
) -> Response {
    let scheduler = match get_scheduler(&scheduler) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match scheduler.list_jobs().await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => {
            warn!("Failed to list jobs: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list jobs")
        }
    }
}

async fn get_job(
    _session: AdminSession,
    State(scheduler): State<OptionalSchedulerHandle>,
    Path(job_id): Path<String>,
) -> Response {
    let scheduler = match get_scheduler(&scheduler) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match scheduler.get_job(&job_id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to get job {}: {:#}", job_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get job")
        }
    }
}

async fn get_job_history(
    _session: AdminSession,
    State(scheduler): State<OptionalSchedulerHandle>,
    Path(job_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let scheduler = match get_scheduler(&scheduler) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match scheduler.get_job_history(&job_id, query.limit) {
        Ok(history) => Json(history).into_response(),
        Err(e) => {
            warn!("Failed to get history of job {}: {:#}", job_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get job history")
        }
    }
}

async fn trigger_job(
    _session: AdminSession,
    State(scheduler): State<OptionalSchedulerHandle>,
    Path(job_id): Path<String>,
) -> Response {
    let scheduler = match get_scheduler(&scheduler) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match scheduler.trigger_job(&job_id).await {
        Ok(()) => {
            info!("Manually triggered job {}", job_id);
            StatusCode::ACCEPTED.into_response()
        }
        Err(JobError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(e @ JobError::AlreadyRunning) => error_response(StatusCode::CONFLICT, e.to_string()),
        Err(e) => {
            warn!("Failed to trigger job {}: {}", job_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// =============================================================================
// Notifications
// =============================================================================

async fn list_failed_notifications(
    _session: AdminSession,
    State(store): State<GuardedNotificationStore>,
    Query(query): Query<LimitQuery>,
) -> Response {
    match store.list_attempts_by_status(NotificationStatus::FailedPermanent, query.limit) {
        Ok(attempts) => Json(attempts).into_response(),
        Err(e) => {
            warn!("Failed to list failed notifications: {:#}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list notifications",
            )
        }
    }
}

// =============================================================================
// Alerts
// =============================================================================

async fn list_alert_rules(
    _session: AdminSession,
    State(store): State<GuardedAlertStore>,
) -> Response {
    match store.list_rules() {
        Ok(rules) => Json(rules).into_response(),
        Err(e) => {
            warn!("Failed to list alert rules: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list rules")
        }
    }
}

async fn create_alert_rule(
    _session: AdminSession,
    State(store): State<GuardedAlertStore>,
    Json(body): Json<NewAlertRule>,
) -> Response {
    if let Err(e) = require_non_empty("name", &body.name)
        .and_then(|_| require_non_empty("metric", &body.metric))
    {
        return e;
    }
    if !body.threshold.is_finite() {
        return error_response(StatusCode::BAD_REQUEST, "threshold must be a finite number");
    }
    match store.create_rule(&body, Utc::now()) {
        Ok(rule) => {
            info!("Created alert rule {} on {}", rule.id, rule.metric);
            (StatusCode::CREATED, Json(rule)).into_response()
        }
        Err(e) => {
            warn!("Failed to create alert rule: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create rule")
        }
    }
}

async fn delete_alert_rule(
    _session: AdminSession,
    State(store): State<GuardedAlertStore>,
    Path(rule_id): Path<String>,
) -> Response {
    match store.delete_rule(&rule_id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to delete alert rule {}: {:#}", rule_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete rule")
        }
    }
}

async fn list_alert_triggers(
    _session: AdminSession,
    State(store): State<GuardedAlertStore>,
    Query(query): Query<TriggersQuery>,
) -> Response {
    match store.list_triggers(query.rule_id.as_deref(), query.limit) {
        Ok(triggers) => Json(triggers).into_response(),
        Err(e) => {
            warn!("Failed to list alert triggers: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list triggers")
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

async fn list_pipeline_entities(
    _session: AdminSession,
    State(state): State<ServerState>,
) -> Response {
    match state.pipeline_store.list_entities() {
        Ok(entities) => Json(entities).into_response(),
        Err(e) => {
            warn!("Failed to list pipeline entities: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list entities")
        }
    }
}

async fn create_pipeline_entity(
    _session: AdminSession,
    State(state): State<ServerState>,
    Json(body): Json<NewPipelineEntity>,
) -> Response {
    if let Err(e) = require_non_empty("name", &body.name)
        .and_then(|_| require_non_empty("stage", &body.stage))
    {
        return e;
    }
    match state.pipeline_store.create_entity(&body, Utc::now()) {
        Ok(entity) => {
            info!("Created pipeline entity {} in {}", entity.id, entity.stage);
            (StatusCode::CREATED, Json(entity)).into_response()
        }
        Err(e) => {
            warn!("Failed to create pipeline entity: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create entity")
        }
    }
}

async fn set_pipeline_stage(
    _session: AdminSession,
    State(engine): State<GuardedPipelineEngine>,
    Path(entity_id): Path<String>,
    Json(body): Json<StageEditBody>,
) -> Response {
    if let Err(e) = require_non_empty("stage", &body.stage) {
        return e;
    }
    match engine.set_stage(
        &entity_id,
        &body.expected_stage,
        body.expected_version,
        &body.stage,
        Utc::now(),
    ) {
        Ok(StageEdit::Applied(entity)) => Json(entity).into_response(),
        Ok(StageEdit::Conflict(current)) => (StatusCode::CONFLICT, Json(current)).into_response(),
        Ok(StageEdit::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to edit stage of {}: {:#}", entity_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to edit stage")
        }
    }
}

async fn list_pipeline_transitions(
    _session: AdminSession,
    State(state): State<ServerState>,
    Path(entity_id): Path<String>,
) -> Response {
    match state.pipeline_store.list_transitions(&entity_id) {
        Ok(transitions) => Json(transitions).into_response(),
        Err(e) => {
            warn!("Failed to list transitions of {}: {:#}", entity_id, e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list transitions",
            )
        }
    }
}

async fn list_pipeline_rules(
    _session: AdminSession,
    State(state): State<ServerState>,
) -> Response {
    match state.pipeline_store.list_rules() {
        Ok(rules) => Json(rules).into_response(),
        Err(e) => {
            warn!("Failed to list pipeline rules: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list rules")
        }
    }
}

async fn create_pipeline_rule(
    _session: AdminSession,
    State(state): State<ServerState>,
    Json(body): Json<NewTransitionRule>,
) -> Response {
    if let Err(e) = require_non_empty("from_stage", &body.from_stage)
        .and_then(|_| require_non_empty("to_stage", &body.to_stage))
    {
        return e;
    }
    match state.pipeline_store.create_rule(&body) {
        Ok(rule) => {
            info!(
                "Created pipeline rule {}: {} -> {}",
                rule.id, rule.from_stage, rule.to_stage
            );
            (StatusCode::CREATED, Json(rule)).into_response()
        }
        Err(e) => {
            warn!("Failed to create pipeline rule: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create rule")
        }
    }
}

// =============================================================================
// Router Construction
// =============================================================================

pub fn admin_routes() -> Router<ServerState> {
    let contract_routes = Router::new()
        .route("/contracts", post(create_contract))
        .route("/contracts/{id}", get(get_contract).delete(delete_contract))
        .route("/contracts/{id}/send", post(send_contract))
        .route("/contracts/{id}/reconcile", post(reconcile_contract));

    let job_routes = Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/history", get(get_job_history))
        .route("/jobs/{id}/trigger", post(trigger_job));

    let alert_routes = Router::new()
        .route("/rules", get(list_alert_rules).post(create_alert_rule))
        .route("/rules/{id}", delete(delete_alert_rule))
        .route("/triggers", get(list_alert_triggers));

    let pipeline_routes = Router::new()
        .route(
            "/entities",
            get(list_pipeline_entities).post(create_pipeline_entity),
        )
        .route("/entities/{id}/stage", put(set_pipeline_stage))
        .route("/entities/{id}/transitions", get(list_pipeline_transitions))
        .route("/rules", get(list_pipeline_rules).post(create_pipeline_rule));

    contract_routes
        .merge(job_routes)
        .route("/notifications/failed", get(list_failed_notifications))
        .nest("/alerts", alert_routes)
        .nest("/pipeline", pipeline_routes)
}
