use anyhow::{Context, Result};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::admin_routes::admin_routes;
use super::metrics::metrics_handler;
use super::webhook_routes::make_webhook_routes;
use super::{log_requests, state::ServerState};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub signing_enabled: bool,
    pub scheduler_running: bool,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        signing_enabled: state.workflow.is_some(),
        scheduler_running: state.scheduler_handle.is_some(),
    };
    Json(stats)
}

pub fn make_app(state: ServerState) -> Router {
    let webhook_routes: Router = make_webhook_routes(state.clone());

    let admin_routes: Router = admin_routes().with_state(state.clone());

    let home_router: Router = Router::new()
        .route("/", get(home))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone());

    home_router
        .nest("/v1/webhooks", webhook_routes)
        .nest("/v1/admin", admin_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

/// Serve on `0.0.0.0:<port>` until `shutdown` is cancelled. In-flight
/// requests are allowed to finish.
pub async fn run_server(state: ServerState, shutdown: CancellationToken) -> Result<()> {
    let port = state.config.port;
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::test_support::{fast_policy, FakeNotificationProvider};
    use crate::notifications::NotificationDispatcher;
    use crate::pipeline::PipelineEngine;
    use crate::server::ServerConfig;
    use crate::signing::test_support::FakeSigningProvider;
    use crate::signing::SignatureWorkflowManager;
    use crate::webhooks::{sign, SECRET_HEADER, SIGNATURE_HEADER};
    use crate::workflow_store::SqliteWorkflowStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Instant;
    use tower::ServiceExt; // for `oneshot`

    const SECRET: &str = "whsec-test";
    const ADMIN_TOKEN: &str = "admin-test-token";

    fn make_state(with_workflow: bool, config: ServerConfig) -> ServerState {
        let store = Arc::new(SqliteWorkflowStore::in_memory().unwrap());
        let dispatcher = NotificationDispatcher::new(
            Arc::new(FakeNotificationProvider::default()),
            store.clone(),
            fast_policy(1),
        );
        let workflow = with_workflow.then(|| {
            Arc::new(SignatureWorkflowManager::new(
                store.clone(),
                Arc::new(FakeSigningProvider::default()),
                dispatcher.clone(),
                None,
            ))
        });
        ServerState {
            config,
            start_time: Instant::now(),
            workflow,
            scheduler_handle: None,
            alert_store: store.clone(),
            notification_store: store.clone(),
            pipeline_store: store.clone(),
            pipeline_engine: Arc::new(PipelineEngine::new(store.clone(), store, dispatcher)),
        }
    }

    fn config() -> ServerConfig {
        ServerConfig {
            admin_token: Some(ADMIN_TOKEN.to_string()),
            webhook_secret: Some(SECRET.to_string()),
            webhook_max_body_bytes: 4096,
            ..ServerConfig::default()
        }
    }

    fn signed_webhook(body: &Value) -> Request<Body> {
        let raw = serde_json::to_vec(body).unwrap();
        Request::builder()
            .method("POST")
            .uri("/v1/webhooks/signing")
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, format!("sha256={}", sign(SECRET, &raw)))
            .body(Body::from(raw))
            .unwrap()
    }

    fn admin(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", ADMIN_TOKEN));
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn completed_event(event_id: &str, submitter_ref: &str) -> Value {
        json!({
            "event_id": event_id,
            "event_type": "form.completed",
            "timestamp": "2026-01-05T10:00:00Z",
            "data": { "id": submitter_ref, "submission_id": "subm-1" }
        })
    }

    #[tokio::test]
    async fn responds_unauthorized_on_admin_routes_without_token() {
        let app = make_app(make_state(true, config()));

        let protected_routes = vec![
            ("GET", "/v1/admin/jobs"),
            ("GET", "/v1/admin/contracts/abc"),
            ("POST", "/v1/admin/contracts/abc/reconcile"),
            ("GET", "/v1/admin/notifications/failed"),
            ("GET", "/v1/admin/alerts/rules"),
            ("GET", "/v1/admin/pipeline/entities"),
        ];

        for (method, route) in protected_routes.into_iter() {
            let request = Request::builder()
                .method(method)
                .uri(route)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", route);
        }
    }

    #[tokio::test]
    async fn responds_forbidden_with_wrong_or_unconfigured_token() {
        let app = make_app(make_state(true, config()));
        let request = Request::builder()
            .uri("/v1/admin/alerts/rules")
            .header("authorization", "Bearer nope")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let locked = make_app(make_state(
            true,
            ServerConfig {
                admin_token: None,
                ..config()
            },
        ));
        let response = locked
            .oneshot(admin("GET", "/v1/admin/alerts/rules", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn webhook_rejects_bad_signature_and_missing_secret() {
        let app = make_app(make_state(true, config()));
        let raw = serde_json::to_vec(&completed_event("evt-1", "ext-a")).unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/v1/webhooks/signing")
            .header(SIGNATURE_HEADER, sign("other-secret", &raw))
            .body(Body::from(raw.clone()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("POST")
            .uri("/v1/webhooks/signing")
            .body(Body::from(raw.clone()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("POST")
            .uri("/v1/webhooks/signing")
            .header(SECRET_HEADER, SECRET)
            .body(Body::from(raw.clone()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // No secret configured: nothing is accepted.
        let open = make_app(make_state(
            true,
            ServerConfig {
                webhook_secret: None,
                ..config()
            },
        ));
        let request = Request::builder()
            .method("POST")
            .uri("/v1/webhooks/signing")
            .header(SECRET_HEADER, SECRET)
            .body(Body::from(raw))
            .unwrap();
        let response = open.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_rejects_malformed_and_oversized_bodies() {
        let app = make_app(make_state(true, config()));

        let raw = b"{not json".to_vec();
        let request = Request::builder()
            .method("POST")
            .uri("/v1/webhooks/signing")
            .header(SIGNATURE_HEADER, sign(SECRET, &raw))
            .body(Body::from(raw))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let raw = vec![b'x'; 8192];
        let request = Request::builder()
            .method("POST")
            .uri("/v1/webhooks/signing")
            .header(SIGNATURE_HEADER, sign(SECRET, &raw))
            .body(Body::from(raw))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn webhook_acknowledges_unrecognized_types() {
        let app = make_app(make_state(true, config()));
        let body = json!({
            "event_type": "template.created",
            "data": { "id": 7 }
        });
        let response = app.oneshot(signed_webhook(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["outcome"], "ignored");
    }

    #[tokio::test]
    async fn webhook_returns_unavailable_without_signing_workflow() {
        let app = make_app(make_state(false, config()));
        let response = app
            .oneshot(signed_webhook(&completed_event("evt-1", "ext-a")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn contract_lifecycle_through_admin_api_and_webhooks() {
        let app = make_app(make_state(true, config()));

        let response = app
            .clone()
            .oneshot(admin(
                "POST",
                "/v1/admin/contracts",
                Some(json!({ "title": "Lease", "template_ref": "tpl-1" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let contract_id = json_body(response).await["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(admin(
                "POST",
                &format!("/v1/admin/contracts/{}/send", contract_id),
                Some(json!({
                    "ordering_mode": "PARALLEL",
                    "submitters": [
                        { "name": "Ann", "email": "ann@example.com" },
                        { "name": "Bob", "email": "bob@example.com" }
                    ]
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let sent = json_body(response).await;
        assert_eq!(sent["status"], "SENT");
        assert_eq!(sent["submitters"].as_array().unwrap().len(), 2);

        for (event_id, submitter_ref) in [
            ("evt-ann", "ext-ann@example.com"),
            ("evt-bob", "ext-bob@example.com"),
        ] {
            let response = app
                .clone()
                .oneshot(signed_webhook(&completed_event(event_id, submitter_ref)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await["outcome"], "applied");
        }

        // Redelivery is acknowledged but changes nothing.
        let response = app
            .clone()
            .oneshot(signed_webhook(&completed_event(
                "evt-bob",
                "ext-bob@example.com",
            )))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["outcome"], "duplicate");

        let response = app
            .clone()
            .oneshot(admin(
                "GET",
                &format!("/v1/admin/contracts/{}", contract_id),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["status"], "COMPLETED");

        // Sending again is a validation error.
        let response = app
            .oneshot(admin(
                "POST",
                &format!("/v1/admin/contracts/{}/send", contract_id),
                Some(json!({
                    "submitters": [{ "name": "Cy", "email": "cy@example.com", "signing_order": 1 }]
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pipeline_stage_edit_checks_version() {
        let app = make_app(make_state(false, config()));

        let response = app
            .clone()
            .oneshot(admin(
                "POST",
                "/v1/admin/pipeline/entities",
                Some(json!({ "name": "Deal 1", "stage": "lead" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let entity = json_body(response).await;
        let entity_id = entity["id"].as_str().unwrap().to_string();
        let version = entity["version"].as_i64().unwrap();

        let edit = |expected_version: i64| {
            admin(
                "PUT",
                &format!("/v1/admin/pipeline/entities/{}/stage", entity_id),
                Some(json!({
                    "expected_stage": "lead",
                    "expected_version": expected_version,
                    "stage": "qualified"
                })),
            )
        };

        let response = app.clone().oneshot(edit(version)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["stage"], "qualified");

        let response = app.oneshot(edit(version)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn alert_rules_can_be_created_listed_and_deleted() {
        let app = make_app(make_state(false, config()));

        let response = app
            .clone()
            .oneshot(admin(
                "POST",
                "/v1/admin/alerts/rules",
                Some(json!({
                    "name": "Too many stale",
                    "metric": "contracts.stale",
                    "operator": ">",
                    "threshold": 10.0,
                    "cooldown_secs": 600
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let rule_id = json_body(response).await["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(admin("GET", "/v1/admin/alerts/rules", None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);

        let uri = format!("/v1/admin/alerts/rules/{}", rule_id);
        let response = app
            .clone()
            .oneshot(admin("DELETE", &uri, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.oneshot(admin("DELETE", &uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn jobs_routes_need_a_scheduler() {
        let app = make_app(make_state(false, config()));
        let response = app
            .oneshot(admin("POST", "/v1/admin/jobs/alert_evaluation/trigger", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn home_and_metrics_are_public() {
        let app = make_app(make_state(false, config()));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["signing_enabled"], false);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
