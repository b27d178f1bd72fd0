//! End-to-end tests for the job scheduler admin endpoints

mod common;

use common::{TestClient, TestServer};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// Jobs run once right after startup; wait for that run to finish.
async fn wait_until_idle(client: &TestClient, job_id: &str) {
    for _ in 0..200 {
        let job: Value = client.admin_get_job(job_id).await.json().await.unwrap();
        if job["is_running"] == false {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never became idle", job_id);
}

async fn wait_for_manual_run(client: &TestClient, job_id: &str) -> Value {
    for _ in 0..200 {
        let history: Value = client
            .admin_get_job_history(job_id)
            .await
            .json()
            .await
            .unwrap();
        if let Some(run) = history
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["triggered_by"] == "manual" && r["finished_at"].is_string())
        {
            return run.clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no finished manual run of {}", job_id);
}

#[tokio::test]
async fn test_jobs_require_admin_token() {
    let server = TestServer::spawn().await;

    let response = TestClient::new(server.base_url.clone())
        .admin_list_jobs()
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = TestClient::with_token(server.base_url.clone(), "wrong")
        .admin_trigger_job("alert_evaluation")
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_list_jobs_returns_registered_jobs() {
    let server = TestServer::spawn().await;
    let client = TestClient::admin(server.base_url.clone());

    let response = client.admin_list_jobs().await;
    assert_eq!(response.status(), StatusCode::OK);
    let jobs: Value = response.json().await.unwrap();
    let ids: Vec<&str> = jobs
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![
            "alert_evaluation",
            "contract_reconciliation",
            "pipeline_automation"
        ]
    );
}

#[tokio::test]
async fn test_reconciliation_job_absent_without_signing() {
    let server = TestServer::spawn_without_signing().await;
    let client = TestClient::admin(server.base_url.clone());

    let response = client.admin_get_job("contract_reconciliation").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_trigger_unknown_job_returns_404() {
    let server = TestServer::spawn().await;
    let client = TestClient::admin(server.base_url.clone());

    let response = client.admin_trigger_job("no_such_job").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_trigger_job_records_manual_run() {
    let server = TestServer::spawn().await;
    let client = TestClient::admin(server.base_url.clone());
    wait_until_idle(&client, "pipeline_automation").await;

    let response = client.admin_trigger_job("pipeline_automation").await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let run = wait_for_manual_run(&client, "pipeline_automation").await;
    assert_eq!(run["status"], "completed");
}
