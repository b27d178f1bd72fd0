//! End-to-end tests for the contract signing workflow driven through the admin API

mod common;

use common::{TestClient, TestServer};
use reqwest::StatusCode;
use serde_json::{json, Value};
use signflow_server::signing::RemoteSubmitterState;

async fn create_contract(client: &TestClient) -> String {
    let response = client.create_contract("Partnership agreement").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let contract: Value = response.json().await.unwrap();
    assert_eq!(contract["status"], "DRAFT");
    contract["id"].as_str().unwrap().to_string()
}

fn submitter_status(contract: &Value, email: &str) -> String {
    contract["submitters"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["email"] == email)
        .map(|s| s["status"].as_str().unwrap().to_string())
        .unwrap()
}

#[tokio::test]
async fn test_admin_api_requires_bearer_token() {
    let server = TestServer::spawn().await;

    let anonymous = TestClient::new(server.base_url.clone());
    let response = anonymous.create_contract("Nope").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let wrong = TestClient::with_token(server.base_url.clone(), "guess");
    let response = wrong.create_contract("Nope").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_sequential_contract_notifies_one_signer_at_a_time() {
    let server = TestServer::spawn().await;
    let admin = TestClient::admin(server.base_url.clone());
    let provider = TestClient::new(server.base_url.clone());
    let contract_id = create_contract(&admin).await;

    let response = admin
        .send_contract(
            &contract_id,
            "SEQUENTIAL",
            json!([
                { "name": "Second", "email": "second@example.com", "signing_order": 2 },
                { "name": "First", "email": "first@example.com", "signing_order": 1 }
            ]),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let contract: Value = response.json().await.unwrap();
    assert_eq!(contract["status"], "SENT");
    assert_eq!(submitter_status(&contract, "first@example.com"), "NOTIFIED");
    assert_eq!(submitter_status(&contract, "second@example.com"), "PENDING");

    server.notifications_idle().await;
    assert_eq!(
        server.notifications.recipients(),
        vec!["first@example.com".to_string()]
    );

    // The second signer cannot act before being notified.
    let response = provider
        .post_submitter_event("evt-early", "form.completed", "ext-second@example.com")
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "out_of_order");

    let response = provider
        .post_submitter_event("evt-first", "form.completed", "ext-first@example.com")
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "applied");

    let contract: Value = admin.get_contract(&contract_id).await.json().await.unwrap();
    assert_eq!(contract["status"], "IN_PROGRESS");
    assert_eq!(submitter_status(&contract, "second@example.com"), "NOTIFIED");

    server.notifications_idle().await;
    assert!(server
        .notifications
        .recipients()
        .contains(&"second@example.com".to_string()));

    let response = provider
        .post_submitter_event("evt-second", "form.completed", "ext-second@example.com")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let contract: Value = admin.get_contract(&contract_id).await.json().await.unwrap();
    assert_eq!(contract["status"], "COMPLETED");
    assert!(contract["completed_at"].is_string());
}

#[tokio::test]
async fn test_invalid_submitters_leave_contract_in_draft() {
    let server = TestServer::spawn().await;
    let admin = TestClient::admin(server.base_url.clone());
    let contract_id = create_contract(&admin).await;

    let response = admin
        .send_contract(
            &contract_id,
            "PARALLEL",
            json!([
                { "name": "A", "email": "same@example.com" },
                { "name": "B", "email": "SAME@example.com" }
            ]),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = admin
        .send_contract(
            &contract_id,
            "SEQUENTIAL",
            json!([{ "name": "A", "email": "a@example.com" }]),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = admin.send_contract(&contract_id, "PARALLEL", json!([])).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let contract: Value = admin.get_contract(&contract_id).await.json().await.unwrap();
    assert_eq!(contract["status"], "DRAFT");
    assert!(contract["submitters"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_manual_reconcile_catches_up_missed_webhooks() {
    let server = TestServer::spawn().await;
    let admin = TestClient::admin(server.base_url.clone());
    let contract_id = create_contract(&admin).await;

    let response = admin
        .send_contract(
            &contract_id,
            "PARALLEL",
            json!([
                { "name": "Ann", "email": "ann@example.com" },
                { "name": "Bob", "email": "bob@example.com" }
            ]),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    server
        .signing
        .set_remote("ann@example.com", RemoteSubmitterState::Completed);
    server
        .signing
        .set_remote("bob@example.com", RemoteSubmitterState::Opened);

    let response = admin.reconcile_contract(&contract_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["applied"], 2);

    let contract: Value = admin.get_contract(&contract_id).await.json().await.unwrap();
    assert_eq!(contract["status"], "IN_PROGRESS");
    assert_eq!(submitter_status(&contract, "ann@example.com"), "COMPLETED");
    assert_eq!(submitter_status(&contract, "bob@example.com"), "OPENED");

    // Nothing changed remotely, so a second pass is a no-op.
    let report: Value = admin
        .reconcile_contract(&contract_id)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(report["applied"], 0);
}

#[tokio::test]
async fn test_delete_contract() {
    let server = TestServer::spawn().await;
    let admin = TestClient::admin(server.base_url.clone());
    let contract_id = create_contract(&admin).await;

    let response = admin.delete_contract(&contract_id).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = admin.get_contract(&contract_id).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = admin.delete_contract(&contract_id).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_contract_routes_unavailable_without_signing_provider() {
    let server = TestServer::spawn_without_signing().await;
    let admin = TestClient::admin(server.base_url.clone());

    let response = admin.create_contract("No provider").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
