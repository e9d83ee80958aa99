//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::InvestorId;
use lending::{InMemoryNotifier, ServiceConfig};
use loan_store::{InMemoryLoanStore, Investor};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> axum::Router {
    let state = api::create_default_state(InMemoryLoanStore::new());
    api::create_app(state, get_metrics_handle())
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn create_loan(app: &axum::Router, amount: i64) -> i64 {
    let (status, json) = send(
        app,
        "POST",
        "/loans",
        Some(json!({
            "amount": amount,
            "rate": 10.0,
            "borrower_id": 1,
            "agreement_letter_url": "https://docs/agreement.pdf"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_i64().unwrap()
}

fn approval_body() -> Value {
    json!({ "employee_id": 5, "document_url": "https://docs/visit.jpg" })
}

async fn approved_loan(app: &axum::Router, amount: i64) -> i64 {
    let id = create_loan(app, amount).await;
    let (status, _) = send(
        app,
        "PATCH",
        &format!("/loans/{id}/approve"),
        Some(approval_body()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    id
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();
    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    create_loan(&app, 1000).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("loans_created_total"));
}

#[tokio::test]
async fn test_create_loan() {
    let app = setup();
    let (status, json) = send(
        &app,
        "POST",
        "/loans",
        Some(json!({ "amount": 5000, "rate": 12.0, "borrower_id": 3 })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["state"], "PROPOSED");
    assert_eq!(json["roi"], 600.0);
    assert_eq!(json["borrower_id"], 3);
    assert!(json["id"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_create_loan_with_invalid_terms() {
    let app = setup();
    let (status, json) = send(
        &app,
        "POST",
        "/loans",
        Some(json!({ "amount": 0, "rate": 12.0, "borrower_id": 3 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_get_loan() {
    let app = setup();
    let id = create_loan(&app, 1000).await;

    let (status, json) = send(&app, "GET", &format!("/loans/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], id);
    assert_eq!(json["amount"], 1000);
}

#[tokio::test]
async fn test_get_nonexistent_loan() {
    let app = setup();
    let (status, _) = send(&app, "GET", "/loans/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_loan_id_format() {
    let app = setup();
    let (status, json) = send(&app, "GET", "/loans/not-a-number", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("not-a-number"));
}

#[tokio::test]
async fn test_full_lifecycle() {
    let app = setup();
    let id = approved_loan(&app, 1000).await;

    let (status, json) = send(
        &app,
        "PATCH",
        &format!("/loans/{id}/invest"),
        Some(json!({ "investor_id": 1, "amount": 500 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "APPROVED");
    assert_eq!(json["invested"], 500);

    let (status, json) = send(
        &app,
        "PATCH",
        &format!("/loans/{id}/invest"),
        Some(json!({ "investor_id": 2, "amount": 500 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "INVESTED");

    let (status, json) = send(
        &app,
        "PATCH",
        &format!("/loans/{id}/disburse"),
        Some(approval_body()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "DISBURSED");
    assert_eq!(json["approvals"][0]["action"], "APPROVE");
    assert_eq!(json["approvals"][1]["action"], "DISBURSE");
    assert!(json["approvals"][1]["date"].as_str().is_some());
}

#[tokio::test]
async fn test_illegal_transition_is_bad_request() {
    let app = setup();
    let id = approved_loan(&app, 1000).await;

    let (status, json) = send(
        &app,
        "PATCH",
        &format!("/loans/{id}/approve"),
        Some(approval_body()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid request for current state");

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/loans/{id}/invest"),
        Some(json!({ "investor_id": 1, "amount": 1001 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_overflowing_investment_is_bad_request() {
    let app = setup();
    let id = approved_loan(&app, 1000).await;
    send(
        &app,
        "PATCH",
        &format!("/loans/{id}/invest"),
        Some(json!({ "investor_id": 1, "amount": 500 })),
    )
    .await;

    let (status, json) = send(
        &app,
        "PATCH",
        &format!("/loans/{id}/invest"),
        Some(json!({ "investor_id": 2, "amount": i64::MAX })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid request for current state");

    let (status, json) = send(&app, "GET", &format!("/loans/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["invested"], 500);
    assert_eq!(json["investments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_approval_requires_employee_and_document() {
    let app = setup();
    let id = create_loan(&app, 1000).await;

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/loans/{id}/approve"),
        Some(json!({ "employee_id": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/loans/{id}/approve"),
        Some(json!({ "document_url": "https://docs/visit.jpg" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_operation_on_missing_loan() {
    let app = setup();
    let (status, _) = send(&app, "PATCH", "/loans/42/approve", Some(approval_body())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_loans() {
    let app = setup();
    approved_loan(&app, 1000).await;
    create_loan(&app, 2000).await;

    let (status, json) = send(&app, "GET", "/loans?state=APPROVED", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (status, json) = send(&app, "GET", "/loans?borrower=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);

    let (status, _) = send(&app, "GET", "/loans?state=CANCELLED", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/loans", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_investor_loans() {
    let app = setup();
    let id = approved_loan(&app, 1000).await;
    send(
        &app,
        "PATCH",
        &format!("/loans/{id}/invest"),
        Some(json!({ "investor_id": 8, "amount": 100 })),
    )
    .await;

    let (status, json) = send(&app, "GET", "/investors/8/loans", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["id"], id);

    let (status, json) = send(&app, "GET", "/investors/9/loans", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_funding_notifies_investors() {
    let store = InMemoryLoanStore::new();
    store
        .save_investor(Investor::new(InvestorId::new(1), "Ana", "ana@example.com"))
        .await;
    let notifier = InMemoryNotifier::new();
    let state = api::create_state(
        store,
        Arc::new(notifier.clone()),
        ServiceConfig::default(),
    );
    let app = api::create_app(Arc::clone(&state), get_metrics_handle());

    let id = approved_loan(&app, 1000).await;
    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/loans/{id}/invest"),
        Some(json!({ "investor_id": 1, "amount": 1000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    state.service.shutdown().await;
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec!["ana@example.com".to_string()]);
}
