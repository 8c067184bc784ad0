mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;
use tix_case_workflow::api::{create_app, AppState};

fn app(fx: &Fixture) -> Router {
    create_app(AppState { services: fx.services.clone(), backends: None })
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body, request_id)
}

fn tenant_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-org-id", ORG)
        .header("x-username", "operator")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_carries_request_id() {
    let fx = fixture().await;
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();

    let (status, body, request_id) = call(app(&fx), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(request_id.as_deref(), Some("req-123"));
}

#[tokio::test]
async fn test_missing_tenant_headers_are_rejected() {
    let fx = fixture().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/case")
        .header("content-type", "application/json")
        .body(Body::from(json!({"caseSTypeId": "S1", "title": "x", "provId": "10"}).to_string()))
        .unwrap();

    let (status, body, _) = call(app(&fx), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "-1");
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_create_case_then_read_sop() {
    let fx = fixture().await;
    let create = tenant_request(
        "POST",
        "/api/v1/case",
        json!({
            "caseSTypeId": "S1",
            "title": "Camera offline",
            "countryId": "TH",
            "provId": "10",
            "distId": "1001",
            "attachments": ["https://files.example/a.jpg"]
        }),
    );

    let (status, body, _) = call(app(&fx), create).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "0");
    assert_eq!(body["msg"], "Success");
    assert_eq!(body["data"]["created"], true);
    let case_id = body["data"]["case"]["caseId"].as_str().unwrap().to_string();
    assert!(case_id.starts_with('I'));

    // The new case was pushed to the work-order API.
    assert_eq!(fx.client.sent().len(), 1);

    let sop = tenant_request("GET", &format!("/api/v1/dispatch/{}/SOP", case_id), Value::Null);
    let (status, body, _) = call(app(&fx), sop).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currentStage"]["nodeId"], "n-new");
    assert_eq!(body["data"]["workflow"]["nodes"].as_array().unwrap().len(), workflow_nodes().len());
    assert_eq!(body["data"]["dispatchNode"]["nodeId"], "n-assign");
}

#[tokio::test]
async fn test_stage_update_endpoint() {
    let fx = fixture().await;
    seed_case_at(&fx.store, "I250101-00001", "S001", "n-new", Utc::now()).await;

    let dispatch = tenant_request(
        "PATCH",
        "/api/v1/case/I250101-00001/stage",
        json!({"unitId": "unit-9", "unitUser": "tech.a", "dispatch": true}),
    );
    let (status, body, _) = call(app(&fx), dispatch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currentStage"]["nodeId"], "n-assign");
    assert_eq!(fx.store.case(ORG, "I250101-00001").await.unwrap().status_id, "S002");

    let missing = tenant_request("PATCH", "/api/v1/case/I250101-00001/stage", json!({"statusId": "S005"}));
    let (status, body, _) = call(app(&fx), missing).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_dashboard_summary_endpoint() {
    let fx = fixture().await;
    fx.services.dashboard.record_case_opened(ORG, "T1", &geography()).await.unwrap();

    let (status, body, _) = call(app(&fx), tenant_request("GET", "/api/v1/dashboard/summary", Value::Null)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["orgId"], ORG);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fx = fixture().await;
    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app(&fx).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&text).contains("tix_cases_opened_total"));
}
