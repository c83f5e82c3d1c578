use super::common::*;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::workflows::reconciliation::router::reconciliation_router;
use crate::workflows::reconciliation::secondary::SecondaryUnavailable;

fn app() -> Router {
    let harness = service(FakeSecondary::failing(SecondaryUnavailable::Disabled));
    reconciliation_router(Arc::new(harness.service))
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn tenant_uri(path: &str) -> String {
    format!("/api/v1/tenants/{TENANT}/{path}")
}

async fn matched_decision_id(app: &Router) -> String {
    let payload = serde_json::to_value(exact_payment()).expect("payment json");
    let response = app
        .clone()
        .oneshot(post(&tenant_uri("match"), payload))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    body["id"].as_str().expect("decision id").to_string()
}

#[tokio::test]
async fn match_endpoint_returns_the_decision() {
    let app = app();
    let payload = serde_json::to_value(exact_payment()).expect("payment json");

    let response = app
        .oneshot(post(&tenant_uri("match"), payload))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["action"], "AUTO_APPLY");
    assert_eq!(body["confidence"], 100);
    assert_eq!(body["chosen_candidate_id"], "inv-1042");
    assert_eq!(body["decision_path"], "deterministic");
}

#[tokio::test]
async fn categorize_endpoint_files_against_the_chart() {
    let app = app();
    let grocer = payment("tx-grocer", -4_500, None, None, "TESCO STORES 2231");
    let payload = serde_json::to_value(grocer).expect("payment json");

    let response = app
        .oneshot(post(&tenant_uri("categorize"), payload))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["chosen_candidate_id"], "6100");
    assert_eq!(body["decision_type"], "categorization");
}

#[tokio::test]
async fn invalid_transactions_are_unprocessable() {
    let app = app();
    let mut payload = serde_json::to_value(exact_payment()).expect("payment json");
    payload["amount_minor_units"] = json!(0);

    let response = app
        .oneshot(post(&tenant_uri("match"), payload))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert!(body["error"].as_str().expect("error text").contains("amount"));
}

#[tokio::test]
async fn corrections_are_accepted_once_and_conflicts_rejected() {
    let app = app();
    let decision_id = matched_decision_id(&app).await;

    let accepted = app
        .clone()
        .oneshot(post(
            &tenant_uri("corrections"),
            json!({ "decision_id": decision_id, "corrected_outcome": "inv-1042" }),
        ))
        .await
        .expect("response");
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);
    let receipt = read_json_body(accepted).await;
    assert_eq!(receipt["status"], "recorded");
    assert_eq!(receipt["outcome"]["deterministic_correct"], true);

    let conflict = app
        .clone()
        .oneshot(post(
            &tenant_uri("corrections"),
            json!({ "decision_id": decision_id, "corrected_outcome": "inv-2001" }),
        ))
        .await
        .expect("response");
    assert_eq!(conflict.status(), StatusCode::CONFLICT);

    let unknown = app
        .oneshot(post(
            &tenant_uri("corrections"),
            json!({ "decision_id": "no-such-decision" }),
        ))
        .await
        .expect("response");
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn accuracy_endpoint_reports_stats_and_weights() {
    let app = app();

    let response = app
        .clone()
        .oneshot(get(&tenant_uri("accuracy/invoice_match")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["sample_size"], 0);
    assert_eq!(body["recommendation"], "HYBRID");
    assert_eq!(body["weights"]["deterministic"], 0.4);
    assert_eq!(body["weights"]["secondary"], 0.6);

    let unknown = app
        .oneshot(get(&tenant_uri("accuracy/payroll")))
        .await
        .expect("response");
    assert_eq!(unknown.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
