//! HTTP API Integration Tests
//!
//! Exercises the router in-process with `oneshot`.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tower::ServiceExt;

use witness::core::{Limits, MemoryRecordStore, Orchestrator};
use witness::server::router;

fn app_with_analyst(raw: &str) -> Router {
    let orchestrator = Orchestrator::new(
        Arc::new(common::CountingLedger::default()),
        Arc::new(common::EchoNarrator),
        Arc::new(common::ScriptedAnalyst(raw.to_string())),
        Arc::new(MemoryRecordStore::new()),
    );
    router(Arc::new(orchestrator))
}

fn app() -> Router {
    app_with_analyst(common::VALID_ANALYSIS)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn post_bytes(uri: &str, body: &'static [u8]) -> Request<Body> {
    Request::post(uri).body(Body::from(body)).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn submit_abc(app: &Router) -> String {
    let (status, body) = send(app, post_bytes("/api/submit", b"ABC")).await;
    assert_eq!(status, StatusCode::OK);
    body["record_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_index() {
    let response = app()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"Witness API Running");
}

#[tokio::test]
async fn test_submit_then_vault() {
    let app = app();
    let (status, body) = send(&app, post_bytes("/api/submit", b"ABC")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["fingerprint"],
        "b5d4045c3f466fa91fe2cc6abe79232a1a57cdf104f7a26e716e0a1e2789df78"
    );
    assert!(!body["anchor_reference"].as_str().unwrap().is_empty());

    let id = body["record_id"].as_str().unwrap();
    let (status, record) = send(
        &app,
        Request::get(format!("/api/vault/{}", id)).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["fingerprint"], body["fingerprint"]);
    assert_eq!(record["anchor_reference"], body["anchor_reference"]);
}

#[tokio::test]
async fn test_empty_submit_is_bad_request() {
    let (status, body) = send(&app(), post_bytes("/api/submit", b"")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert_eq!(body["step"], "fingerprint");
}

#[tokio::test]
async fn test_vault_unknown_is_404_not_placeholder() {
    let app = app();

    for id in ["00000000-0000-0000-0000-000000000000", "not-a-record"] {
        let (status, body) = send(
            &app,
            Request::get(format!("/api/vault/{}", id)).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "record_not_found");
        assert!(body.get("fingerprint").is_none());
    }
}

#[tokio::test]
async fn test_voice_returns_audio() {
    let app = app();
    let id = submit_abc(&app).await;

    let (status, body) = send(
        &app,
        post_json("/api/voice", serde_json::json!({"record_id": id, "text": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let audio = STANDARD.decode(body["audio_base64"].as_str().unwrap()).unwrap();
    assert_eq!(audio, b"AUDIO:hello");

    let (_, record) = send(
        &app,
        Request::get(format!("/api/vault/{}", id)).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(record["statement_text"], "hello");
    assert_eq!(record["narration_audio"], body["audio_base64"]);
}

#[tokio::test]
async fn test_analyze_returns_analysis() {
    let app = app();
    let id = submit_abc(&app).await;

    let (status, body) = send(
        &app,
        post_json("/api/analyze", serde_json::json!({"record_id": id, "text": "locked out"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["analysis"]["category"], "housing");
    assert_eq!(body["analysis"]["urgency_score"], 4);
}

#[tokio::test]
async fn test_malformed_analysis_is_bad_gateway() {
    let app = app_with_analyst("not json at all");
    let id = submit_abc(&app).await;

    let (status, body) = send(
        &app,
        post_json("/api/analyze", serde_json::json!({"record_id": id, "text": "locked out"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "malformed_response");
    assert_eq!(body["step"], "analyze");
    assert_eq!(body["record_id"], id);
}

#[tokio::test]
async fn test_verify_endpoint() {
    let app = app();
    let id = submit_abc(&app).await;

    let (status, body) = send(&app, post_bytes(&format!("/api/verify/{}", id), b"ABC")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verdict"], "MATCH");

    let (status, body) = send(&app, post_bytes(&format!("/api/verify/{}", id), b"ABD")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verdict"], "MISMATCH");
}

#[tokio::test]
async fn test_incomplete_statement_is_validation_error() {
    let app = app();
    let id = submit_abc(&app).await;

    let request = post_json("/api/voice", serde_json::json!({"record_id": id}));
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert_eq!(body["step"], "narrate");
    assert!(!body["message"].as_str().unwrap().is_empty());

    let request = Request::post("/api/analyze").body(Body::from("not json")).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert_eq!(body["step"], "analyze");
}

#[tokio::test]
async fn test_oversized_artifact_is_validation_error() {
    let orchestrator = Orchestrator::new(
        Arc::new(common::CountingLedger::default()),
        Arc::new(common::EchoNarrator),
        Arc::new(common::ScriptedAnalyst::valid()),
        Arc::new(MemoryRecordStore::new()),
    )
    .with_limits(Limits {
        max_artifact_bytes: 4,
        ..Limits::default()
    });
    let app = router(Arc::new(orchestrator));

    let (status, body) = send(&app, post_bytes("/api/submit", b"far too many bytes")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert_eq!(body["step"], "fingerprint");
}

#[tokio::test]
async fn test_cross_origin_allowed() {
    let request = Request::get("/")
        .header("origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}
