//! End-to-end checks of the HTTP API against a real router.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use common::protocol::{
    DecodeResponse, EncodeResponse, ErrorResponse, HealthResponse, MaskResponse,
};
use serde_json::json;

use vault::audit::{AccessAction, AuditRecorder, AuditStore, JsonlAuditStore, MemoryAuditStore};
use vault::crypto::{KeyMaterial, KeyRing};
use vault::server::{router, state::AppState};

fn server_with(ring: KeyRing, store: Arc<dyn AuditStore>) -> TestServer {
    let state = AppState::new(Arc::new(ring), AuditRecorder::new(store), "1", false);
    TestServer::new(router::build(state)).unwrap()
}

fn header(name: &'static str, value: &'static str) -> (HeaderName, HeaderValue) {
    (HeaderName::from_static(name), HeaderValue::from_static(value))
}

#[tokio::test]
async fn health_reports_ring() {
    let ring = KeyRing::new(KeyMaterial::generate(), vec![KeyMaterial::generate()]);
    let fingerprint = ring.active().fingerprint();
    let server = server_with(ring, Arc::new(MemoryAuditStore::new()));

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: HealthResponse = response.json();
    assert_eq!(body.status, "ok");
    assert_eq!(body.key_generations, 2);
    assert_eq!(body.active_key_fingerprint, fingerprint);
}

#[tokio::test]
async fn round_trip_across_key_rotation() {
    let old_key = KeyMaterial::generate();
    let store = Arc::new(MemoryAuditStore::new());
    let before = server_with(KeyRing::new(old_key.clone(), vec![]), store.clone());

    let (actor, actor_value) = header("x-actor-id", "analyst-1");
    let encoded: EncodeResponse = before
        .post("/encode")
        .add_header(actor.clone(), actor_value.clone())
        .json(&json!({
            "model": "transaction",
            "record_id": "tx-9",
            "fields": [
                {"name": "merchant", "kind": "text", "value": "Corner Grocery"},
                {"name": "amount", "kind": "amount", "value": "19.99"}
            ]
        }))
        .await
        .json();
    assert_eq!(encoded.fields[1].shadow.as_deref(), Some("19.99"));

    let rotated = KeyRing::new(old_key, vec![]).rotate(KeyMaterial::generate()).unwrap();
    let after = server_with(rotated, store.clone());

    let (fwd, fwd_value) = header("x-forwarded-for", "198.51.100.20, 10.0.0.2");
    let response = after
        .post("/decode")
        .add_header(actor, actor_value)
        .add_header(fwd, fwd_value)
        .json(&json!({
            "model": "transaction",
            "record_id": "tx-9",
            "fields": [
                {"name": "merchant", "kind": "text", "token": encoded.fields[0].token},
                {"name": "amount", "kind": "amount", "token": encoded.fields[1].token}
            ]
        }))
        .await;
    response.assert_status_ok();
    let decoded: DecodeResponse = response.json();
    assert_eq!(decoded.fields[0].value.as_deref(), Some("Corner Grocery"));
    assert_eq!(decoded.fields[1].value.as_deref(), Some("19.99"));
    assert!(decoded.fields.iter().all(|f| f.needs_reencryption));

    let entries = store.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, AccessAction::Write);
    assert_eq!(entries[1].action, AccessAction::Read);
    assert_eq!(entries[1].fields, vec!["amount", "merchant"]);
    assert_eq!(entries[1].actor_id.as_deref(), Some("analyst-1"));
    assert_eq!(entries[1].origin_ip, Some("198.51.100.20".parse().unwrap()));
}

#[tokio::test]
async fn malformed_token_is_bad_request() {
    let server = server_with(
        KeyRing::new(KeyMaterial::generate(), vec![]),
        Arc::new(MemoryAuditStore::new()),
    );
    let response = server
        .post("/decode")
        .json(&json!({
            "model": "user",
            "record_id": "1",
            "fields": [{"name": "email", "kind": "email", "token": "v1.not-a-token"}]
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let err: ErrorResponse = response.json();
    assert_eq!(err.code, "bad_request");
}

#[tokio::test]
async fn mask_endpoint() {
    let server = server_with(
        KeyRing::new(KeyMaterial::generate(), vec![]),
        Arc::new(MemoryAuditStore::new()),
    );
    let response = server
        .post("/mask")
        .json(&json!({"text": "call 555-123-4567, card 4532-1234-5678-9012"}))
        .await;
    response.assert_status_ok();
    let body: MaskResponse = response.json();
    assert_eq!(body.masked, "call [MASKED_PHONE], card [MASKED_CARD]");
    assert!(body.contains_pii);
}

#[tokio::test]
async fn audit_entries_reach_the_jsonl_log() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonlAuditStore::open(dir.path().join("audit.jsonl")).unwrap());
    let server = server_with(KeyRing::new(KeyMaterial::generate(), vec![]), store.clone());

    server
        .post("/encode")
        .json(&json!({
            "model": "user",
            "record_id": "u-1",
            "fields": [{"name": "email", "kind": "email", "value": "Jane@Example.com"}]
        }))
        .await
        .assert_status_ok();

    let entries = store.read_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].model, "user");
    assert_eq!(entries[0].fields, vec!["email"]);
    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(!raw.contains("Jane@Example.com"));
}
