// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use callbridge_config::model::CallbridgeConfig;
use callbridge_core::NewTenant;
use callbridge_dialer::ServiceContext;
use callbridge_gateway::{build_router, GatewayState};
use callbridge_storage::queries::tenants;
use callbridge_storage::{CredentialKey, Database};

const TOKEN: &str = "operator-token";

async fn app(crm: &MockServer, webhook_secret: Option<&str>) -> Router {
    let key = CredentialKey::generate().unwrap();
    let mut config = CallbridgeConfig::default();
    config.storage.credential_key = Some(key.to_hex());
    config.server.bearer_token = Some(TOKEN.to_string());
    config.crm.base_url = format!("{}/Crm", crm.uri());
    config.queue.max_lease_ttl_secs = 120;

    let db = Database::open_in_memory().await.unwrap();
    tenants::insert(
        &db,
        &key,
        &NewTenant {
            business_id: "b-1".into(),
            name: "Acme".into(),
            crm_token: Some("crm-token".into()),
            webhook_secret: webhook_secret.map(str::to_string),
            ..NewTenant::default()
        },
    )
    .await
    .unwrap();

    let ctx = ServiceContext::new(Arc::new(config), db).unwrap();
    build_router(GatewayState::new(ctx))
}

fn api(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_is_public() {
    let crm = MockServer::start().await;
    let app = app(&crm, None).await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "ok");
}

#[tokio::test]
async fn operator_api_requires_bearer() {
    let crm = MockServer::start().await;
    let app = app(&crm, None).await;
    let request = Request::builder()
        .method("POST")
        .uri("/v1/queue/next")
        .header("content-type", "application/json")
        .body(Body::from(json!({"businessid": "b-1", "holder": "a"}).to_string()))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/queue/next")
        .header("authorization", "Bearer wrong")
        .header("content-type", "application/json")
        .body(Body::from(json!({"businessid": "b-1", "holder": "a"}).to_string()))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn seed_lease_release_cycle() {
    let crm = MockServer::start().await;
    let app = app(&crm, None).await;

    let (status, report) = send(
        &app,
        api(
            "POST",
            "/v1/queue/seed",
            json!({
                "businessid": "b-1",
                "campaign": "spring",
                "items": [
                    {"contactKey": "k-1", "firstName": "Ada", "phone": "555-123-4567"},
                    {"contactKey": "k-2", "phone": "12"},
                ],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["inserted"], 1);
    assert_eq!(report["skipped"][0]["index"], 1);

    let (status, leased) = send(
        &app,
        api(
            "POST",
            "/v1/queue/next",
            json!({"businessid": "b-1", "campaign": "spring", "holder": "agent-1", "ttl_secs": 9999}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let item = &leased["item"];
    assert_eq!(item["status"], "locked");
    assert_eq!(item["lease_ttl_secs"], 120);
    let id = item["id"].as_i64().unwrap();

    let (_, empty) = send(
        &app,
        api(
            "POST",
            "/v1/queue/next",
            json!({"businessid": "b-1", "campaign": "spring", "holder": "agent-2"}),
        ),
    )
    .await;
    assert!(empty["item"].is_null());

    let (status, _) = send(
        &app,
        api(
            "POST",
            &format!("/v1/queue/{id}/release"),
            json!({"holder": "agent-2", "outcome": "done"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, released) = send(
        &app,
        api(
            "POST",
            &format!("/v1/queue/{id}/release"),
            json!({"holder": "agent-1", "outcome": "done", "result": "connected"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(released["item"]["status"], "done");
    assert_eq!(released["item"]["attempts"], 1);

    let (status, _) = send(
        &app,
        api("POST", "/v1/queue/999/release", json!({"holder": "agent-1", "outcome": "done"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        api(
            "POST",
            &format!("/v1/queue/{id}/release"),
            json!({"holder": "agent-1", "outcome": "finished"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_statuses() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Crm/Contact/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"contactKey": "k-1"}])))
        .mount(&crm)
        .await;
    Mock::given(method("POST"))
        .and(path("/Crm/history"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"key": "h-1"})))
        .expect(1)
        .mount(&crm)
        .await;
    let app = app(&crm, None).await;

    let webhook = |body: Value| {
        Request::builder()
            .method("POST")
            .uri("/webhooks/dialer")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };
    let event = json!({
        "businessid": "b-1",
        "hookevent": "endcall",
        "data": {"direction": "outbound", "tonumber": "5551234567", "callid": "c-9"},
    });

    let (status, body) = send(&app, webhook(event.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["contact_key"], "k-1");
    assert_eq!(body["attempts"][0]["link_field"], "contactKey");
    assert_eq!(body["attempts"][0]["accepted"], true);

    let (status, body) = send(&app, webhook(event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duplicate"], true);

    let (status, body) = send(
        &app,
        webhook(json!({"businessid": "b-1", "event": "ringing", "call_id": "c-10"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "skipped");

    let (status, _) = send(&app, webhook(json!({"businessid": "nobody", "event": "endcall"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, webhook(json!(["not", "an", "object"]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_signature_header_is_enforced() {
    let crm = MockServer::start().await;
    let app = app(&crm, Some("whsec")).await;
    let body = json!({"businessid": "b-1", "event": "ringing", "call_id": "c-1"}).to_string();

    let unsigned = Request::builder()
        .method("POST")
        .uri("/webhooks/dialer")
        .body(Body::from(body.clone()))
        .unwrap();
    let (status, _) = send(&app, unsigned).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let signature = callbridge_dialer::signature::sign("whsec", body.as_bytes()).unwrap();
    let signed = Request::builder()
        .method("POST")
        .uri("/webhooks/dialer")
        .header("x-dialer-signature", signature)
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send(&app, signed).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn webhook_reads_naive_times_in_the_header_zone() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Crm/Contact/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"contactKey": "k-1"}])))
        .mount(&crm)
        .await;
    Mock::given(method("POST"))
        .and(path("/Crm/history"))
        .and(body_partial_json(json!({
            "startDate": "2026-03-01T16:00:00.000Z",
            "endDate": "2026-03-01T16:05:00.000Z",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"key": "h-1"})))
        .expect(1)
        .mount(&crm)
        .await;
    let app = app(&crm, None).await;

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/dialer")
        .header("x-user-tz", "America/Chicago")
        .body(Body::from(
            json!({
                "businessid": "b-1",
                "event": "endcall",
                "to_number": "5551234567",
                "call_id": "c-tz",
                "started_at": "2026-03-01 10:00:00",
                "ended_at": "2026-03-01 10:05:00",
            })
            .to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn contact_search() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Crm/Contact/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [{"Key": "k-7"}]})))
        .mount(&crm)
        .await;
    let app = app(&crm, None).await;

    let (status, body) = send(
        &app,
        api("GET", "/v1/contacts/search?businessid=b-1&phone=12345", Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "phone_too_short");

    let (status, body) = send(
        &app,
        api("GET", "/v1/contacts/search?businessid=b-1&phone=%2B15551234567", Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contact"]["key"], "k-7");
    assert_eq!(body["contact"]["created"], false);
}
