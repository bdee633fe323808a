//! API endpoint integration tests

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;
use common::{bearer_header, build_test_router, setup_test_db};

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post(uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri).header("content-type", "application/json");
    if let Some(token) = auth {
        builder = builder.header("authorization", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = auth {
        builder = builder.header("authorization", token);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_test_router(setup_test_db());

    let response = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_ready_endpoint() {
    let app = build_test_router(setup_test_db());

    let response = app.oneshot(get("/ready", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["database"]["status"], "ok");
}

#[tokio::test]
async fn test_devices_requires_auth() {
    let app = build_test_router(setup_test_db());

    let response = app.oneshot(get("/devices", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Register an account, log in, register a host and client device, pair
/// them, submit a command while the host is offline, and confirm it shows
/// up in the audit log
#[tokio::test]
async fn test_register_login_pair_relay_end_to_end() {
    let app = build_test_router(setup_test_db());

    let response = app
        .clone()
        .oneshot(post("/auth/register", None, json!({"username": "alice", "password": "hunter2"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(post("/auth/login", None, json!({"username": "alice", "password": "hunter2"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let login = json_body(response).await;
    let token = format!("Bearer {}", login["token"].as_str().unwrap());

    let response = app
        .clone()
        .oneshot(post("/devices", Some(&token), json!({"name": "pixel", "type": "host"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let host = json_body(response).await;
    let host_device_id = host["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(post("/devices", Some(&token), json!({"name": "tablet", "type": "client"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let client = json_body(response).await;
    let client_device_id = client["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(post("/pair", Some(&token), json!({"host_device_id": host_device_id})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let issued = json_body(response).await;
    let code = issued["code"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post(
            "/pair/confirm",
            Some(&token),
            json!({"code": code, "client_device_id": client_device_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Host has no live WS session, so the SMS command is queued, not delivered.
    let response = app
        .clone()
        .oneshot(post(
            "/sms",
            Some(&token),
            json!({"host_device_id": host_device_id, "sim": 1, "to": "+15551234", "body": "hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let sent = json_body(response).await;
    assert_eq!(sent["status"], "queued");

    let response = app.clone().oneshot(get("/history", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let history = json_body(response).await;
    assert_eq!(history["total"], 1);
    assert_eq!(history["items"][0]["kind"], "command");
}

#[tokio::test]
async fn test_cross_account_pairing_code_is_forbidden() {
    let app = build_test_router(setup_test_db());

    for (username, password) in [("alice", "alicepw1"), ("mallory", "malloryA1")] {
        let response = app
            .clone()
            .oneshot(post("/auth/register", None, json!({"username": username, "password": password})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let alice_token = {
        let response = app
            .clone()
            .oneshot(post("/auth/login", None, json!({"username": "alice", "password": "alicepw1"})))
            .await
            .unwrap();
        format!("Bearer {}", json_body(response).await["token"].as_str().unwrap())
    };
    let mallory_token = {
        let response = app
            .clone()
            .oneshot(post("/auth/login", None, json!({"username": "mallory", "password": "malloryA1"})))
            .await
            .unwrap();
        format!("Bearer {}", json_body(response).await["token"].as_str().unwrap())
    };

    let response = app
        .clone()
        .oneshot(post("/devices", Some(&alice_token), json!({"name": "pixel", "type": "host"})))
        .await
        .unwrap();
    let host_device_id = json_body(response).await["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(post("/devices", Some(&mallory_token), json!({"name": "tablet", "type": "client"})))
        .await
        .unwrap();
    let mallory_client_id = json_body(response).await["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(post("/pair", Some(&alice_token), json!({"host_device_id": host_device_id})))
        .await
        .unwrap();
    let code = json_body(response).await["code"].as_str().unwrap().to_string();

    let response = app
        .oneshot(post(
            "/pair/confirm",
            Some(&mallory_token),
            json!({"code": code, "client_device_id": mallory_client_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_sms_rejects_unowned_host_device() {
    let db = setup_test_db();
    let app = build_test_router(db);

    let response = app
        .clone()
        .oneshot(post("/auth/register", None, json!({"username": "alice", "password": "hunter22"})))
        .await
        .unwrap();
    let account = json_body(response).await;
    let token = bearer_header(account["id"].as_i64().unwrap());

    // No devices registered yet, host_device_id references nothing owned.
    let response = app
        .oneshot(post(
            "/sms",
            Some(&token),
            json!({"host_device_id": 999, "sim": 1, "to": "+15551234", "body": "hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
