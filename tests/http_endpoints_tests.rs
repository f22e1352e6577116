//! HTTP surface tests against a running server

mod common;

use axum::{routing::post, Json, Router};
use common::TestServer;
use presence_sync::config::{HeartbeatConfig, Secret};
use presence_sync::push::PushRelay;
use presence_sync::store::UserRecord;
use serde_json::{json, Value};

async fn spawn_relay() -> String {
    async fn deliver(Json(body): Json<Value>) -> Json<Value> {
        let responses: Vec<Value> = body["tokens"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|token| {
                if token.as_str().is_some_and(|t| t.starts_with("stale")) {
                    json!({"success": false, "error": "not registered"})
                } else {
                    json!({"success": true})
                }
            })
            .collect();
        Json(json!({ "responses": responses }))
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, Router::new().route("/push", post(deliver)))
            .await
            .unwrap();
    });
    format!("http://{}/push", addr)
}

#[tokio::test]
async fn test_root_acknowledges() {
    let mut server = TestServer::start(&[]).await;

    let response = reqwest::get(server.http_url("/")).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "Presence server is running");
    server.shutdown().await;
}

#[tokio::test]
async fn test_health_reports_counts() {
    let mut server = TestServer::start(&[]).await;

    let body: Value = reqwest::get(server.http_url("/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "presence-sync");
    assert_eq!(body["onlineUsers"], 0);
    assert_eq!(body["connections"], 0);
    assert_eq!(body["stats"]["reconciliations"], 0);
    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let mut server = TestServer::start(&[]).await;

    let response = reqwest::get(server.http_url("/nope")).await.unwrap();

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "NOT_FOUND");
    server.shutdown().await;
}

#[tokio::test]
async fn test_store_token_flow() {
    let mut server = TestServer::start(&["u1"]).await;
    let client = reqwest::Client::new();

    let missing = client
        .post(server.http_url("/store-token"))
        .json(&json!({"userId": "u1", "token": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 400);

    let unknown = client
        .post(server.http_url("/store-token"))
        .json(&json!({"userId": "nobody", "token": "t1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);

    let stored = client
        .post(server.http_url("/store-token"))
        .json(&json!({"userId": "u1", "token": "t1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(stored.status(), 200);

    let record = server.durable.peek("u1").await.unwrap();
    assert_eq!(record.tokens, vec!["t1".to_string()]);
    server.shutdown().await;
}

#[tokio::test]
async fn test_send_notification_fans_out() {
    let relay_url = spawn_relay().await;
    let relay = PushRelay::new(relay_url, Some(Secret::new("relay-token"))).unwrap();
    let mut server = TestServer::start_with(&[], HeartbeatConfig::default(), Some(relay)).await;

    let mut record = UserRecord::new("u1");
    record.tokens = vec!["fresh-device".to_string(), "stale-device".to_string()];
    server.durable.insert(record).await;

    let response = reqwest::Client::new()
        .post(server.http_url("/send-notification"))
        .json(&json!({"userId": "u1", "title": "Hello", "body": "World"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["delivered"], 1);
    assert_eq!(body["failed"], 1);
    server.shutdown().await;
}

#[tokio::test]
async fn test_send_notification_unknown_user() {
    let relay_url = spawn_relay().await;
    let relay = PushRelay::new(relay_url, None).unwrap();
    let mut server = TestServer::start_with(&[], HeartbeatConfig::default(), Some(relay)).await;

    let response = reqwest::Client::new()
        .post(server.http_url("/send-notification"))
        .json(&json!({"userId": "nobody", "title": "Hello", "body": "World"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    server.shutdown().await;
}

#[tokio::test]
async fn test_send_notification_relay_failure_is_500() {
    // Nothing listens on the discard port
    let relay = PushRelay::new("http://127.0.0.1:9/push", None).unwrap();
    let mut server = TestServer::start_with(&[], HeartbeatConfig::default(), Some(relay)).await;

    let mut record = UserRecord::new("u1");
    record.tokens.push("device".to_string());
    server.durable.insert(record).await;

    let response = reqwest::Client::new()
        .post(server.http_url("/send-notification"))
        .json(&json!({"userId": "u1", "title": "Hello", "body": "World"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    server.shutdown().await;
}
