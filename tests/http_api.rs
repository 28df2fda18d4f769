//! The HTTP surface served on a real listener.

mod common;

use std::sync::Arc;
use std::time::Duration;

use connector_dispatch::config::loader::parse_config;
use connector_dispatch::{ApiServer, Engine, Shutdown};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use common::{config_with_connector, start_mock_backend};

const CONNECTOR_ID: &str = "a4e1f0c2-6b3d-4c8e-9f71-2d5a8b0c3e17";

async fn serve(base_url: &str) -> (String, Shutdown, tokio::task::JoinHandle<()>) {
    let config = parse_config(&config_with_connector(CONNECTOR_ID, base_url, "")).unwrap();
    let shutdown = Shutdown::new();
    let engine = Arc::new(Engine::build(&config, shutdown.clone()).await.unwrap());
    let server = ApiServer::new(engine, &config.server);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        server.run(listener).await.unwrap();
    });
    (format!("http://{}", addr), shutdown, handle)
}

#[tokio::test]
async fn test_send_request_over_http() {
    let (backend, captured) = start_mock_backend(200, r#"{"pong":true}"#).await;
    let (url, shutdown, handle) = serve(&format!("http://{}", backend)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/requests", url))
        .header("X-User-Id", "u1")
        .header("X-Request-Id", "corr-42")
        .json(&json!({
            "connectorId": CONNECTOR_ID,
            "endpoint": "/ping",
            "method": "GET",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("x-request-id").unwrap().to_str().unwrap(),
        "corr-42"
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["statusCode"], 200);
    assert_eq!(body["isSuccess"], true);
    assert_eq!(body["correlationId"], "corr-42");
    assert_eq!(body["body"], r#"{"pong":true}"#);
    assert_eq!(captured.len(), 1);

    let records: Value = client
        .get(format!("{}/api/requests", url))
        .header("X-User-Id", "u1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(records.as_array().unwrap().len(), 1);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_unknown_connector_is_404_and_sends_nothing() {
    let (backend, captured) = start_mock_backend(200, "{}").await;
    let (url, shutdown, _handle) = serve(&format!("http://{}", backend)).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/requests", url))
        .header("X-User-Id", "u1")
        .json(&json!({
            "connectorId": uuid::Uuid::new_v4(),
            "endpoint": "/ping",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("connector not found"));
    assert_eq!(captured.len(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn test_webhook_test_endpoint() {
    let (backend, _) = start_mock_backend(200, "{}").await;
    let (hook, hook_captured) = start_mock_backend(204, "").await;
    let (url, shutdown, _handle) = serve(&format!("http://{}", backend)).await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("{}/api/webhooks", url))
        .header("X-User-Id", "u1")
        .json(&json!({
            "name": "ops",
            "url": format!("http://{}/in", hook),
            "events": ["report.generated"],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let webhook_id = created["id"].as_str().unwrap().to_string();

    let result: Value = client
        .post(format!("{}/api/webhooks/{}/test", url, webhook_id))
        .header("X-User-Id", "u1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result["isSuccess"], true);
    assert_eq!(result["statusCode"], 204);
    assert_eq!(hook_captured.len(), 1);

    let listed: Value = client
        .get(format!("{}/api/webhooks", url))
        .header("X-User-Id", "u1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed[0]["failureCount"], 0);
    assert!(listed[0].get("secret").is_none());

    shutdown.trigger();
}
