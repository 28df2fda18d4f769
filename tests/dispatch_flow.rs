//! End-to-end dispatch and webhook delivery over real sockets.

mod common;

use std::time::Duration;

use connector_dispatch::config::loader::parse_config;
use connector_dispatch::dispatch::{Caller, SendRequest};
use connector_dispatch::model::HttpMethod;
use connector_dispatch::webhook::signing::verify;
use connector_dispatch::webhook::RegisterWebhook;
use connector_dispatch::{Engine, Shutdown};
use uuid::Uuid;

use common::{config_with_connector, eventually, start_mock_backend, start_programmable_backend};

const CONNECTOR_ID: &str = "7f1c0b8e-2d4a-4e55-9d2b-5b0f6a3e9c01";

async fn engine(base_url: &str, extra: &str) -> Engine {
    let config = parse_config(&config_with_connector(CONNECTOR_ID, base_url, extra)).unwrap();
    Engine::build(&config, Shutdown::new()).await.unwrap()
}

fn request(endpoint: &str) -> SendRequest {
    SendRequest {
        connector_id: CONNECTOR_ID.parse().unwrap(),
        endpoint: endpoint.to_string(),
        method: HttpMethod::Get,
        ..SendRequest::default()
    }
}

#[tokio::test]
async fn test_retries_until_success() {
    let (addr, captured) = start_programmable_backend(|attempt| async move {
        match attempt {
            1 | 2 => (503, r#"{"error":"busy"}"#.to_string()),
            _ => (200, r#"[{"id":1},{"id":2}]"#.to_string()),
        }
    })
    .await;
    let engine = engine(&format!("http://{}", addr), "").await;

    let mut send = request("/items");
    send.save_as_dataset = true;
    let result = engine.dispatcher.send(send, &Caller::new("u1")).await.unwrap();

    assert_eq!(result.status_code, 200);
    assert!(result.is_success);
    assert_eq!(result.retry_count, 2);
    assert_eq!(captured.len(), 3);
    assert!(result.dataset_id.is_some());

    let records = engine.dispatcher.list_call_records("u1").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].retry_count, 2);
    assert_eq!(records[0].request_url, format!("http://{}/items", addr));
}

#[tokio::test]
async fn test_non_retryable_status_is_recorded_once() {
    let (addr, captured) = start_mock_backend(404, r#"{"error":"missing"}"#).await;
    let engine = engine(&format!("http://{}", addr), "").await;

    let result = engine
        .dispatcher
        .send(request("/missing"), &Caller::new("u1"))
        .await
        .unwrap();

    assert_eq!(result.status_code, 404);
    assert!(!result.is_success);
    assert_eq!(result.retry_count, 0);
    assert_eq!(captured.len(), 1);
}

#[tokio::test]
async fn test_connection_refused_becomes_failed_record() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let engine = engine(&format!("http://{}", addr), "max_retries = 1").await;

    let result = engine
        .dispatcher
        .send(request("/down"), &Caller::new("u1"))
        .await
        .unwrap();

    assert_eq!(result.status_code, 0);
    assert!(!result.is_success);
    assert_eq!(result.retry_count, 1);
    assert!(result.error_message.is_some());
}

#[tokio::test]
async fn test_api_key_header_is_sent_and_not_recorded() {
    let (addr, captured) = start_mock_backend(200, "{}").await;
    let engine = engine(
        &format!("http://{}", addr),
        "auth_type = \"ApiKeyHeader\"\napi_key_header_name = \"X-Api-Key\"",
    )
    .await;
    let connector_id: Uuid = CONNECTOR_ID.parse().unwrap();
    engine
        .dispatcher
        .store_credentials("u1", connector_id, Some("k-789"), None)
        .await
        .unwrap();

    let mut send = request("/secure");
    send.headers.insert("X-Trace".into(), "abc".into());
    let result = engine.dispatcher.send(send, &Caller::new("u1")).await.unwrap();
    assert!(result.is_success);

    let seen = &captured.all()[0];
    assert_eq!(seen.headers.get("x-api-key").map(String::as_str), Some("k-789"));
    assert_eq!(seen.headers.get("x-trace").map(String::as_str), Some("abc"));

    let record = &engine.dispatcher.list_call_records("u1").await.unwrap()[0];
    assert!(!record.request_headers.values().any(|v| v.contains("k-789")));
}

#[tokio::test]
async fn test_completed_call_is_delivered_to_webhook() {
    let (api_addr, _) = start_mock_backend(200, r#"{"ok":true}"#).await;
    let (hook_addr, hook_captured) = start_mock_backend(200, "").await;
    let engine = engine(&format!("http://{}", api_addr), "").await;

    let webhook = engine
        .notifier
        .register(
            "u1",
            RegisterWebhook {
                name: "audit".into(),
                url: format!("http://{}/hooks", hook_addr),
                events: vec!["api.request.completed".into()],
                secret: Some("whsec_integration".into()),
            },
        )
        .await
        .unwrap();

    let result = engine
        .dispatcher
        .send(request("/ping"), &Caller::new("u1"))
        .await
        .unwrap();
    assert!(result.is_success);

    let delivered = eventually(Duration::from_secs(5), || {
        let captured = hook_captured.clone();
        async move { captured.len() == 1 }
    })
    .await;
    assert!(delivered, "webhook was not called");

    let seen = &hook_captured.all()[0];
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.path, "/hooks");
    assert_eq!(
        seen.headers.get("x-webhook-event").map(String::as_str),
        Some("api.request.completed")
    );
    assert_eq!(
        seen.headers.get("x-webhook-id").map(String::as_str),
        Some(webhook.id.to_string().as_str())
    );
    let signature = seen.headers.get("x-webhook-signature").unwrap();
    assert!(verify(&seen.body, "whsec_integration", signature));

    let envelope: serde_json::Value = serde_json::from_str(&seen.body).unwrap();
    assert_eq!(envelope["event"], "api.request.completed");
    assert_eq!(envelope["data"]["recordId"], result.record_id.to_string());

    let webhook_id = webhook.id;
    let recorded = eventually(Duration::from_secs(5), || {
        let notifier = engine.notifier.clone();
        async move { notifier.list_deliveries(webhook_id).await.unwrap().len() == 1 }
    })
    .await;
    assert!(recorded, "delivery was not recorded");
}
