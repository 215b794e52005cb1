//! SmsSender against a local fake gateway.
//!
//! The fake gateway is an in-process Axum server bound to an ephemeral port,
//! so these tests need no network access beyond loopback.

use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use courier_common::types::{NotificationMessage, NotificationType};
use courier_notifier::{DeliveryError, Sender, SmsConfig, SmsSender};

type Captured = Arc<Mutex<Vec<serde_json::Value>>>;

/// Start a fake SMS gateway answering every POST with `status` and `body`.
async fn spawn_gateway(status: StatusCode, body: &'static str) -> (String, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();

    let app = Router::new().route(
        "/text",
        post(move |Json(request): Json<serde_json::Value>| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(request);
                (status, body)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/text", addr), captured)
}

fn sender(api_url: String) -> SmsSender {
    SmsSender::new(SmsConfig {
        api_url,
        api_key: "test-key".to_string(),
    })
    .unwrap()
}

fn sms() -> NotificationMessage {
    NotificationMessage::new(NotificationType::Sms, "+15550100", "Your code is 1234")
}

#[tokio::test]
async fn test_ok_body_is_kept_as_detail() {
    let (url, captured) = spawn_gateway(StatusCode::OK, "OK").await;

    let receipt = sender(url).send(&sms()).await.unwrap();
    assert_eq!(receipt.detail.as_deref(), Some("OK"));

    let requests = captured.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["phone"], "+15550100");
    assert_eq!(requests[0]["message"], "Your code is 1234");
    assert_eq!(requests[0]["key"], "test-key");
}

#[tokio::test]
async fn test_non_2xx_is_rejected_with_body() {
    let (url, _) = spawn_gateway(StatusCode::SERVICE_UNAVAILABLE, "maintenance").await;

    let err = sender(url).send(&sms()).await.unwrap_err();
    match err {
        DeliveryError::Rejected { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_success_false_is_rejected() {
    let (url, _) = spawn_gateway(
        StatusCode::OK,
        r#"{"success":false,"error":"Out of quota"}"#,
    )
    .await;

    let err = sender(url).send(&sms()).await.unwrap_err();
    assert_eq!(err.detail(), r#"{"success":false,"error":"Out of quota"}"#);
}

#[tokio::test]
async fn test_unreachable_gateway_is_http_error() {
    let err = sender("http://127.0.0.1:1/text".to_string())
        .send(&sms())
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Http(_)));
}
