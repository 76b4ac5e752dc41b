mod common;

use axum::http::StatusCode;
use common::TestApp;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const SECRET: &str = "test-webhook-secret";

fn sign(body: &str, ts: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).expect("hmac key");
    mac.update(format!("{}.{}", ts, body).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn notification() -> serde_json::Value {
    json!({
        "order_id": Uuid::new_v4(),
        "buyer_id": Uuid::new_v4(),
        "applied_code_identifiers": [],
        "applied_discount_amount": "0",
    })
}

#[tokio::test]
async fn signed_notification_is_accepted() {
    let app = TestApp::with_config(|cfg| {
        cfg.order_webhook_secret = Some(SECRET.to_string());
    })
    .await;

    let payload = notification();
    let body = payload.to_string();
    let ts = chrono::Utc::now().timestamp();

    let (status, response) = app
        .post_json_with_headers(
            "/api/v1/orders/completed",
            payload,
            &[
                ("x-timestamp", ts.to_string()),
                ("x-signature", sign(&body, ts)),
            ],
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"]["acknowledged"], json!(true));
}

#[tokio::test]
async fn unsigned_notification_is_rejected_when_secret_configured() {
    let app = TestApp::with_config(|cfg| {
        cfg.order_webhook_secret = Some(SECRET.to_string());
    })
    .await;

    let (status, _) = app
        .post_json("/api/v1/orders/completed", notification())
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tampered_body_is_rejected() {
    let app = TestApp::with_config(|cfg| {
        cfg.order_webhook_secret = Some(SECRET.to_string());
    })
    .await;

    let payload = notification();
    let ts = chrono::Utc::now().timestamp();
    let signature_for_other_body = sign("{}", ts);

    let (status, _) = app
        .post_json_with_headers(
            "/api/v1/orders/completed",
            payload,
            &[
                ("x-timestamp", ts.to_string()),
                ("x-signature", signature_for_other_body),
            ],
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_payload_is_rejected_without_processing() {
    let app = TestApp::new().await;

    let (status, _) = app
        .post_json(
            "/api/v1/orders/completed",
            json!({ "order_id": "not-a-uuid" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
