use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_TIMESTAMP_TOLERANCE_SECS: u64 = 300;

/// Completed-order notification from the payment subsystem. Trusted once
/// the signature checks out; this service never reads order state from
/// anywhere else.
#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct OrderCompletedNotification {
    pub order_id: Uuid,
    pub buyer_id: Uuid,
    /// Free-form code identifiers the order applied (may be comma-joined)
    #[serde(default)]
    pub applied_code_identifiers: Vec<String>,
    /// Total discount the order applied across those codes
    #[serde(default)]
    pub applied_discount_amount: Decimal,
}

/// Internal event hook invoked by the order/payment subsystem when an order
/// settles. Delivery is at-least-once; both consumers are idempotent, and
/// their failures are logged but never surfaced to the dispatcher, which
/// would otherwise retry an already-settled order.
#[utoipa::path(
    post,
    path = "/api/v1/orders/completed",
    request_body = OrderCompletedNotification,
    responses(
        (status = 200, description = "Notification acknowledged"),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn order_completed(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Value> {
    if let Some(secret) = state.config.order_webhook_secret.clone() {
        let tolerance = state
            .config
            .order_webhook_tolerance_secs
            .unwrap_or(DEFAULT_TIMESTAMP_TOLERANCE_SECS);
        if !verify_signature(&headers, &body, &secret, tolerance) {
            warn!("Completed-order notification signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let notification: OrderCompletedNotification = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid json: {}", e)))?;
    notification
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    info!(
        order_id = %notification.order_id,
        buyer_id = %notification.buyer_id,
        "Completed-order notification received"
    );

    // One-way from here on: every outcome is an ack.
    if let Err(err) = state
        .services
        .rewards
        .handle_order_completed(notification.buyer_id, notification.order_id)
        .await
    {
        error!(
            error = %err,
            order_id = %notification.order_id,
            "Reward issuance failed for completed order"
        );
    }

    if let Err(err) = state
        .services
        .reconciliation
        .reconcile_order(
            notification.buyer_id,
            notification.order_id,
            &notification.applied_code_identifiers,
            notification.applied_discount_amount,
        )
        .await
    {
        error!(
            error = %err,
            order_id = %notification.order_id,
            "Reconciliation failed for completed order"
        );
    }

    Ok(Json(ApiResponse::success(json!({
        "acknowledged": true,
        "order_id": notification.order_id,
    }))))
}

/// Generic HMAC scheme: `x-timestamp` and `x-signature` headers, signature
/// is hex HMAC-SHA256 over `"{timestamp}.{body}"`.
fn verify_signature(headers: &HeaderMap, payload: &Bytes, secret: &str, tolerance_secs: u64) -> bool {
    let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) else {
        return false;
    };
    let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) else {
        return false;
    };

    if let Ok(ts_i) = ts.parse::<i64>() {
        let now = chrono::Utc::now().timestamp();
        if (now - ts_i).unsigned_abs() > tolerance_secs {
            return false;
        }
    } else {
        return false;
    }

    let signed = format!("{}.{}", ts, std::str::from_utf8(payload).unwrap_or(""));
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, sig)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

pub fn order_events_routes() -> Router<AppState> {
    Router::new().route("/completed", post(order_completed))
}
