mod common;

use assert_matches::assert_matches;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::TestApp;
use promo_ledger_api::entities::promo_code::{self, CodeKind, DiscountType};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use uuid::Uuid;

/// Seed a promotional code directly, the way an admin tool would.
async fn seed_promo_code(
    app: &TestApp,
    code: &str,
    max_usage: Option<i32>,
    owner_id: Option<Uuid>,
) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let model = promo_code::ActiveModel {
        id: Set(id),
        code: Set(code.to_string()),
        kind: Set(CodeKind::Promotional),
        discount_amount: Set(dec!(10)),
        discount_type: Set(DiscountType::Percentage),
        valid_from: Set(now - Duration::days(1)),
        valid_until: Set(now + Duration::days(30)),
        max_usage: Set(max_usage),
        usage_count: Set(0),
        owner_id: Set(owner_id),
        has_balance_limit: Set(false),
        initial_balance: Set(None),
        remaining_balance: Set(None),
        created_at: Set(now),
        updated_at: Set(None),
    };

    model
        .insert(&*app.state.db)
        .await
        .expect("failed to seed promo code");

    id
}

#[tokio::test]
async fn get_or_create_referral_code_is_idempotent() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    let (status, body) = app
        .post_json("/api/v1/codes/referral", json!({ "user_id": user_id }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let first = body["data"]["code"].as_str().expect("code expected").to_string();
    assert!(first.starts_with("REF"));

    let (status, body) = app
        .post_json("/api/v1/codes/referral", json!({ "user_id": user_id }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["code"].as_str(), Some(first.as_str()));

    // Still the same code after someone redeems it.
    let redeemer = Uuid::new_v4();
    let (status, _) = app
        .post_json(
            "/api/v1/codes/redeem",
            json!({ "code": first, "redeemer_id": redeemer }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post_json("/api/v1/codes/referral", json!({ "user_id": user_id }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["code"].as_str(), Some(first.as_str()));
}

#[tokio::test]
async fn owner_cannot_redeem_own_code() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();

    let code = app
        .state
        .services
        .codes
        .get_or_create_referral_code(owner)
        .await
        .expect("failed to create referral code");

    let (status, body) = app
        .post_json(
            "/api/v1/codes/redeem",
            json!({ "code": code.code, "redeemer_id": owner }),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"]
        .as_str()
        .unwrap_or_default()
        .contains("cannot be redeemed by its owner"));
}

#[tokio::test]
async fn unknown_and_expired_codes_are_invalid() {
    let app = TestApp::new().await;
    let redeemer = Uuid::new_v4();

    let (status, _) = app
        .post_json(
            "/api/v1/codes/redeem",
            json!({ "code": "NOSUCHCODE", "redeemer_id": redeemer }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // An expired code behaves exactly like a missing one.
    let now = Utc::now();
    let expired = promo_code::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set("BYGONE".to_string()),
        kind: Set(CodeKind::Promotional),
        discount_amount: Set(dec!(5)),
        discount_type: Set(DiscountType::Fixed),
        valid_from: Set(now - Duration::days(30)),
        valid_until: Set(now - Duration::days(1)),
        max_usage: Set(Some(1)),
        usage_count: Set(0),
        owner_id: Set(None),
        has_balance_limit: Set(false),
        initial_balance: Set(None),
        remaining_balance: Set(None),
        created_at: Set(now - Duration::days(30)),
        updated_at: Set(None),
    };
    expired
        .insert(&*app.state.db)
        .await
        .expect("failed to seed expired code");

    let (status, _) = app
        .post_json(
            "/api/v1/codes/redeem",
            json!({ "code": "BYGONE", "redeemer_id": redeemer }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn user_input_is_normalized_before_lookup() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();

    let code = app
        .state
        .services
        .codes
        .get_or_create_referral_code(owner)
        .await
        .expect("failed to create referral code");

    let sloppy = format!("  {}  ", code.code.to_lowercase());
    let (status, _) = app
        .post_json(
            "/api/v1/codes/redeem",
            json!({ "code": sloppy, "redeemer_id": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn single_use_code_has_exactly_one_winner() {
    let app = TestApp::new().await;
    seed_promo_code(&app, "ONETIME", Some(1), None).await;

    let (status, _) = app
        .post_json(
            "/api/v1/codes/redeem",
            json!({ "code": "ONETIME", "redeemer_id": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post_json(
            "/api/v1/codes/redeem",
            json!({ "code": "ONETIME", "redeemer_id": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"]
        .as_str()
        .unwrap_or_default()
        .contains("no remaining uses"));
}

#[tokio::test]
async fn concurrent_redeems_of_single_use_code_yield_one_success() {
    let app = TestApp::new().await;
    seed_promo_code(&app, "RACE1", Some(1), None).await;

    let ledger = app.state.services.redemptions.clone();
    let (a, b, c) = tokio::join!(
        ledger.redeem("RACE1", Uuid::new_v4()),
        ledger.redeem("RACE1", Uuid::new_v4()),
        ledger.redeem("RACE1", Uuid::new_v4()),
    );

    let results = [a, b, c];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent redeem may win");

    for failure in results.iter().filter(|r| r.is_err()) {
        assert_matches!(
            failure,
            Err(promo_ledger_api::errors::ServiceError::CodeExhausted(_))
        );
    }
}

#[tokio::test]
async fn referred_purchase_mints_one_reward_code() {
    let app = TestApp::new().await;
    let referrer = Uuid::new_v4();
    let buyer = Uuid::new_v4();

    let referral = app
        .state
        .services
        .codes
        .get_or_create_referral_code(referrer)
        .await
        .expect("failed to create referral code");

    let (status, _) = app
        .post_json(
            "/api/v1/codes/redeem",
            json!({ "code": referral.code, "redeemer_id": buyer }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Order of 1000 with no applied discount completes.
    let order_id = Uuid::new_v4();
    let (status, body) = app
        .post_json(
            "/api/v1/orders/completed",
            json!({
                "order_id": order_id,
                "buyer_id": buyer,
                "applied_code_identifiers": [],
                "applied_discount_amount": "0",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["acknowledged"], json!(true));

    let (status, body) = app
        .get(&format!("/api/v1/codes/rewards/{}", referrer))
        .await;
    assert_eq!(status, StatusCode::OK);
    let rewards = body["data"].as_array().expect("reward list expected");
    assert_eq!(rewards.len(), 1);

    let reward = &rewards[0];
    assert!(reward["code"].as_str().unwrap_or_default().starts_with("RWD"));
    assert_eq!(reward["kind"].as_str(), Some("reward"));
    assert_eq!(reward["discount_type"].as_str(), Some("percentage"));
    assert_eq!(reward["discount_amount"].as_str(), Some("15"));
    assert_eq!(reward["max_usage"].as_i64(), Some(1));

    // Valid for roughly three days.
    let valid_until = reward["valid_until"]
        .as_str()
        .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
        .expect("valid_until expected");
    let lifetime = valid_until.with_timezone(&Utc) - Utc::now();
    assert!(lifetime > Duration::days(2) && lifetime < Duration::days(4));
}

#[tokio::test]
async fn duplicate_order_completion_issues_exactly_one_reward() {
    let app = TestApp::new().await;
    let referrer = Uuid::new_v4();
    let buyer = Uuid::new_v4();

    let referral = app
        .state
        .services
        .codes
        .get_or_create_referral_code(referrer)
        .await
        .expect("failed to create referral code");

    app.state
        .services
        .redemptions
        .redeem(&referral.code, buyer)
        .await
        .expect("failed to redeem referral code");

    let order_id = Uuid::new_v4();
    let payload = json!({
        "order_id": order_id,
        "buyer_id": buyer,
        "applied_code_identifiers": [],
        "applied_discount_amount": "0",
    });

    // At-least-once delivery: the dispatcher fires twice.
    let (status, _) = app.post_json("/api/v1/orders/completed", payload.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.post_json("/api/v1/orders/completed", payload).await;
    assert_eq!(status, StatusCode::OK);

    let rewards = promo_code::Entity::find()
        .filter(promo_code::Column::Kind.eq(CodeKind::Reward))
        .filter(promo_code::Column::OwnerId.eq(referrer))
        .all(&*app.state.db)
        .await
        .expect("failed to list reward codes");
    assert_eq!(rewards.len(), 1, "a duplicate delivery must not double-issue");
}

#[tokio::test]
async fn buyer_without_referral_is_a_noop() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post_json(
            "/api/v1/orders/completed",
            json!({
                "order_id": Uuid::new_v4(),
                "buyer_id": Uuid::new_v4(),
                "applied_code_identifiers": [],
                "applied_discount_amount": "0",
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["acknowledged"], json!(true));
}

#[tokio::test]
async fn referral_listing_returns_the_single_code() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();

    let (_, created) = app
        .post_json("/api/v1/codes/referral", json!({ "user_id": user_id }))
        .await;
    let code = created["data"]["code"].as_str().expect("code expected");

    let (status, body) = app
        .get(&format!("/api/v1/codes/referral/{}", user_id))
        .await;
    assert_eq!(status, StatusCode::OK);

    let listed = body["data"].as_array().expect("list expected");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["code"].as_str(), Some(code));
    assert_eq!(listed[0]["kind"].as_str(), Some("referral"));
}
