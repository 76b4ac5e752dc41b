use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::promo_code::{self, CodeKind, DiscountType},
    errors::ServiceError,
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateReferralCodeRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct RedeemCodeRequest {
    #[validate(length(min = 1, max = 64, message = "Code must be between 1 and 64 characters"))]
    pub code: String,
    pub redeemer_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RedeemCodeResponse {
    pub redemption_id: Uuid,
}

/// Code shape exposed to dashboards: enough to display and apply the code,
/// nothing about other users' redemptions.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CodeSummary {
    pub code: String,
    pub kind: CodeKind,
    pub discount_amount: Decimal,
    pub discount_type: DiscountType,
    pub valid_until: DateTime<Utc>,
    pub usage_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_usage: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_balance: Option<Decimal>,
}

impl From<promo_code::Model> for CodeSummary {
    fn from(model: promo_code::Model) -> Self {
        Self {
            code: model.code,
            kind: model.kind,
            discount_amount: model.discount_amount,
            discount_type: model.discount_type,
            valid_until: model.valid_until,
            usage_count: model.usage_count,
            max_usage: model.max_usage,
            remaining_balance: model.remaining_balance,
        }
    }
}

/// Get or create the caller's referral code. Idempotent: repeated calls
/// return the same code string.
#[utoipa::path(
    post,
    path = "/api/v1/codes/referral",
    request_body = CreateReferralCodeRequest,
    responses(
        (status = 200, description = "Referral code for the user"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "Codes"
)]
pub async fn create_referral_code(
    State(state): State<AppState>,
    Json(payload): Json<CreateReferralCodeRequest>,
) -> ApiResult<CodeSummary> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let code = state
        .services
        .codes
        .get_or_create_referral_code(payload.user_id)
        .await?;

    Ok(Json(ApiResponse::success(code.into())))
}

/// Apply a code at checkout for a redeeming user.
#[utoipa::path(
    post,
    path = "/api/v1/codes/redeem",
    request_body = RedeemCodeRequest,
    responses(
        (status = 200, description = "Code redeemed"),
        (status = 409, description = "Code has no remaining uses", body = crate::errors::ErrorResponse),
        (status = 422, description = "Invalid code or self-redemption", body = crate::errors::ErrorResponse)
    ),
    tag = "Codes"
)]
pub async fn redeem_code(
    State(state): State<AppState>,
    Json(payload): Json<RedeemCodeRequest>,
) -> ApiResult<RedeemCodeResponse> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let redemption_id = state
        .services
        .redemptions
        .redeem(&payload.code, payload.redeemer_id)
        .await?;

    Ok(Json(ApiResponse::success(RedeemCodeResponse {
        redemption_id,
    })))
}

/// The user's referral code listing (zero or one entry).
#[utoipa::path(
    get,
    path = "/api/v1/codes/referral/{user_id}",
    params(("user_id" = Uuid, Path, description = "Owner user id")),
    responses((status = 200, description = "Referral codes owned by the user")),
    tag = "Codes"
)]
pub async fn list_referral_code(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Vec<CodeSummary>> {
    let codes = state
        .services
        .codes
        .list_owned_codes(user_id, CodeKind::Referral)
        .await?;

    Ok(Json(ApiResponse::success(
        codes.into_iter().map(CodeSummary::from).collect(),
    )))
}

/// Reward codes minted for the user's referred purchases.
#[utoipa::path(
    get,
    path = "/api/v1/codes/rewards/{user_id}",
    params(("user_id" = Uuid, Path, description = "Owner user id")),
    responses((status = 200, description = "Reward codes owned by the user")),
    tag = "Codes"
)]
pub async fn list_reward_codes(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Vec<CodeSummary>> {
    let codes = state
        .services
        .codes
        .list_owned_codes(user_id, CodeKind::Reward)
        .await?;

    Ok(Json(ApiResponse::success(
        codes.into_iter().map(CodeSummary::from).collect(),
    )))
}

pub fn codes_routes() -> Router<AppState> {
    Router::new()
        .route("/referral", post(create_referral_code))
        .route("/redeem", post(redeem_code))
        .route("/referral/:user_id", get(list_referral_code))
        .route("/rewards/:user_id", get(list_reward_codes))
}
