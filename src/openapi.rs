use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Promo Ledger API",
        version = "0.2.0",
        description = r#"
Referral and reward code ledger.

- **Codes**: per-user referral codes (idempotent get-or-create), checkout
  redemption with self-referral and exhaustion rules, dashboard listings.
- **Orders**: internal completed-order hook that mints referrer rewards
  exactly once per qualifying redemption and reconciles usage counters and
  prepaid balances for promotional codes.

Redemption is advisory until the linked order completes: counters and
balances only move on confirmed payment.
"#
    ),
    paths(
        crate::handlers::codes::create_referral_code,
        crate::handlers::codes::redeem_code,
        crate::handlers::codes::list_referral_code,
        crate::handlers::codes::list_reward_codes,
        crate::handlers::order_events::order_completed,
    ),
    components(schemas(
        crate::handlers::codes::CreateReferralCodeRequest,
        crate::handlers::codes::RedeemCodeRequest,
        crate::handlers::codes::RedeemCodeResponse,
        crate::handlers::codes::CodeSummary,
        crate::handlers::order_events::OrderCompletedNotification,
        crate::entities::promo_code::CodeKind,
        crate::entities::promo_code::DiscountType,
        crate::errors::ErrorResponse,
    )),
    tags(
        (name = "Codes", description = "Referral and promotional code registry and redemption"),
        (name = "Orders", description = "Completed-order event hook")
    )
)]
pub struct ApiDoc;
