use crate::{
    db::DbPool,
    entities::{
        promo_code::{self, CodeKind, Entity as PromoCode, Model as PromoCodeModel},
        redemption::{self, Entity as Redemption},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::code_registry::CodeRegistryService,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Mints a reward code for the referrer exactly once per qualifying
/// referral redemption. The completed-order notification is delivered
/// at-least-once, so the claim is a single conditional write; a duplicate
/// delivery finds the claim taken and no-ops.
#[derive(Clone)]
pub struct RewardIssuerService {
    db: Arc<DbPool>,
    registry: Arc<CodeRegistryService>,
    event_sender: Option<Arc<EventSender>>,
}

impl RewardIssuerService {
    pub fn new(
        db: Arc<DbPool>,
        registry: Arc<CodeRegistryService>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            registry,
            event_sender,
        }
    }

    /// Handles a completed order for `buyer_id`. Returns the minted reward
    /// code, or `None` when there is nothing to do: most buyers did not
    /// come through a referral, and duplicate deliveries land here too.
    #[instrument(skip(self), fields(buyer_id = %buyer_id, order_id = %order_id))]
    pub async fn handle_order_completed(
        &self,
        buyer_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<PromoCodeModel>, ServiceError> {
        // A redelivered notification may arrive after the buyer has made
        // further referral redemptions; one order funds at most one reward.
        let already_rewarded = Redemption::find()
            .filter(redemption::Column::OrderId.eq(order_id))
            .filter(redemption::Column::RewardIssuedAt.is_not_null())
            .count(&*self.db)
            .await
            .map_err(ServiceError::from)?;
        if already_rewarded > 0 {
            return Ok(None);
        }

        let candidate = Redemption::find()
            .find_also_related(PromoCode)
            .filter(redemption::Column::RedeemerId.eq(buyer_id))
            .filter(redemption::Column::RewardIssuedAt.is_null())
            .filter(
                Condition::any()
                    .add(redemption::Column::OrderId.is_null())
                    .add(redemption::Column::OrderId.eq(order_id)),
            )
            .filter(promo_code::Column::Kind.eq(CodeKind::Referral))
            .order_by_desc(redemption::Column::RedeemedAt)
            .one(&*self.db)
            .await
            .map_err(ServiceError::from)?;

        let Some((redeemed, Some(referral_code))) = candidate else {
            return Ok(None);
        };

        // Atomic claim: links the order and marks the reward issued in one
        // conditional write. Zero rows affected means another delivery of
        // this notification already claimed it.
        let claim = Redemption::update_many()
            .col_expr(redemption::Column::OrderId, Expr::value(Some(order_id)))
            .col_expr(
                redemption::Column::RewardIssuedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(redemption::Column::Id.eq(redeemed.id))
            .filter(redemption::Column::RewardIssuedAt.is_null())
            .exec(&*self.db)
            .await
            .map_err(ServiceError::from)?;

        if claim.rows_affected == 0 {
            info!(redemption_id = %redeemed.id, "Reward already claimed for this redemption");
            return Ok(None);
        }

        let Some(referrer_id) = referral_code.owner_id else {
            // Referral codes are always created with an owner; a row
            // without one is an operator problem, not the order's.
            self.report_issuance_failure(redeemed.id, buyer_id, "referral code has no owner")
                .await;
            return Ok(None);
        };

        match self.registry.create_reward_code(referrer_id).await {
            Ok(reward) => {
                info!(
                    reward_code_id = %reward.id,
                    referrer_id = %referrer_id,
                    redemption_id = %redeemed.id,
                    "Reward code issued for referred purchase"
                );
                if let Some(event_sender) = &self.event_sender {
                    if let Err(e) = event_sender
                        .send(Event::RewardCodeIssued {
                            code_id: reward.id,
                            owner_id: referrer_id,
                            redemption_id: redeemed.id,
                        })
                        .await
                    {
                        warn!(error = %e, "Failed to send reward code issued event");
                    }
                }
                Ok(Some(reward))
            }
            Err(err) => {
                // The claim is durable, so a retry will not double-issue;
                // the referrer is owed a code until an operator remediates.
                self.report_issuance_failure(redeemed.id, referrer_id, &err.to_string())
                    .await;
                Ok(None)
            }
        }
    }

    async fn report_issuance_failure(&self, redemption_id: Uuid, referrer_id: Uuid, reason: &str) {
        error!(
            redemption_id = %redemption_id,
            referrer_id = %referrer_id,
            reason = %reason,
            "Reward code creation failed after claim; manual remediation required"
        );
        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::RewardIssuanceFailed {
                    redemption_id,
                    referrer_id,
                    reason: reason.to_string(),
                })
                .await
            {
                warn!(error = %e, "Failed to send reward issuance failure event");
            }
        }
    }
}
