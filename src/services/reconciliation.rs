use crate::{
    db::DbPool,
    entities::{
        promo_code::{self, CodeKind, Entity as PromoCode},
        redemption::{self, Entity as Redemption},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Bounded retries when an optimistic counter/balance update loses a race.
const RECONCILE_MAX_ATTEMPTS: u32 = 3;

/// Outcome of reconciling one completed order. Informational only: nothing
/// in here can fail the order.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconciliationSummary {
    pub codes_reconciled: u32,
    pub balances_debited: u32,
    pub failures: u32,
}

/// Best-effort match of a promo code against an order's free-form applied
/// identifiers: exact, or containment in a comma-delimited entry. Isolated
/// here so a structured `(code_id, amount)` feed from the payment subsystem
/// can replace it without touching the ledger.
pub fn order_applied_code(applied_identifiers: &[String], code: &str) -> bool {
    applied_identifiers.iter().any(|entry| {
        let entry = entry.trim();
        entry.eq_ignore_ascii_case(code)
            || entry
                .split(',')
                .any(|part| part.trim().eq_ignore_ascii_case(code))
    })
}

fn clamped_debit(remaining: Decimal, amount: Decimal) -> Decimal {
    (remaining - amount).max(Decimal::ZERO)
}

/// Converts pending discount-code redemptions into durable usage and balance
/// accounting once the linked order settles.
#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl ReconciliationService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Reconciles the buyer's pending discount-code redemptions against a
    /// completed order. Per-code failures are logged and skipped; the loop
    /// always runs to completion.
    #[instrument(skip(self, applied_identifiers), fields(buyer_id = %buyer_id, order_id = %order_id))]
    pub async fn reconcile_order(
        &self,
        buyer_id: Uuid,
        order_id: Uuid,
        applied_identifiers: &[String],
        applied_discount_amount: Decimal,
    ) -> Result<ReconciliationSummary, ServiceError> {
        // Referral redemptions belong to the reward issuer; every other
        // kind is an ordinary discount code with usage accounting.
        let pending = Redemption::find()
            .find_also_related(PromoCode)
            .filter(redemption::Column::RedeemerId.eq(buyer_id))
            .filter(redemption::Column::OrderId.is_null())
            .filter(promo_code::Column::Kind.ne(CodeKind::Referral))
            .all(&*self.db)
            .await
            .map_err(ServiceError::from)?;

        let mut summary = ReconciliationSummary::default();

        for (redeemed, maybe_code) in pending {
            let Some(code) = maybe_code else {
                warn!(redemption_id = %redeemed.id, "Redemption references a missing code");
                summary.failures += 1;
                continue;
            };

            // Claim the redemption for this order first; a duplicate
            // delivery of the notification finds it linked and skips.
            let claim = Redemption::update_many()
                .col_expr(redemption::Column::OrderId, Expr::value(Some(order_id)))
                .filter(redemption::Column::Id.eq(redeemed.id))
                .filter(redemption::Column::OrderId.is_null())
                .exec(&*self.db)
                .await;

            match claim {
                Ok(result) if result.rows_affected == 1 => {}
                Ok(_) => {
                    info!(redemption_id = %redeemed.id, "Redemption already reconciled");
                    continue;
                }
                Err(err) => {
                    error!(error = %err, redemption_id = %redeemed.id, "Failed to link redemption to order");
                    summary.failures += 1;
                    continue;
                }
            }

            if let Err(err) = self.increment_usage_count(code.id).await {
                error!(error = %err, code_id = %code.id, "Failed to increment usage count");
                summary.failures += 1;
                continue;
            }

            if code.has_balance_limit {
                if order_applied_code(applied_identifiers, &code.code) {
                    match self
                        .debit_balance(code.id, applied_discount_amount)
                        .await
                    {
                        Ok(()) => summary.balances_debited += 1,
                        Err(err) => {
                            error!(error = %err, code_id = %code.id, "Failed to debit code balance");
                            summary.failures += 1;
                        }
                    }
                } else {
                    // Deliberate soft-failure: a formatting mismatch in the
                    // order's identifiers must not block usage accounting.
                    warn!(
                        code = %code.code,
                        order_id = %order_id,
                        "Order identifiers do not reference this code; usage counted, debit skipped"
                    );
                }
            }

            summary.codes_reconciled += 1;
        }

        if summary.codes_reconciled > 0 {
            if let Some(event_sender) = &self.event_sender {
                if let Err(e) = event_sender
                    .send(Event::OrderReconciled {
                        order_id,
                        buyer_id,
                        codes_reconciled: summary.codes_reconciled,
                    })
                    .await
                {
                    warn!(error = %e, order_id = %order_id, "Failed to send order reconciled event");
                }
            }
        }

        info!(
            codes_reconciled = summary.codes_reconciled,
            balances_debited = summary.balances_debited,
            failures = summary.failures,
            "Order reconciliation finished"
        );

        Ok(summary)
    }

    /// Increments a code's usage counter, retrying a bounded number of
    /// times when the optimistic check loses to a concurrent writer.
    async fn increment_usage_count(&self, code_id: Uuid) -> Result<(), ServiceError> {
        for _ in 0..RECONCILE_MAX_ATTEMPTS {
            let code = PromoCode::find_by_id(code_id)
                .one(&*self.db)
                .await
                .map_err(ServiceError::from)?
                .ok_or_else(|| ServiceError::NotFound(format!("code {} not found", code_id)))?;

            if let Some(max_usage) = code.max_usage {
                if code.usage_count >= max_usage {
                    warn!(code_id = %code_id, usage_count = code.usage_count, "Usage counter already at limit");
                    return Ok(());
                }
            }

            let updated = PromoCode::update_many()
                .col_expr(
                    promo_code::Column::UsageCount,
                    Expr::value(code.usage_count + 1),
                )
                .col_expr(
                    promo_code::Column::UpdatedAt,
                    Expr::value(Some(Utc::now())),
                )
                .filter(promo_code::Column::Id.eq(code_id))
                .filter(promo_code::Column::UsageCount.eq(code.usage_count))
                .exec(&*self.db)
                .await
                .map_err(ServiceError::from)?;

            if updated.rows_affected == 1 {
                return Ok(());
            }
        }

        Err(ServiceError::ConcurrentModification(code_id))
    }

    /// Debits a balance-limited code by the order's applied discount,
    /// clamped at zero. The conditional write on the previously read value
    /// serializes concurrent debits of the same code.
    async fn debit_balance(&self, code_id: Uuid, amount: Decimal) -> Result<(), ServiceError> {
        if amount <= Decimal::ZERO {
            return Ok(());
        }

        for _ in 0..RECONCILE_MAX_ATTEMPTS {
            let code = PromoCode::find_by_id(code_id)
                .one(&*self.db)
                .await
                .map_err(ServiceError::from)?
                .ok_or_else(|| ServiceError::NotFound(format!("code {} not found", code_id)))?;

            let Some(remaining) = code.remaining_balance else {
                warn!(code_id = %code_id, "Balance-limited code has no remaining balance column");
                return Ok(());
            };

            let new_balance = clamped_debit(remaining, amount);

            let updated = PromoCode::update_many()
                .col_expr(
                    promo_code::Column::RemainingBalance,
                    Expr::value(Some(new_balance)),
                )
                .col_expr(
                    promo_code::Column::UpdatedAt,
                    Expr::value(Some(Utc::now())),
                )
                .filter(promo_code::Column::Id.eq(code_id))
                .filter(promo_code::Column::RemainingBalance.eq(remaining))
                .exec(&*self.db)
                .await
                .map_err(ServiceError::from)?;

            if updated.rows_affected == 1 {
                return Ok(());
            }
        }

        Err(ServiceError::ConcurrentModification(code_id))
    }
}
