use crate::{
    db::DbPool,
    entities::redemption::{self, ActiveModel as RedemptionActiveModel, Entity as Redemption},
    errors::ServiceError,
    events::{Event, EventSender},
    services::code_registry::{normalize_code, CodeRegistryService},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Records each application of a code at checkout. Recording is advisory
/// until the linked order completes: no usage counter moves and no balance
/// is debited here, so an abandoned checkout never consumes a limited-use
/// code.
#[derive(Clone)]
pub struct RedemptionLedgerService {
    db: Arc<DbPool>,
    registry: Arc<CodeRegistryService>,
    event_sender: Option<Arc<EventSender>>,
}

impl RedemptionLedgerService {
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

    /// Applies `raw_code` for `redeemer_id` and returns the new redemption
    /// id. The checkout flow supplies the resulting order id later, once
    /// payment starts.
    #[instrument(skip(self, raw_code), fields(redeemer_id = %redeemer_id))]
    pub async fn redeem(&self, raw_code: &str, redeemer_id: Uuid) -> Result<Uuid, ServiceError> {
        let code_str = normalize_code(raw_code);
        if code_str.is_empty() {
            return Err(ServiceError::ValidationError("code is required".to_string()));
        }

        let code = self
            .registry
            .lookup_active_code(&code_str)
            .await?
            .ok_or_else(|| ServiceError::InvalidCode(code_str.clone()))?;

        if code.owner_id == Some(redeemer_id) {
            return Err(ServiceError::SelfRedemptionNotAllowed);
        }

        if let Some(max_usage) = code.max_usage {
            let existing = Redemption::find()
                .filter(redemption::Column::CodeId.eq(code.id))
                .count(&*self.db)
                .await
                .map_err(ServiceError::from)?;
            if existing >= max_usage.max(0) as u64 {
                return Err(ServiceError::CodeExhausted(code_str));
            }
        }

        let redemption_id = Uuid::new_v4();
        let row = RedemptionActiveModel {
            id: Set(redemption_id),
            code_id: Set(code.id),
            redeemer_id: Set(redeemer_id),
            redeemed_at: Set(Utc::now()),
            order_id: Set(None),
            reward_issued_at: Set(None),
            // The unique index on this column is what makes the usage-count
            // check above race-safe for single-use codes.
            exclusive_code_id: Set(code.is_single_use().then_some(code.id)),
        };

        match row.insert(&*self.db).await {
            Ok(_) => {}
            Err(err) if super::is_unique_violation(&err) => {
                // A concurrent redeemer won the only slot.
                return Err(ServiceError::CodeExhausted(code_str));
            }
            Err(err) => return Err(ServiceError::DatabaseError(err)),
        }

        info!(code_id = %code.id, redemption_id = %redemption_id, "Code redeemed");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::CodeRedeemed {
                    code_id: code.id,
                    redemption_id,
                    redeemer_id,
                })
                .await
            {
                warn!(error = %e, redemption_id = %redemption_id, "Failed to send code redeemed event");
            }
        }

        Ok(redemption_id)
    }
}
