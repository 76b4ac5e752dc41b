use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only ledger of code applications at checkout. A row is created
/// pending (`order_id` null) and linked exactly once when the order the
/// redeemer was checking out completes. `reward_issued_at` is set at most
/// once, and only for redemptions of referral codes.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "redemptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub code_id: Uuid,
    pub redeemer_id: Uuid,
    pub redeemed_at: DateTime<Utc>,

    pub order_id: Option<Uuid>,
    pub reward_issued_at: Option<DateTime<Utc>>,

    /// Populated (= `code_id`) only for single-use codes. The unique index
    /// on this column makes the insert the at-most-one-winner arbiter;
    /// NULLs (unlimited codes) never collide.
    #[sea_orm(unique)]
    pub exclusive_code_id: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::promo_code::Entity",
        from = "Column::CodeId",
        to = "super::promo_code::Column::Id"
    )]
    PromoCode,
}

impl Related<super::promo_code::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PromoCode.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
