use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// What a code is for. Referral codes belong to a referrer and are
/// redeemable indefinitely; reward codes are minted for a referrer after a
/// referred purchase settles; promotional codes are ordinary discounts.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    #[sea_orm(string_value = "referral")]
    Referral,
    #[sea_orm(string_value = "reward")]
    Reward,
    #[sea_orm(string_value = "promotional")]
    Promotional,
}

impl std::fmt::Display for CodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeKind::Referral => write!(f, "referral"),
            CodeKind::Reward => write!(f, "reward"),
            CodeKind::Promotional => write!(f, "promotional"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// Interpreted as 0-100 against the order subtotal.
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promo_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-enterable code string, unique store-wide. Generated server-side
    /// as uppercase ASCII; user input is normalized before lookup.
    #[sea_orm(unique)]
    pub code: String,

    pub kind: CodeKind,
    pub discount_amount: Decimal,
    pub discount_type: DiscountType,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,

    /// None means unbounded usage (referral codes).
    pub max_usage: Option<i32>,
    pub usage_count: i32,

    /// The user who benefits from redemptions: the referrer for Referral
    /// and Reward kinds. House promotional codes may have no owner.
    pub owner_id: Option<Uuid>,

    pub has_balance_limit: bool,
    pub initial_balance: Option<Decimal>,
    pub remaining_balance: Option<Decimal>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::redemption::Entity")]
    Redemptions,
}

impl Related<super::redemption::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Redemptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Single-use codes get the insert-level redemption guard.
    pub fn is_single_use(&self) -> bool {
        self.max_usage == Some(1)
    }
}
