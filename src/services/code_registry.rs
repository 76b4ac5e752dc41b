use crate::{
    config::AppConfig,
    db::DbPool,
    entities::promo_code::{
        self, ActiveModel as PromoCodeActiveModel, CodeKind, DiscountType, Entity as PromoCode,
        Model as PromoCodeModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Code alphabet: uppercase without 0/O/1/I so support staff can read codes
/// back over the phone.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_SUFFIX_LEN: usize = 8;
const REFERRAL_PREFIX: &str = "REF";
const REWARD_PREFIX: &str = "RWD";

/// Creation retries on code-string collision before giving up.
const CODE_CREATE_MAX_ATTEMPTS: u32 = 4;

/// Canonical form of a user-entered code: trimmed, ASCII-uppercased.
/// Generated codes are already canonical.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Reproducible referral code for `user_id`. Attempt 0 is a pure function
/// of the user id, so a retry after a transient failure regenerates the
/// same string instead of minting a duplicate; higher attempts salt the
/// digest to step past genuine collisions.
fn derive_referral_code(user_id: Uuid, attempt: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(attempt.to_be_bytes());
    let digest = hasher.finalize();

    let mut code = String::with_capacity(REFERRAL_PREFIX.len() + CODE_SUFFIX_LEN);
    code.push_str(REFERRAL_PREFIX);
    for byte in digest.iter().take(CODE_SUFFIX_LEN) {
        code.push(CODE_ALPHABET[(*byte as usize) % CODE_ALPHABET.len()] as char);
    }
    code
}

fn random_reward_code() -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(REWARD_PREFIX.len() + CODE_SUFFIX_LEN);
    code.push_str(REWARD_PREFIX);
    for _ in 0..CODE_SUFFIX_LEN {
        let idx = rng.gen_range(0..CODE_ALPHABET.len());
        code.push(CODE_ALPHABET[idx] as char);
    }
    code
}

/// Issuance parameters for the codes this registry mints.
#[derive(Debug, Clone)]
pub struct CodePolicy {
    /// Percent discount carried by reward codes (0-100)
    pub reward_discount_percent: Decimal,
    /// Reward codes expire this many days after issuance
    pub reward_validity_days: i64,
    /// Referral codes stay valid this many years after creation
    pub referral_validity_years: i64,
}

impl Default for CodePolicy {
    fn default() -> Self {
        Self {
            reward_discount_percent: Decimal::from(15),
            reward_validity_days: 3,
            referral_validity_years: 30,
        }
    }
}

impl CodePolicy {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            reward_discount_percent: Decimal::from(cfg.reward_discount_percent),
            reward_validity_days: cfg.reward_validity_days,
            referral_validity_years: cfg.referral_validity_years,
        }
    }
}

/// Owns code-format and validity-window rules; creates and looks up
/// promotional and referral code records.
#[derive(Clone)]
pub struct CodeRegistryService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    policy: CodePolicy,
}

impl CodeRegistryService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>, policy: CodePolicy) -> Self {
        Self {
            db,
            event_sender,
            policy,
        }
    }

    /// Returns the user's referral code, creating it on first call.
    ///
    /// Idempotent: an existing Referral-kind row is returned unchanged even
    /// if historically consumed. The unique index on `code` arbitrates
    /// collisions; a concurrent create racing on the same user resolves by
    /// re-reading the winner's row.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_or_create_referral_code(
        &self,
        user_id: Uuid,
    ) -> Result<PromoCodeModel, ServiceError> {
        if let Some(existing) = self.find_referral_code(user_id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        for attempt in 0..CODE_CREATE_MAX_ATTEMPTS {
            let code = derive_referral_code(user_id, attempt);
            let code_id = Uuid::new_v4();

            let model = PromoCodeActiveModel {
                id: Set(code_id),
                code: Set(code.clone()),
                kind: Set(CodeKind::Referral),
                discount_amount: Set(Decimal::ZERO),
                discount_type: Set(DiscountType::Percentage),
                valid_from: Set(now),
                valid_until: Set(now + Duration::days(365 * self.policy.referral_validity_years)),
                max_usage: Set(None),
                usage_count: Set(0),
                owner_id: Set(Some(user_id)),
                has_balance_limit: Set(false),
                initial_balance: Set(None),
                remaining_balance: Set(None),
                created_at: Set(now),
                updated_at: Set(None),
            };

            match model.insert(&*self.db).await {
                Ok(created) => {
                    info!(code_id = %code_id, code = %created.code, "Referral code created");
                    if let Some(event_sender) = &self.event_sender {
                        if let Err(e) = event_sender
                            .send(Event::ReferralCodeCreated {
                                code_id,
                                owner_id: user_id,
                            })
                            .await
                        {
                            warn!(error = %e, code_id = %code_id, "Failed to send referral code created event");
                        }
                    }
                    return Ok(created);
                }
                Err(err) if super::is_unique_violation(&err) => {
                    // Either another request won the create for this user,
                    // or the derived string collides with a foreign code.
                    if let Some(existing) = self.find_referral_code(user_id).await? {
                        return Ok(existing);
                    }
                    warn!(attempt, code = %code, "Referral code collision, retrying with salted derivation");
                }
                Err(err) => return Err(ServiceError::DatabaseError(err)),
            }
        }

        Err(ServiceError::RegistryError(format!(
            "could not allocate a referral code for user {} within {} attempts",
            user_id, CODE_CREATE_MAX_ATTEMPTS
        )))
    }

    /// Resolves a normalized code string, validating its validity window.
    /// Usage-count checks are the caller's concern.
    pub async fn lookup_active_code(
        &self,
        code: &str,
    ) -> Result<Option<PromoCodeModel>, ServiceError> {
        let now = Utc::now();

        let found = PromoCode::find()
            .filter(promo_code::Column::Code.eq(code))
            .filter(promo_code::Column::ValidFrom.lte(now))
            .filter(promo_code::Column::ValidUntil.gte(now))
            .one(&*self.db)
            .await
            .map_err(ServiceError::from)?;

        Ok(found)
    }

    /// Mints a single-use, short-lived reward code for `owner_id`.
    #[instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn create_reward_code(&self, owner_id: Uuid) -> Result<PromoCodeModel, ServiceError> {
        let now = Utc::now();

        for attempt in 0..CODE_CREATE_MAX_ATTEMPTS {
            let code = random_reward_code();
            let model = PromoCodeActiveModel {
                id: Set(Uuid::new_v4()),
                code: Set(code.clone()),
                kind: Set(CodeKind::Reward),
                discount_amount: Set(self.policy.reward_discount_percent),
                discount_type: Set(DiscountType::Percentage),
                valid_from: Set(now),
                valid_until: Set(now + Duration::days(self.policy.reward_validity_days)),
                max_usage: Set(Some(1)),
                usage_count: Set(0),
                owner_id: Set(Some(owner_id)),
                has_balance_limit: Set(false),
                initial_balance: Set(None),
                remaining_balance: Set(None),
                created_at: Set(now),
                updated_at: Set(None),
            };

            match model.insert(&*self.db).await {
                Ok(created) => {
                    info!(code_id = %created.id, code = %created.code, "Reward code minted");
                    return Ok(created);
                }
                Err(err) if super::is_unique_violation(&err) => {
                    warn!(attempt, code = %code, "Reward code collision, regenerating");
                }
                Err(err) => return Err(ServiceError::DatabaseError(err)),
            }
        }

        Err(ServiceError::RegistryError(format!(
            "could not allocate a reward code for user {} within {} attempts",
            owner_id, CODE_CREATE_MAX_ATTEMPTS
        )))
    }

    /// Codes owned by `user_id` of the given kind, newest first. Backs the
    /// dashboard listings.
    pub async fn list_owned_codes(
        &self,
        user_id: Uuid,
        kind: CodeKind,
    ) -> Result<Vec<PromoCodeModel>, ServiceError> {
        PromoCode::find()
            .filter(promo_code::Column::OwnerId.eq(user_id))
            .filter(promo_code::Column::Kind.eq(kind))
            .order_by_desc(promo_code::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::from)
    }

    async fn find_referral_code(
        &self,
        user_id: Uuid,
    ) -> Result<Option<PromoCodeModel>, ServiceError> {
        PromoCode::find()
            .filter(promo_code::Column::OwnerId.eq(user_id))
            .filter(promo_code::Column::Kind.eq(CodeKind::Referral))
            .one(&*self.db)
            .await
            .map_err(ServiceError::from)
    }
}
