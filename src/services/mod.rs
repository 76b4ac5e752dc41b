pub mod code_registry;
pub mod reconciliation;
pub mod redemption_ledger;
pub mod reward_issuer;

pub use code_registry::CodeRegistryService;
pub use reconciliation::ReconciliationService;
pub use redemption_ledger::RedemptionLedgerService;
pub use reward_issuer::RewardIssuerService;

use sea_orm::{DbErr, SqlErr};

/// True when the store rejected a write because of a unique constraint.
/// Several invariants here are enforced by letting the store arbitrate and
/// translating the violation into the matching business error.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
