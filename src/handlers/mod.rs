pub mod codes;
pub mod order_events;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    code_registry::CodePolicy, CodeRegistryService, ReconciliationService,
    RedemptionLedgerService, RewardIssuerService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub codes: Arc<CodeRegistryService>,
    pub redemptions: Arc<RedemptionLedgerService>,
    pub rewards: Arc<RewardIssuerService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, policy: CodePolicy) -> Self {
        let codes = Arc::new(CodeRegistryService::new(
            db.clone(),
            Some(event_sender.clone()),
            policy,
        ));
        let redemptions = Arc::new(RedemptionLedgerService::new(
            db.clone(),
            codes.clone(),
            Some(event_sender.clone()),
        ));
        let rewards = Arc::new(RewardIssuerService::new(
            db.clone(),
            codes.clone(),
            Some(event_sender.clone()),
        ));
        let reconciliation = Arc::new(ReconciliationService::new(db, Some(event_sender)));

        Self {
            codes,
            redemptions,
            rewards,
            reconciliation,
        }
    }
}
