use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// The events this subsystem emits. Post-payment anomalies surface here so
// operators can remediate without the payment subsystem ever seeing a
// failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Code registry events
    ReferralCodeCreated {
        code_id: Uuid,
        owner_id: Uuid,
    },
    RewardCodeIssued {
        code_id: Uuid,
        owner_id: Uuid,
        redemption_id: Uuid,
    },

    // Redemption ledger events
    CodeRedeemed {
        code_id: Uuid,
        redemption_id: Uuid,
        redeemer_id: Uuid,
    },

    // Post-payment events
    OrderReconciled {
        order_id: Uuid,
        buyer_id: Uuid,
        codes_reconciled: u32,
    },
    /// The reward claim was durably recorded but minting the reward code
    /// failed; the referrer is owed a code until an operator remediates.
    RewardIssuanceFailed {
        redemption_id: Uuid,
        referrer_id: Uuid,
        reason: String,
    },

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Create a generic event with string data
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

// Processes incoming events. Everything here is observability-only; ledger
// correctness never depends on an event being delivered.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::ReferralCodeCreated { code_id, owner_id } => {
                info!(%code_id, %owner_id, "Referral code created");
            }
            Event::RewardCodeIssued {
                code_id,
                owner_id,
                redemption_id,
            } => {
                info!(%code_id, %owner_id, %redemption_id, "Reward code issued");
            }
            Event::CodeRedeemed {
                code_id,
                redemption_id,
                redeemer_id,
            } => {
                info!(%code_id, %redemption_id, %redeemer_id, "Code redeemed at checkout");
            }
            Event::OrderReconciled {
                order_id,
                buyer_id,
                codes_reconciled,
            } => {
                info!(%order_id, %buyer_id, codes_reconciled, "Order reconciled");
            }
            Event::RewardIssuanceFailed {
                redemption_id,
                referrer_id,
                reason,
            } => {
                // Operator-visible inconsistency: claim is durable, reward
                // code is missing. Needs manual remediation.
                error!(%redemption_id, %referrer_id, %reason, "Reward issuance failed after claim");
            }
            Event::Generic { message, .. } => {
                info!("Event: {}", message);
            }
        }
    }

    warn!("Event processing loop has ended");
}
