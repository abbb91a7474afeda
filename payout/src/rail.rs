//! Payout rail contract and a simulated implementation

use crate::{config::SimulatedRailConfig, Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::{PaymentMethod, WithdrawalRequest};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Definite answer from a rail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RailOutcome {
    /// Money sent
    Paid {
        /// Rail reference
        reference: String,
    },
    /// Rail refused the payout; nothing was sent
    Rejected {
        /// Why
        reason: String,
    },
}

/// External payout rail.
///
/// `execute` must be idempotent per withdrawal id: a second call for an id the
/// rail already handled returns the recorded outcome without paying again.
/// Errors mean "unknown"; the caller leaves the withdrawal `processing`.
#[async_trait]
pub trait PayoutRail: Send + Sync {
    /// Rail name for logs
    fn name(&self) -> &str;

    /// Pay out a withdrawal
    async fn execute(
        &self,
        withdrawal: &WithdrawalRequest,
        method: &PaymentMethod,
    ) -> Result<RailOutcome>;

    /// Outcome for a withdrawal id, `None` if the rail never saw it
    async fn lookup(&self, withdrawal_id: Uuid) -> Result<Option<RailOutcome>>;
}

#[derive(Debug, Clone)]
struct SimulatedPayout {
    outcome: RailOutcome,
    executed_at: DateTime<Utc>,
}

/// In-process rail with configurable latency and success rate
#[derive(Debug)]
pub struct SimulatedRail {
    latency: Duration,
    success_rate: f64,
    payouts: RwLock<HashMap<Uuid, SimulatedPayout>>,
}

impl SimulatedRail {
    /// Create simulated rail
    pub fn new(config: &SimulatedRailConfig) -> Self {
        Self {
            latency: Duration::from_millis(config.latency_ms),
            success_rate: config.success_rate,
            payouts: RwLock::new(HashMap::new()),
        }
    }

    fn should_succeed(&self) -> bool {
        let mut rng = rand::thread_rng();
        rng.gen::<f64>() < self.success_rate
    }

    /// Number of payouts recorded
    pub async fn executed_count(&self) -> usize {
        self.payouts.read().await.len()
    }

    /// When a withdrawal was executed
    pub async fn executed_at(&self, withdrawal_id: Uuid) -> Option<DateTime<Utc>> {
        self.payouts
            .read()
            .await
            .get(&withdrawal_id)
            .map(|p| p.executed_at)
    }
}

#[async_trait]
impl PayoutRail for SimulatedRail {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn execute(
        &self,
        withdrawal: &WithdrawalRequest,
        method: &PaymentMethod,
    ) -> Result<RailOutcome> {
        tokio::time::sleep(self.latency).await;

        let mut payouts = self.payouts.write().await;
        if let Some(existing) = payouts.get(&withdrawal.id) {
            return Ok(existing.outcome.clone());
        }

        if !method.verified {
            return Err(Error::Rail(format!(
                "payment method {} is not verified",
                method.id
            )));
        }

        let outcome = if self.should_succeed() {
            RailOutcome::Paid {
                reference: format!("SIM-{}", Uuid::new_v4().simple()),
            }
        } else {
            RailOutcome::Rejected {
                reason: "simulated rail rejection".to_string(),
            }
        };

        match &outcome {
            RailOutcome::Paid { reference } => info!(
                withdrawal_id = %withdrawal.id,
                amount = %withdrawal.amount,
                method = method.kind.as_str(),
                reference = %reference,
                "Simulated payout sent"
            ),
            RailOutcome::Rejected { reason } => warn!(
                withdrawal_id = %withdrawal.id,
                reason = %reason,
                "Simulated payout rejected"
            ),
        }

        payouts.insert(
            withdrawal.id,
            SimulatedPayout {
                outcome: outcome.clone(),
                executed_at: Utc::now(),
            },
        );
        Ok(outcome)
    }

    async fn lookup(&self, withdrawal_id: Uuid) -> Result<Option<RailOutcome>> {
        tokio::time::sleep(self.latency / 2).await;
        Ok(self
            .payouts
            .read()
            .await
            .get(&withdrawal_id)
            .map(|p| p.outcome.clone()))
    }
}
