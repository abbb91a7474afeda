//! Configuration for withdrawals

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Withdrawal processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalConfig {
    /// Smallest amount a user may withdraw
    #[serde(with = "ledger_core::decimal")]
    pub minimum_amount: Decimal,

    /// Mark new payment methods verified on creation
    pub auto_verify: bool,

    /// Deadline for one rail call (milliseconds)
    pub rail_timeout_ms: u64,

    /// Age after which a `processing` withdrawal is reconciled (seconds)
    pub reconcile_after_secs: u64,

    /// Simulated rail settings
    pub simulated_rail: SimulatedRailConfig,
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            minimum_amount: Decimal::from(100),
            auto_verify: false,
            rail_timeout_ms: 30_000,
            reconcile_after_secs: 300,
            simulated_rail: SimulatedRailConfig::default(),
        }
    }
}

impl WithdrawalConfig {
    /// Rail deadline
    pub fn rail_timeout(&self) -> Duration {
        Duration::from_millis(self.rail_timeout_ms)
    }

    /// Reconciliation threshold
    pub fn reconcile_after(&self) -> Duration {
        Duration::from_secs(self.reconcile_after_secs)
    }

    /// How long after `processing_started_at` a rail call may still land.
    ///
    /// Twice the deadline: a call abandoned at the timeout can still be
    /// executing on the rail side.
    pub fn in_flight_window(&self) -> Duration {
        self.rail_timeout() * 2
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.minimum_amount < Decimal::ZERO {
            return Err(crate::Error::Config(format!(
                "minimum_amount {} must not be negative",
                self.minimum_amount
            )));
        }
        if self.rail_timeout_ms == 0 {
            return Err(crate::Error::Config("rail_timeout_ms must be positive".to_string()));
        }
        if self.reconcile_after() <= self.in_flight_window() {
            return Err(crate::Error::Config(format!(
                "reconcile_after_secs {} must exceed twice rail_timeout_ms {}",
                self.reconcile_after_secs, self.rail_timeout_ms
            )));
        }
        let rate = self.simulated_rail.success_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(crate::Error::Config(format!(
                "simulated_rail.success_rate {} must be within [0, 1]",
                rate
            )));
        }
        Ok(())
    }
}

/// Simulated payout rail
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedRailConfig {
    /// Artificial latency per call (milliseconds)
    pub latency_ms: u64,

    /// Probability a payout succeeds
    pub success_rate: f64,
}

impl Default for SimulatedRailConfig {
    fn default() -> Self {
        Self {
            latency_ms: 50,
            success_rate: 1.0,
        }
    }
}
