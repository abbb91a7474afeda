//! Withdrawal processor
//!
//! Request validation, the pending → processing → completed/failed lifecycle
//! and reconciliation of payouts whose outcome was never acknowledged.
//!
//! Every reservation made by [`WithdrawalProcessor::request`] ends in exactly
//! one of: completed (moved to `total_withdrawn`), failed (restored to
//! `balance`), or still `processing` awaiting reconciliation.

use crate::{
    config::WithdrawalConfig,
    methods::PaymentMethods,
    rail::{PayoutRail, RailOutcome},
    Error, Result,
};
use chrono::Utc;
use ledger_core::{
    CashbackLedger, Settlement, UserId, WithdrawalRequest, WithdrawalStatus,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Stale `processing` withdrawals examined
    pub examined: usize,
    /// Settled as completed
    pub completed: usize,
    /// Settled as failed (rail rejected or never executed)
    pub failed: usize,
    /// Left `processing` (rail unreachable)
    pub unresolved: usize,
}

/// Withdrawal processor
pub struct WithdrawalProcessor {
    ledger: Arc<CashbackLedger>,
    methods: PaymentMethods,
    rail: Arc<dyn PayoutRail>,
    config: WithdrawalConfig,
}

impl std::fmt::Debug for WithdrawalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WithdrawalProcessor")
            .field("rail", &self.rail.name())
            .field("config", &self.config)
            .finish()
    }
}

impl WithdrawalProcessor {
    /// Create processor
    pub fn new(
        ledger: Arc<CashbackLedger>,
        rail: Arc<dyn PayoutRail>,
        config: WithdrawalConfig,
    ) -> Result<Self> {
        config.validate()?;
        let methods = PaymentMethods::new(ledger.store().clone(), config.auto_verify);
        Ok(Self {
            ledger,
            methods,
            rail,
            config,
        })
    }

    /// Payment method registry
    pub fn methods(&self) -> &PaymentMethods {
        &self.methods
    }

    /// Configuration
    pub fn config(&self) -> &WithdrawalConfig {
        &self.config
    }

    /// Validate and reserve a withdrawal.
    ///
    /// Checks run in order: positive amount; method exists, is owned and
    /// verified; minimum amount; spendable balance. No request is created on
    /// any failure.
    pub fn request(
        &self,
        user_id: &UserId,
        amount: Decimal,
        payment_method_id: Uuid,
    ) -> Result<WithdrawalRequest> {
        if amount <= Decimal::ZERO {
            return Err(ledger_core::Error::Validation(format!(
                "withdrawal amount must be positive, got {}",
                amount
            ))
            .into());
        }

        let method = self.methods.get_owned(user_id, payment_method_id)?;
        if !method.verified {
            return Err(
                ledger_core::Error::UnverifiedPaymentMethod(payment_method_id.to_string()).into(),
            );
        }

        if amount < self.config.minimum_amount {
            return Err(ledger_core::Error::BelowMinimumWithdrawal {
                amount,
                minimum: self.config.minimum_amount,
            }
            .into());
        }

        let Some(currency) = self.ledger.account_currency(user_id)? else {
            return Err(ledger_core::Error::InsufficientBalance {
                requested: amount,
                available: Decimal::ZERO,
            }
            .into());
        };
        if currency.round(amount) != amount {
            return Err(ledger_core::Error::Validation(format!(
                "amount {} has more than {} decimal places for {}",
                amount,
                currency.decimal_places(),
                currency
            ))
            .into());
        }

        let now = Utc::now();
        let request = WithdrawalRequest {
            id: Uuid::now_v7(),
            user_id: user_id.clone(),
            amount,
            currency,
            payment_method_id,
            status: WithdrawalStatus::Pending,
            external_reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
            processed_at: None,
        };

        Ok(self.ledger.reserve_withdrawal(request)?)
    }

    /// Hand a pending withdrawal to the rail.
    ///
    /// Non-pending requests are returned unchanged, so retries never execute
    /// twice. A rail timeout or transport error leaves the request
    /// `processing` for [`WithdrawalProcessor::reconcile`].
    pub async fn process(&self, withdrawal_id: Uuid) -> Result<WithdrawalRequest> {
        let Some(withdrawal) = self.ledger.begin_withdrawal(withdrawal_id)? else {
            let current = self.ledger.get_withdrawal(withdrawal_id)?;
            debug!(
                withdrawal_id = %withdrawal_id,
                status = %current.status,
                "Withdrawal not pending, skipping"
            );
            return Ok(current);
        };

        let method = match self
            .methods
            .get_owned(&withdrawal.user_id, withdrawal.payment_method_id)
        {
            Ok(method) => method,
            Err(ledger_core::Error::NotFound { .. }) => {
                // Nothing was sent; safe to release the funds
                return self.settle(
                    withdrawal_id,
                    Settlement::Failed {
                        reason: "payment method no longer available".to_string(),
                    },
                );
            }
            Err(e) => return Err(e.into()),
        };

        let timeout = self.config.rail_timeout();
        match tokio::time::timeout(timeout, self.rail.execute(&withdrawal, &method)).await {
            Ok(Ok(outcome)) => self.settle(withdrawal_id, settlement_for(outcome)),
            Ok(Err(e)) => {
                error!(
                    withdrawal_id = %withdrawal_id,
                    rail = self.rail.name(),
                    error = %e,
                    "Payout rail error, withdrawal left processing"
                );
                Ok(withdrawal)
            }
            Err(_) => {
                warn!(
                    withdrawal_id = %withdrawal_id,
                    rail = self.rail.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Payout rail timed out, withdrawal left processing"
                );
                Ok(withdrawal)
            }
        }
    }

    /// Process every pending withdrawal; returns how many reached a terminal state
    pub async fn process_pending(&self) -> Result<usize> {
        let pending = self
            .ledger
            .store()
            .list_withdrawals(None, Some(WithdrawalStatus::Pending))?;

        let mut settled = 0;
        for withdrawal in pending {
            match self.process(withdrawal.id).await {
                Ok(w) if w.status.is_terminal() => settled += 1,
                Ok(_) => {}
                Err(e) => error!(withdrawal_id = %withdrawal.id, error = %e, "Processing failed"),
            }
        }
        Ok(settled)
    }

    /// Resolve `processing` withdrawals older than `stale_after` by asking the rail.
    ///
    /// A withdrawal the rail has no record of never executed and is failed
    /// with its reservation restored. Lookup errors leave it untouched, as
    /// does anything started within [`WithdrawalConfig::in_flight_window`]
    /// whatever `stale_after` says.
    pub async fn reconcile(&self, stale_after: Duration) -> Result<ReconcileReport> {
        let now = Utc::now();
        let age = |d: Duration| {
            chrono::Duration::from_std(d)
                .map_err(|e| Error::Config(format!("invalid reconciliation age: {}", e)))
        };
        let cutoff = now - age(stale_after)?;
        let in_flight_since = now - age(self.config.in_flight_window())?;

        let stale: Vec<WithdrawalRequest> = self
            .ledger
            .store()
            .list_withdrawals(None, Some(WithdrawalStatus::Processing))?
            .into_iter()
            .filter(|w| w.processing_started_at.unwrap_or(w.updated_at) <= cutoff)
            .collect();

        let mut report = ReconcileReport {
            examined: stale.len(),
            ..ReconcileReport::default()
        };

        for withdrawal in stale {
            let started = withdrawal.processing_started_at.unwrap_or(withdrawal.updated_at);
            if started > in_flight_since {
                debug!(withdrawal_id = %withdrawal.id, "Rail call may still be in flight");
                report.unresolved += 1;
                continue;
            }

            let lookup =
                tokio::time::timeout(self.config.rail_timeout(), self.rail.lookup(withdrawal.id))
                    .await;

            let settlement = match lookup {
                Ok(Ok(Some(outcome))) => settlement_for(outcome),
                Ok(Ok(None)) => Settlement::Failed {
                    reason: "not executed by payout rail".to_string(),
                },
                Ok(Err(e)) => {
                    warn!(withdrawal_id = %withdrawal.id, error = %e, "Rail lookup failed");
                    report.unresolved += 1;
                    continue;
                }
                Err(_) => {
                    warn!(withdrawal_id = %withdrawal.id, "Rail lookup timed out");
                    report.unresolved += 1;
                    continue;
                }
            };

            match self.settle(withdrawal.id, settlement)?.status {
                WithdrawalStatus::Completed => report.completed += 1,
                WithdrawalStatus::Failed => report.failed += 1,
                _ => report.unresolved += 1,
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                completed = report.completed,
                failed = report.failed,
                unresolved = report.unresolved,
                "Withdrawal reconciliation finished"
            );
        }
        Ok(report)
    }

    /// A user's withdrawals, oldest first
    pub fn list(&self, user_id: &UserId) -> Result<Vec<WithdrawalRequest>> {
        let mut withdrawals = self.ledger.store().list_withdrawals(Some(user_id), None)?;
        withdrawals.sort_by_key(|w| w.created_at);
        Ok(withdrawals)
    }

    fn settle(&self, withdrawal_id: Uuid, settlement: Settlement) -> Result<WithdrawalRequest> {
        Ok(self
            .ledger
            .settle_withdrawal(withdrawal_id, settlement)?
            .into_inner())
    }
}

fn settlement_for(outcome: RailOutcome) -> Settlement {
    match outcome {
        RailOutcome::Paid { reference } => Settlement::Completed { reference },
        RailOutcome::Rejected { reason } => Settlement::Failed { reason },
    }
}
