//! Cashback ledger state machine
//!
//! Owns every balance mutation. Each operation runs as one
//! [`LedgerStore::apply`] unit scoped to the affected account, re-reads the
//! row it transitions inside that unit, and emits notifications only after
//! the commit.
//!
//! Transaction lifecycle:
//!
//! ```text
//! pending ──confirm──▶ confirmed
//!    │                    │
//!    └──cancel──▶ cancelled ◀──cancel (compensating debit)
//! ```

use crate::{
    notify::{LedgerNotification, Notifier},
    store::{atomically, LedgerStore, Upsert},
    types::{
        CashbackAccount, CashbackTransaction, CommissionRecord, ConversionEvent, Currency,
        Metadata, TransactionStatus, UserId, WithdrawalRequest, WithdrawalStatus,
    },
    Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Result of opening a pending transaction
#[derive(Debug, Clone, PartialEq)]
pub enum Opened {
    /// A new pending transaction was written
    Created(CashbackTransaction),
    /// The transaction id was already known; the stored row is returned unchanged
    Existing(CashbackTransaction),
}

impl Opened {
    /// The transaction, whichever way it was obtained
    pub fn transaction(&self) -> &CashbackTransaction {
        match self {
            Opened::Created(tx) | Opened::Existing(tx) => tx,
        }
    }

    /// Consume into the transaction
    pub fn into_transaction(self) -> CashbackTransaction {
        match self {
            Opened::Created(tx) | Opened::Existing(tx) => tx,
        }
    }
}

/// Result of a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<T = CashbackTransaction> {
    /// The transition was applied now
    Applied(T),
    /// The entity was already in the target state; nothing changed
    AlreadyApplied(T),
}

impl<T> Transition<T> {
    /// Whether this call changed state
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    /// Consume into the entity
    pub fn into_inner(self) -> T {
        match self {
            Transition::Applied(v) | Transition::AlreadyApplied(v) => v,
        }
    }
}

/// Requested status change for a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    /// Partner transaction id
    pub transaction_id: String,
    /// Target status
    pub status: TransactionStatus,
    /// Reason (refund, chargeback, fraud, ...)
    pub reason: Option<String>,
    /// Metadata merged into the transaction
    pub metadata: Metadata,
}

/// Outcome reported by the payout rail for a processing withdrawal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Money moved
    Completed {
        /// Rail reference
        reference: String,
    },
    /// Money did not move
    Failed {
        /// Failure reason
        reason: String,
    },
}

/// Cashback ledger over an injected [`LedgerStore`]
pub struct CashbackLedger {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for CashbackLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CashbackLedger").finish_non_exhaustive()
    }
}

impl CashbackLedger {
    /// Create ledger
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Underlying store (read paths and repositories)
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Emit a notification that is not tied to a ledger transition
    pub fn notify(&self, notification: LedgerNotification) {
        self.notifier.notify(notification);
    }

    /// Open a pending cashback transaction for a validated conversion.
    ///
    /// Insert-if-absent on the transaction id: a redelivered conversion gets
    /// [`Opened::Existing`] and no balance effect.
    pub fn open_pending(&self, conversion: ConversionEvent, metadata: Metadata) -> Result<Opened> {
        let transaction = CashbackTransaction::pending(&conversion, metadata);
        let user_id = conversion.user_id.clone();
        let amount = transaction.amount;

        let result = atomically(self.store.as_ref(), &user_id, conversion.currency, |uow| {
            let account = uow.account();
            if !account.active {
                return Err(Error::StateConflict(format!(
                    "account {} is inactive and cannot receive new credits",
                    user_id
                )));
            }
            if account.currency != conversion.currency {
                return Err(Error::Validation(format!(
                    "conversion currency {} does not match account currency {}",
                    conversion.currency, account.currency
                )));
            }

            uow.account_mut().pending_balance += amount;
            uow.insert_transaction(transaction.clone());
            uow.put_conversion(conversion);
            Ok(())
        });

        match result {
            Ok(((), _)) => {
                tracing::info!(
                    transaction_id = %transaction.transaction_id,
                    user_id = %user_id,
                    amount = %amount,
                    "Opened pending cashback transaction"
                );
                Ok(Opened::Created(transaction))
            }
            Err(Error::DuplicateTransaction(existing)) => {
                tracing::debug!(
                    transaction_id = %existing.transaction_id,
                    "Transaction already exists, returning stored row"
                );
                Ok(Opened::Existing(*existing))
            }
            Err(err) => Err(err),
        }
    }

    /// Move a transaction to the requested status
    pub fn transition(&self, update: StatusUpdate) -> Result<Transition> {
        match update.status {
            TransactionStatus::Confirmed => {
                self.confirm(&update.transaction_id, update.reason, update.metadata)
            }
            TransactionStatus::Cancelled => {
                self.cancel(&update.transaction_id, update.reason, update.metadata)
            }
            TransactionStatus::Pending => {
                let current = self.get_transaction(&update.transaction_id)?;
                if current.status == TransactionStatus::Pending {
                    Ok(Transition::AlreadyApplied(current))
                } else {
                    Err(Error::StateConflict(format!(
                        "transaction {} is {} and cannot return to pending",
                        current.transaction_id, current.status
                    )))
                }
            }
        }
    }

    /// Confirm a pending transaction, moving its amount into the spendable balance.
    ///
    /// Outstanding clawback is recovered from the credit first.
    pub fn confirm(
        &self,
        transaction_id: &str,
        reason: Option<String>,
        metadata: Metadata,
    ) -> Result<Transition> {
        let snapshot = self.get_transaction(transaction_id)?;
        let store = self.store.as_ref();

        let (transition, account) =
            atomically(store, &snapshot.user_id, snapshot.currency, |uow| {
                let mut tx = current_transaction(store, transaction_id)?;
                match tx.status {
                    TransactionStatus::Confirmed => return Ok(Transition::AlreadyApplied(tx)),
                    status if !status.can_transition_to(TransactionStatus::Confirmed) => {
                        return Err(Error::StateConflict(format!(
                            "transaction {} is {} and cannot be confirmed",
                            transaction_id, status
                        )))
                    }
                    _ => {}
                }

                let account = uow.account_mut();
                let recovered = account.clawback_outstanding.min(tx.amount);
                account.pending_balance -= tx.amount;
                account.total_earned += tx.amount;
                account.clawback_outstanding -= recovered;
                account.balance += tx.amount - recovered;
                if !recovered.is_zero() {
                    tx.metadata
                        .insert("clawback_recovered".to_string(), recovered.to_string());
                }

                let now = Utc::now();
                tx.status = TransactionStatus::Confirmed;
                tx.confirmed_at = Some(now);
                tx.updated_at = now;
                tx.status_reason = reason;
                tx.metadata.extend(metadata);

                mirror_conversion_status(store, uow, transaction_id, TransactionStatus::Confirmed)?;
                uow.put_transaction(tx.clone());
                Ok(Transition::Applied(tx))
            })?;

        if let Transition::Applied(tx) = &transition {
            tracing::info!(
                transaction_id = %tx.transaction_id,
                user_id = %tx.user_id,
                amount = %tx.amount,
                balance = %account.balance,
                "Confirmed cashback transaction"
            );
            self.notifier.notify(LedgerNotification::CashbackEarned {
                user_id: tx.user_id.clone(),
                transaction_id: tx.transaction_id.clone(),
                amount: tx.amount,
                currency: tx.currency,
                balance: account.balance,
            });
        }

        Ok(transition)
    }

    /// Cancel a pending or confirmed transaction.
    ///
    /// Cancelling a confirmed transaction debits the same amount. Whatever the
    /// spendable balance cannot cover is recorded as outstanding clawback.
    pub fn cancel(
        &self,
        transaction_id: &str,
        reason: Option<String>,
        metadata: Metadata,
    ) -> Result<Transition> {
        let snapshot = self.get_transaction(transaction_id)?;
        let store = self.store.as_ref();

        let ((transition, was_confirmed), _) =
            atomically(store, &snapshot.user_id, snapshot.currency, |uow| {
                let mut tx = current_transaction(store, transaction_id)?;
                let was_confirmed = match tx.status {
                    TransactionStatus::Cancelled => {
                        return Ok((Transition::AlreadyApplied(tx), false))
                    }
                    status if !status.can_transition_to(TransactionStatus::Cancelled) => {
                        return Err(Error::StateConflict(format!(
                            "transaction {} is {} and cannot be cancelled",
                            transaction_id, status
                        )))
                    }
                    TransactionStatus::Pending => {
                        uow.account_mut().pending_balance -= tx.amount;
                        false
                    }
                    TransactionStatus::Confirmed => {
                        let account = uow.account_mut();
                        let debit = account.balance.min(tx.amount);
                        let shortfall = tx.amount - debit;
                        account.total_earned -= tx.amount;
                        account.balance -= debit;
                        account.clawback_outstanding += shortfall;
                        if !shortfall.is_zero() {
                            tx.metadata
                                .insert("clawback_shortfall".to_string(), shortfall.to_string());
                        }
                        true
                    }
                };

                let now = Utc::now();
                tx.status = TransactionStatus::Cancelled;
                tx.cancelled_at = Some(now);
                tx.updated_at = now;
                tx.status_reason = reason.clone();
                tx.metadata.extend(metadata);

                mirror_conversion_status(store, uow, transaction_id, TransactionStatus::Cancelled)?;
                uow.put_transaction(tx.clone());
                Ok((Transition::Applied(tx), was_confirmed))
            })?;

        if let Transition::Applied(tx) = &transition {
            tracing::info!(
                transaction_id = %tx.transaction_id,
                user_id = %tx.user_id,
                amount = %tx.amount,
                was_confirmed,
                reason = ?tx.status_reason,
                "Cancelled cashback transaction"
            );
            if was_confirmed {
                self.notifier.notify(LedgerNotification::CashbackReversed {
                    user_id: tx.user_id.clone(),
                    transaction_id: tx.transaction_id.clone(),
                    amount: tx.amount,
                    currency: tx.currency,
                    reason: tx.status_reason.clone(),
                });
            }
        }

        Ok(transition)
    }

    /// Record the platform commission for a known transaction.
    ///
    /// Identical redelivery is [`Upsert::Unchanged`].
    pub fn record_commission(
        &self,
        transaction_id: &str,
        amount: Decimal,
        status: &str,
        reason: Option<String>,
    ) -> Result<Upsert> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(Error::Validation(format!(
                "commission amount must not be negative: {}",
                amount
            )));
        }
        let tx = self.get_transaction(transaction_id)?;

        let record = CommissionRecord {
            transaction_id: tx.transaction_id.clone(),
            amount: tx.currency.round(amount),
            currency: tx.currency,
            status: status.trim().to_ascii_lowercase(),
            reason,
            recorded_at: Utc::now(),
        };
        let outcome = self.store.upsert_commission(&record)?;

        if outcome == Upsert::Written {
            tracing::info!(
                transaction_id = %record.transaction_id,
                amount = %record.amount,
                status = %record.status,
                "Recorded platform commission"
            );
        }
        Ok(outcome)
    }

    /// Enable or disable new credits for an existing account
    pub fn set_account_active(&self, user_id: &UserId, active: bool) -> Result<CashbackAccount> {
        let existing = self.get_account(user_id)?;
        let ((), account) = atomically(self.store.as_ref(), user_id, existing.currency, |uow| {
            uow.account_mut().active = active;
            Ok(())
        })?;
        tracing::info!(user_id = %user_id, active, "Updated account status");
        Ok(account)
    }

    /// Reserve funds for a new withdrawal and persist it as `pending`
    pub fn reserve_withdrawal(&self, request: WithdrawalRequest) -> Result<WithdrawalRequest> {
        let user_id = request.user_id.clone();
        let ((), account) = atomically(self.store.as_ref(), &user_id, request.currency, |uow| {
            let account = uow.account_mut();
            if account.currency != request.currency {
                return Err(Error::Validation(format!(
                    "withdrawal currency {} does not match account currency {}",
                    request.currency, account.currency
                )));
            }
            if request.amount > account.balance {
                return Err(Error::InsufficientBalance {
                    requested: request.amount,
                    available: account.balance,
                });
            }
            account.balance -= request.amount;
            account.reserved_balance += request.amount;
            uow.put_withdrawal(request.clone());
            Ok(())
        })?;

        tracing::info!(
            withdrawal_id = %request.id,
            user_id = %user_id,
            amount = %request.amount,
            balance = %account.balance,
            "Reserved withdrawal"
        );
        Ok(request)
    }

    /// Move a `pending` withdrawal to `processing`.
    ///
    /// Returns `None` when the withdrawal is in any other state, so a retried
    /// call never hands the same request to the rail twice.
    pub fn begin_withdrawal(&self, withdrawal_id: Uuid) -> Result<Option<WithdrawalRequest>> {
        let snapshot = self.get_withdrawal(withdrawal_id)?;
        let store = self.store.as_ref();

        let (started, _) = atomically(store, &snapshot.user_id, snapshot.currency, |uow| {
            let mut withdrawal = current_withdrawal(store, withdrawal_id)?;
            if withdrawal.status != WithdrawalStatus::Pending {
                return Ok(None);
            }
            let now = Utc::now();
            withdrawal.status = WithdrawalStatus::Processing;
            withdrawal.processing_started_at = Some(now);
            withdrawal.updated_at = now;
            uow.put_withdrawal(withdrawal.clone());
            Ok(Some(withdrawal))
        })?;

        if let Some(withdrawal) = &started {
            tracing::info!(withdrawal_id = %withdrawal.id, "Withdrawal processing started");
        }
        Ok(started)
    }

    /// Settle a `processing` withdrawal.
    ///
    /// `Completed` moves the reservation into `total_withdrawn`; `Failed`
    /// restores it to the spendable balance.
    pub fn settle_withdrawal(
        &self,
        withdrawal_id: Uuid,
        settlement: Settlement,
    ) -> Result<Transition<WithdrawalRequest>> {
        let snapshot = self.get_withdrawal(withdrawal_id)?;
        let store = self.store.as_ref();

        let (transition, _) = atomically(store, &snapshot.user_id, snapshot.currency, |uow| {
            let mut withdrawal = current_withdrawal(store, withdrawal_id)?;
            match withdrawal.status {
                WithdrawalStatus::Processing => {}
                status if status.is_terminal() => {
                    return Ok(Transition::AlreadyApplied(withdrawal))
                }
                status => {
                    return Err(Error::StateConflict(format!(
                        "withdrawal {} is {} and cannot be settled",
                        withdrawal_id, status
                    )))
                }
            }

            let account = uow.account_mut();
            account.reserved_balance -= withdrawal.amount;
            match &settlement {
                Settlement::Completed { reference } => {
                    account.total_withdrawn += withdrawal.amount;
                    withdrawal.status = WithdrawalStatus::Completed;
                    withdrawal.external_reference = Some(reference.clone());
                }
                Settlement::Failed { reason } => {
                    account.balance += withdrawal.amount;
                    withdrawal.status = WithdrawalStatus::Failed;
                    withdrawal.failure_reason = Some(reason.clone());
                }
            }
            let now = Utc::now();
            withdrawal.processed_at = Some(now);
            withdrawal.updated_at = now;
            uow.put_withdrawal(withdrawal.clone());
            Ok(Transition::Applied(withdrawal))
        })?;

        if let Transition::Applied(withdrawal) = &transition {
            match withdrawal.status {
                WithdrawalStatus::Completed => tracing::info!(
                    withdrawal_id = %withdrawal.id,
                    reference = ?withdrawal.external_reference,
                    "Withdrawal completed"
                ),
                _ => tracing::warn!(
                    withdrawal_id = %withdrawal.id,
                    reason = ?withdrawal.failure_reason,
                    "Withdrawal failed, reservation restored"
                ),
            }
            self.notifier.notify(LedgerNotification::WithdrawalProcessed {
                user_id: withdrawal.user_id.clone(),
                withdrawal_id: withdrawal.id,
                amount: withdrawal.amount,
                currency: withdrawal.currency,
                status: withdrawal.status,
            });
        }
        Ok(transition)
    }

    /// Get transaction by partner id
    pub fn get_transaction(&self, transaction_id: &str) -> Result<CashbackTransaction> {
        self.store
            .get_transaction(transaction_id)?
            .ok_or_else(|| Error::not_found("transaction", transaction_id))
    }

    /// Get transaction by partner id, if present
    pub fn find_transaction(&self, transaction_id: &str) -> Result<Option<CashbackTransaction>> {
        self.store.get_transaction(transaction_id)
    }

    /// Get account
    pub fn get_account(&self, user_id: &UserId) -> Result<CashbackAccount> {
        self.store
            .get_account(user_id)?
            .ok_or_else(|| Error::not_found("account", user_id))
    }

    /// Get withdrawal
    pub fn get_withdrawal(&self, withdrawal_id: Uuid) -> Result<WithdrawalRequest> {
        self.store
            .get_withdrawal(withdrawal_id)?
            .ok_or_else(|| Error::not_found("withdrawal", withdrawal_id))
    }

    /// Verify every account against its transaction and withdrawal history.
    ///
    /// Checks the per-account conservation equation, that `pending_balance`
    /// equals the sum of pending transactions, and that `reserved_balance`
    /// equals the sum of open withdrawals.
    pub fn audit(&self) -> Result<()> {
        let mut pending: HashMap<UserId, Decimal> = HashMap::new();
        for tx in self.store.list_transactions(None)? {
            if tx.status == TransactionStatus::Pending {
                *pending.entry(tx.user_id.clone()).or_default() += tx.amount;
            }
        }

        let mut reserved: HashMap<UserId, Decimal> = HashMap::new();
        for w in self.store.list_withdrawals(None, None)? {
            if !w.status.is_terminal() {
                *reserved.entry(w.user_id.clone()).or_default() += w.amount;
            }
        }

        for account in self.store.list_accounts()? {
            account.check_invariants()?;

            let expected_pending = pending.get(&account.user_id).copied().unwrap_or_default();
            if account.pending_balance != expected_pending {
                return Err(Error::InvariantViolation(format!(
                    "account {} pending_balance {} != pending transactions {}",
                    account.user_id, account.pending_balance, expected_pending
                )));
            }

            let expected_reserved = reserved.get(&account.user_id).copied().unwrap_or_default();
            if account.reserved_balance != expected_reserved {
                return Err(Error::InvariantViolation(format!(
                    "account {} reserved_balance {} != open withdrawals {}",
                    account.user_id, account.reserved_balance, expected_reserved
                )));
            }
        }
        Ok(())
    }

    /// Currency of an existing account, if any
    pub fn account_currency(&self, user_id: &UserId) -> Result<Option<Currency>> {
        Ok(self.store.get_account(user_id)?.map(|a| a.currency))
    }
}

fn current_transaction(store: &dyn LedgerStore, transaction_id: &str) -> Result<CashbackTransaction> {
    store
        .get_transaction(transaction_id)?
        .ok_or_else(|| Error::not_found("transaction", transaction_id))
}

fn current_withdrawal(store: &dyn LedgerStore, withdrawal_id: Uuid) -> Result<WithdrawalRequest> {
    store
        .get_withdrawal(withdrawal_id)?
        .ok_or_else(|| Error::not_found("withdrawal", withdrawal_id))
}

fn mirror_conversion_status(
    store: &dyn LedgerStore,
    uow: &mut crate::store::UnitOfWork,
    transaction_id: &str,
    status: TransactionStatus,
) -> Result<()> {
    if let Some(mut conversion) = store.get_conversion(transaction_id)? {
        conversion.status = status;
        uow.put_conversion(conversion);
    }
    Ok(())
}
