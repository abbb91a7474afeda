//! Persistence interface for the ledger
//!
//! Every balance mutation goes through [`LedgerStore::apply`]: a unit of work
//! scoped to one account, executed under per-account serialization and
//! committed as a single write. A new transaction row staged with
//! [`UnitOfWork::insert_transaction`] is checked against the unique
//! transaction-id key at commit; if it already exists the whole unit is
//! discarded and [`Error::DuplicateTransaction`] carries the existing row.

use crate::{
    types::{
        CashbackAccount, CashbackTransaction, CommissionRecord, ConversionEvent, Currency,
        PaymentMethod, UserId, WithdrawalRequest, WithdrawalStatus,
    },
    Error, Result,
};
use uuid::Uuid;

/// Staged writes for one account-scoped atomic operation
#[derive(Debug)]
pub struct UnitOfWork {
    account: CashbackAccount,
    new_transaction: Option<CashbackTransaction>,
    transactions: Vec<CashbackTransaction>,
    conversions: Vec<ConversionEvent>,
    withdrawals: Vec<WithdrawalRequest>,
}

impl UnitOfWork {
    /// Start a unit of work over the current account snapshot
    pub fn new(account: CashbackAccount) -> Self {
        Self {
            account,
            new_transaction: None,
            transactions: Vec::new(),
            conversions: Vec::new(),
            withdrawals: Vec::new(),
        }
    }

    /// Account snapshot
    pub fn account(&self) -> &CashbackAccount {
        &self.account
    }

    /// Mutable account snapshot
    pub fn account_mut(&mut self) -> &mut CashbackAccount {
        &mut self.account
    }

    /// Stage a brand-new transaction row (insert-if-absent at commit)
    pub fn insert_transaction(&mut self, transaction: CashbackTransaction) {
        self.new_transaction = Some(transaction);
    }

    /// Stage an update of an existing transaction row
    pub fn put_transaction(&mut self, transaction: CashbackTransaction) {
        self.transactions.push(transaction);
    }

    /// Stage a conversion record write
    pub fn put_conversion(&mut self, conversion: ConversionEvent) {
        self.conversions.push(conversion);
    }

    /// Stage a withdrawal write
    pub fn put_withdrawal(&mut self, withdrawal: WithdrawalRequest) {
        self.withdrawals.push(withdrawal);
    }

    /// Split into the parts a backend commits
    pub fn into_parts(self) -> StagedWrites {
        StagedWrites {
            account: self.account,
            new_transaction: self.new_transaction,
            transactions: self.transactions,
            conversions: self.conversions,
            withdrawals: self.withdrawals,
        }
    }
}

/// Writes produced by a finished [`UnitOfWork`]
#[derive(Debug)]
pub struct StagedWrites {
    /// Final account state
    pub account: CashbackAccount,
    /// New transaction row subject to the uniqueness check
    pub new_transaction: Option<CashbackTransaction>,
    /// Updated transaction rows
    pub transactions: Vec<CashbackTransaction>,
    /// Conversion rows
    pub conversions: Vec<ConversionEvent>,
    /// Withdrawal rows
    pub withdrawals: Vec<WithdrawalRequest>,
}

/// Outcome of an idempotent upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// Row written
    Written,
    /// Identical row already present; nothing written
    Unchanged,
}

/// Durable ledger state: accounts, transactions, payment methods,
/// withdrawals and the platform commission ledger.
pub trait LedgerStore: Send + Sync {
    /// Get an account
    fn get_account(&self, user_id: &UserId) -> Result<Option<CashbackAccount>>;

    /// All accounts
    fn list_accounts(&self) -> Result<Vec<CashbackAccount>>;

    /// Get a transaction by partner transaction id
    fn get_transaction(&self, transaction_id: &str) -> Result<Option<CashbackTransaction>>;

    /// Transactions, optionally restricted to one user
    fn list_transactions(&self, user_id: Option<&UserId>) -> Result<Vec<CashbackTransaction>>;

    /// Get the conversion behind a transaction
    fn get_conversion(&self, transaction_id: &str) -> Result<Option<ConversionEvent>>;

    /// Insert or replace a payment method
    fn put_payment_method(&self, method: &PaymentMethod) -> Result<()>;

    /// Get a payment method
    fn get_payment_method(&self, id: Uuid) -> Result<Option<PaymentMethod>>;

    /// A user's payment methods
    fn list_payment_methods(&self, user_id: &UserId) -> Result<Vec<PaymentMethod>>;

    /// Get a withdrawal
    fn get_withdrawal(&self, id: Uuid) -> Result<Option<WithdrawalRequest>>;

    /// Withdrawals filtered by user and/or status
    fn list_withdrawals(
        &self,
        user_id: Option<&UserId>,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<WithdrawalRequest>>;

    /// Record a commission entry; identical redelivery is [`Upsert::Unchanged`]
    fn upsert_commission(&self, record: &CommissionRecord) -> Result<Upsert>;

    /// Get the commission entry for a transaction
    fn get_commission(&self, transaction_id: &str) -> Result<Option<CommissionRecord>>;

    /// All commission entries
    fn list_commissions(&self) -> Result<Vec<CommissionRecord>>;

    /// Run `work` atomically against the account of `user_id`.
    ///
    /// The account is created (empty, in `currency`) if absent. Nothing is
    /// written unless `work` succeeds, the resulting account passes
    /// [`CashbackAccount::check_invariants`] and any staged new transaction
    /// id is unused. Returns the committed account.
    fn apply(
        &self,
        user_id: &UserId,
        currency: Currency,
        work: &mut dyn FnMut(&mut UnitOfWork) -> Result<()>,
    ) -> Result<CashbackAccount>;
}

/// Typed wrapper over [`LedgerStore::apply`] returning the closure's value
/// together with the committed account.
pub fn atomically<T, F>(
    store: &dyn LedgerStore,
    user_id: &UserId,
    currency: Currency,
    work: F,
) -> Result<(T, CashbackAccount)>
where
    F: FnOnce(&mut UnitOfWork) -> Result<T>,
{
    let mut work = Some(work);
    let mut output = None;

    let account = store.apply(user_id, currency, &mut |uow| {
        let work = work
            .take()
            .ok_or_else(|| Error::InvariantViolation("unit of work re-entered".to_string()))?;
        output = Some(work(uow)?);
        Ok(())
    })?;

    let output = output
        .ok_or_else(|| Error::InvariantViolation("unit of work produced no result".to_string()))?;
    Ok((output, account))
}
