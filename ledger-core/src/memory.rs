//! In-memory ledger store
//!
//! Concurrent maps (`dashmap`) hold the rows; each account has its own
//! `parking_lot` mutex so read-modify-write on one account is serialized
//! while different accounts proceed in parallel. Transaction-id uniqueness
//! is enforced with the map's entry API, which is atomic per key.

use crate::{
    store::{LedgerStore, UnitOfWork, Upsert},
    types::{
        CashbackAccount, CashbackTransaction, CommissionRecord, ConversionEvent, Currency,
        PaymentMethod, UserId, WithdrawalRequest, WithdrawalStatus,
    },
    Error, Result,
};
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Process-local [`LedgerStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: DashMap<UserId, CashbackAccount>,
    account_locks: DashMap<UserId, Arc<Mutex<()>>>,
    transactions: DashMap<String, CashbackTransaction>,
    conversions: DashMap<String, ConversionEvent>,
    payment_methods: DashMap<Uuid, PaymentMethod>,
    withdrawals: DashMap<Uuid, WithdrawalRequest>,
    commissions: DashMap<String, CommissionRecord>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn account_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        // Clone the Arc out so the shard guard is released before locking.
        self.account_locks
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }
}

impl LedgerStore for MemoryStore {
    fn get_account(&self, user_id: &UserId) -> Result<Option<CashbackAccount>> {
        Ok(self.accounts.get(user_id).map(|a| a.value().clone()))
    }

    fn list_accounts(&self) -> Result<Vec<CashbackAccount>> {
        Ok(self.accounts.iter().map(|a| a.value().clone()).collect())
    }

    fn get_transaction(&self, transaction_id: &str) -> Result<Option<CashbackTransaction>> {
        Ok(self.transactions.get(transaction_id).map(|t| t.value().clone()))
    }

    fn list_transactions(&self, user_id: Option<&UserId>) -> Result<Vec<CashbackTransaction>> {
        let mut rows: Vec<CashbackTransaction> = self
            .transactions
            .iter()
            .filter(|t| user_id.map_or(true, |u| &t.user_id == u))
            .map(|t| t.value().clone())
            .collect();
        rows.sort_by_key(|t| t.created_at);
        Ok(rows)
    }

    fn get_conversion(&self, transaction_id: &str) -> Result<Option<ConversionEvent>> {
        Ok(self.conversions.get(transaction_id).map(|c| c.value().clone()))
    }

    fn put_payment_method(&self, method: &PaymentMethod) -> Result<()> {
        self.payment_methods.insert(method.id, method.clone());
        Ok(())
    }

    fn get_payment_method(&self, id: Uuid) -> Result<Option<PaymentMethod>> {
        Ok(self.payment_methods.get(&id).map(|m| m.value().clone()))
    }

    fn list_payment_methods(&self, user_id: &UserId) -> Result<Vec<PaymentMethod>> {
        let mut rows: Vec<PaymentMethod> = self
            .payment_methods
            .iter()
            .filter(|m| &m.user_id == user_id)
            .map(|m| m.value().clone())
            .collect();
        rows.sort_by_key(|m| m.created_at);
        Ok(rows)
    }

    fn get_withdrawal(&self, id: Uuid) -> Result<Option<WithdrawalRequest>> {
        Ok(self.withdrawals.get(&id).map(|w| w.value().clone()))
    }

    fn list_withdrawals(
        &self,
        user_id: Option<&UserId>,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<WithdrawalRequest>> {
        let mut rows: Vec<WithdrawalRequest> = self
            .withdrawals
            .iter()
            .filter(|w| user_id.map_or(true, |u| &w.user_id == u))
            .filter(|w| status.map_or(true, |s| w.status == s))
            .map(|w| w.value().clone())
            .collect();
        rows.sort_by_key(|w| w.created_at);
        Ok(rows)
    }

    fn upsert_commission(&self, record: &CommissionRecord) -> Result<Upsert> {
        match self.commissions.entry(record.transaction_id.clone()) {
            Entry::Occupied(existing) if existing.get().same_terms(record) => Ok(Upsert::Unchanged),
            Entry::Occupied(mut existing) => {
                existing.insert(record.clone());
                Ok(Upsert::Written)
            }
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(Upsert::Written)
            }
        }
    }

    fn get_commission(&self, transaction_id: &str) -> Result<Option<CommissionRecord>> {
        Ok(self.commissions.get(transaction_id).map(|c| c.value().clone()))
    }

    fn list_commissions(&self) -> Result<Vec<CommissionRecord>> {
        Ok(self.commissions.iter().map(|c| c.value().clone()).collect())
    }

    fn apply(
        &self,
        user_id: &UserId,
        currency: Currency,
        work: &mut dyn FnMut(&mut UnitOfWork) -> Result<()>,
    ) -> Result<CashbackAccount> {
        let lock = self.account_lock(user_id);
        let _guard = lock.lock();

        let account = self
            .get_account(user_id)?
            .unwrap_or_else(|| CashbackAccount::new(user_id.clone(), currency));

        let mut uow = UnitOfWork::new(account);
        work(&mut uow)?;
        uow.account().check_invariants()?;

        let mut staged = uow.into_parts();

        if let Some(transaction) = staged.new_transaction.take() {
            match self.transactions.entry(transaction.transaction_id.clone()) {
                Entry::Occupied(existing) => {
                    return Err(Error::DuplicateTransaction(Box::new(existing.get().clone())));
                }
                Entry::Vacant(slot) => {
                    slot.insert(transaction);
                }
            }
        }

        for transaction in staged.transactions {
            self.transactions.insert(transaction.transaction_id.clone(), transaction);
        }
        for conversion in staged.conversions {
            self.conversions.insert(conversion.transaction_id.clone(), conversion);
        }
        for withdrawal in staged.withdrawals {
            self.withdrawals.insert(withdrawal.id, withdrawal);
        }

        let mut account = staged.account;
        account.updated_at = chrono::Utc::now();
        self.accounts.insert(user_id.clone(), account.clone());

        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::atomically;
    use crate::types::TransactionStatus;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn pending_tx(user: &str, id: &str, amount: i64) -> CashbackTransaction {
        let now = Utc::now();
        CashbackTransaction {
            id: Uuid::now_v7(),
            user_id: UserId::new(user),
            transaction_id: id.to_string(),
            amount: Decimal::from(amount),
            order_amount: Decimal::from(amount * 10),
            currency: Currency::INR,
            status: TransactionStatus::Pending,
            metadata: BTreeMap::new(),
            status_reason: None,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            cancelled_at: None,
        }
    }

    #[test]
    fn test_insert_if_absent_rejects_duplicate() {
        let store = MemoryStore::new();
        let user = UserId::new("u1");

        atomically(&store, &user, Currency::INR, |uow| {
            uow.insert_transaction(pending_tx("u1", "T1", 10));
            uow.account_mut().pending_balance += Decimal::from(10);
            Ok(())
        })
        .unwrap();

        let second = atomically(&store, &user, Currency::INR, |uow| {
            uow.insert_transaction(pending_tx("u1", "T1", 10));
            uow.account_mut().pending_balance += Decimal::from(10);
            Ok(())
        });

        assert!(matches!(second, Err(Error::DuplicateTransaction(_))));
        let account = store.get_account(&user).unwrap().unwrap();
        assert_eq!(account.pending_balance, Decimal::from(10));
    }

    #[test]
    fn test_failed_work_writes_nothing() {
        let store = MemoryStore::new();
        let user = UserId::new("u2");

        let result: Result<((), CashbackAccount)> = atomically(&store, &user, Currency::INR, |uow| {
            uow.insert_transaction(pending_tx("u2", "T2", 5));
            Err(Error::Validation("nope".to_string()))
        });

        assert!(result.is_err());
        assert!(store.get_account(&user).unwrap().is_none());
        assert!(store.get_transaction("T2").unwrap().is_none());
    }

    #[test]
    fn test_invariant_violation_aborts_commit() {
        let store = MemoryStore::new();
        let user = UserId::new("u3");

        let result = atomically(&store, &user, Currency::INR, |uow| {
            uow.account_mut().balance += Decimal::from(1);
            Ok(())
        });

        assert!(matches!(result, Err(Error::InvariantViolation(_))));
        assert!(store.get_account(&user).unwrap().is_none());
    }

    #[test]
    fn test_commission_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let record = CommissionRecord {
            transaction_id: "T9".to_string(),
            amount: Decimal::from(135),
            currency: Currency::INR,
            status: "approved".to_string(),
            reason: None,
            recorded_at: Utc::now(),
        };

        assert_eq!(store.upsert_commission(&record).unwrap(), Upsert::Written);
        let mut redelivered = record.clone();
        redelivered.recorded_at = Utc::now();
        assert_eq!(store.upsert_commission(&redelivered).unwrap(), Upsert::Unchanged);
        assert_eq!(store.list_commissions().unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_updates_on_one_account_do_not_lose_writes() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new("u4");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let user = user.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        atomically(store.as_ref(), &user, Currency::INR, |uow| {
                            let account = uow.account_mut();
                            account.total_earned += Decimal::ONE;
                            account.balance += Decimal::ONE;
                            Ok(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let account = store.get_account(&user).unwrap().unwrap();
        assert_eq!(account.balance, Decimal::from(800));
    }
}
