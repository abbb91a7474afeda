//! Durable ledger store using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Cashback accounts (key: user_id)
//! - `transactions` - Cashback transactions (key: partner transaction_id)
//! - `conversions` - Normalized conversions (key: partner transaction_id)
//! - `payment_methods` - Payout destinations (key: method id)
//! - `withdrawals` - Withdrawal requests (key: withdrawal id)
//! - `commissions` - Platform commission ledger (key: partner transaction_id)
//!
//! Values are bincode-encoded. A single writer lock serializes every
//! read-modify-write, and each unit of work lands in one `WriteBatch`, so a
//! crash never leaves an account and its transaction rows out of step.

use crate::{
    config::StorageConfig,
    store::{LedgerStore, UnitOfWork, Upsert},
    types::{
        CashbackAccount, CashbackTransaction, CommissionRecord, ConversionEvent, Currency,
        PaymentMethod, UserId, WithdrawalRequest, WithdrawalStatus,
    },
    Error, Result,
};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_TRANSACTIONS: &str = "transactions";
const CF_CONVERSIONS: &str = "conversions";
const CF_PAYMENT_METHODS: &str = "payment_methods";
const CF_WITHDRAWALS: &str = "withdrawals";
const CF_COMMISSIONS: &str = "commissions";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_ACCOUNTS,
    CF_TRANSACTIONS,
    CF_CONVERSIONS,
    CF_PAYMENT_METHODS,
    CF_WITHDRAWALS,
    CF_COMMISSIONS,
];

/// RocksDB-backed [`LedgerStore`]
pub struct RocksStore {
    db: DB,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .finish()
    }
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name)))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            column_families = COLUMN_FAMILIES.len(),
            "Opened RocksDB ledger store"
        );

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf_options(name: &str) -> Options {
        let mut opts = Options::default();
        match name {
            // Append-only history compresses well
            CF_TRANSACTIONS | CF_CONVERSIONS | CF_WITHDRAWALS => {
                opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
            }
            // Accounts are read on every mutation
            _ => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            }
        }
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn get_value<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_value<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        let bytes = bincode::serialize(value)?;
        self.db.put_cf(cf, key, bytes)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf_handle(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            rows.push(bincode::deserialize(&value)?);
        }
        Ok(rows)
    }

    fn batch_put<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        batch.put_cf(cf, key, bincode::serialize(value)?);
        Ok(())
    }
}

impl LedgerStore for RocksStore {
    fn get_account(&self, user_id: &UserId) -> Result<Option<CashbackAccount>> {
        self.get_value(CF_ACCOUNTS, user_id.as_str().as_bytes())
    }

    fn list_accounts(&self) -> Result<Vec<CashbackAccount>> {
        self.scan(CF_ACCOUNTS)
    }

    fn get_transaction(&self, transaction_id: &str) -> Result<Option<CashbackTransaction>> {
        self.get_value(CF_TRANSACTIONS, transaction_id.as_bytes())
    }

    fn list_transactions(&self, user_id: Option<&UserId>) -> Result<Vec<CashbackTransaction>> {
        let mut rows: Vec<CashbackTransaction> = self.scan(CF_TRANSACTIONS)?;
        rows.retain(|t| user_id.map_or(true, |u| &t.user_id == u));
        rows.sort_by_key(|t| t.created_at);
        Ok(rows)
    }

    fn get_conversion(&self, transaction_id: &str) -> Result<Option<ConversionEvent>> {
        self.get_value(CF_CONVERSIONS, transaction_id.as_bytes())
    }

    fn put_payment_method(&self, method: &PaymentMethod) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.put_value(CF_PAYMENT_METHODS, method.id.as_bytes(), method)
    }

    fn get_payment_method(&self, id: Uuid) -> Result<Option<PaymentMethod>> {
        self.get_value(CF_PAYMENT_METHODS, id.as_bytes())
    }

    fn list_payment_methods(&self, user_id: &UserId) -> Result<Vec<PaymentMethod>> {
        let mut rows: Vec<PaymentMethod> = self.scan(CF_PAYMENT_METHODS)?;
        rows.retain(|m| &m.user_id == user_id);
        rows.sort_by_key(|m| m.created_at);
        Ok(rows)
    }

    fn get_withdrawal(&self, id: Uuid) -> Result<Option<WithdrawalRequest>> {
        self.get_value(CF_WITHDRAWALS, id.as_bytes())
    }

    fn list_withdrawals(
        &self,
        user_id: Option<&UserId>,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<WithdrawalRequest>> {
        let mut rows: Vec<WithdrawalRequest> = self.scan(CF_WITHDRAWALS)?;
        rows.retain(|w| user_id.map_or(true, |u| &w.user_id == u));
        rows.retain(|w| status.map_or(true, |s| w.status == s));
        rows.sort_by_key(|w| w.created_at);
        Ok(rows)
    }

    fn upsert_commission(&self, record: &CommissionRecord) -> Result<Upsert> {
        let _guard = self.write_lock.lock();
        let key = record.transaction_id.as_bytes();

        if let Some(existing) = self.get_value::<CommissionRecord>(CF_COMMISSIONS, key)? {
            if existing.same_terms(record) {
                return Ok(Upsert::Unchanged);
            }
        }

        self.put_value(CF_COMMISSIONS, key, record)?;
        Ok(Upsert::Written)
    }

    fn get_commission(&self, transaction_id: &str) -> Result<Option<CommissionRecord>> {
        self.get_value(CF_COMMISSIONS, transaction_id.as_bytes())
    }

    fn list_commissions(&self) -> Result<Vec<CommissionRecord>> {
        self.scan(CF_COMMISSIONS)
    }

    fn apply(
        &self,
        user_id: &UserId,
        currency: Currency,
        work: &mut dyn FnMut(&mut UnitOfWork) -> Result<()>,
    ) -> Result<CashbackAccount> {
        let _guard = self.write_lock.lock();

        let account = self
            .get_account(user_id)?
            .unwrap_or_else(|| CashbackAccount::new(user_id.clone(), currency));

        let mut uow = UnitOfWork::new(account);
        work(&mut uow)?;
        uow.account().check_invariants()?;

        let staged = uow.into_parts();
        let mut batch = WriteBatch::default();

        if let Some(transaction) = &staged.new_transaction {
            let key = transaction.transaction_id.as_bytes();
            if let Some(existing) = self.get_value::<CashbackTransaction>(CF_TRANSACTIONS, key)? {
                return Err(Error::DuplicateTransaction(Box::new(existing)));
            }
            self.batch_put(&mut batch, CF_TRANSACTIONS, key, transaction)?;
        }

        for transaction in &staged.transactions {
            self.batch_put(
                &mut batch,
                CF_TRANSACTIONS,
                transaction.transaction_id.as_bytes(),
                transaction,
            )?;
        }
        for conversion in &staged.conversions {
            self.batch_put(
                &mut batch,
                CF_CONVERSIONS,
                conversion.transaction_id.as_bytes(),
                conversion,
            )?;
        }
        for withdrawal in &staged.withdrawals {
            self.batch_put(&mut batch, CF_WITHDRAWALS, withdrawal.id.as_bytes(), withdrawal)?;
        }

        let mut account = staged.account;
        account.updated_at = chrono::Utc::now();
        self.batch_put(&mut batch, CF_ACCOUNTS, user_id.as_str().as_bytes(), &account)?;

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(user_id = %user_id, "Committed account unit of work");

        Ok(account)
    }
}
