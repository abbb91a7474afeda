//! Cashback Ledger Core
//!
//! Per-user cashback accounts and their append-only transaction history.
//!
//! # Architecture
//!
//! - **Injected persistence**: every component talks to a [`LedgerStore`]
//! - **Per-account units of work**: balance read-modify-write is serialized per account
//! - **Insert-if-absent**: one transaction row per partner transaction id, enforced at commit
//!
//! # Invariants
//!
//! - Money conservation: `balance + reserved + withdrawn == earned + clawback_outstanding`
//! - No balance bucket is ever negative
//! - Transactions move only `pending → confirmed → cancelled` or `pending → cancelled`
//! - Rows are never deleted

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod decimal;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod notify;
pub mod storage;
pub mod store;
pub mod types;

// Re-exports
pub use config::{StorageBackend, StorageConfig};
pub use error::{Error, Result};
pub use ledger::{CashbackLedger, Opened, Settlement, StatusUpdate, Transition};
pub use memory::MemoryStore;
pub use notify::{ChannelNotifier, LedgerNotification, LogNotifier, Notifier};
pub use storage::RocksStore;
pub use store::{atomically, LedgerStore, UnitOfWork, Upsert};
pub use types::{
    CashbackAccount, CashbackTransaction, ClickEvent, CommissionRecord, ConversionEvent, Currency,
    Metadata, PaymentMethod, PaymentMethodKind, ProductLine, TrackEvent, TransactionStatus, UserId,
    WithdrawalRequest, WithdrawalStatus,
};
