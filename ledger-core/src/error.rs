//! Error types for the ledger

use crate::types::CashbackTransaction;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input or a routine business rejection
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown transaction, account, payment method or withdrawal
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Operation not valid for the entity's current state
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Withdrawal exceeds the spendable balance
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Requested amount
        requested: Decimal,
        /// Spendable balance
        available: Decimal,
    },

    /// Withdrawal below the configured minimum
    #[error("Withdrawal amount {amount} is below the minimum of {minimum}")]
    BelowMinimumWithdrawal {
        /// Requested amount
        amount: Decimal,
        /// Configured minimum
        minimum: Decimal,
    },

    /// Payment method exists but is not verified
    #[error("Payment method {0} is not verified")]
    UnverifiedPaymentMethod(String),

    /// A transaction with this partner id already exists
    #[error("Duplicate transaction: {}", .0.transaction_id)]
    DuplicateTransaction(Box<CashbackTransaction>),

    /// Invariant violation (money conservation, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a not-found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether this error is an expected business outcome rather than a fault
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::NotFound { .. }
                | Error::StateConflict(_)
                | Error::InsufficientBalance { .. }
                | Error::BelowMinimumWithdrawal { .. }
                | Error::UnverifiedPaymentMethod(_)
                | Error::DuplicateTransaction(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = Error::not_found("transaction", "T-1");
        assert_eq!(err.to_string(), "transaction not found: T-1");
        assert!(err.is_business_rejection());
    }

    #[test]
    fn test_storage_is_a_fault() {
        let err = Error::Storage("disk full".to_string());
        assert!(!err.is_business_rejection());
    }
}
