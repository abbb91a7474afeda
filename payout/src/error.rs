//! Error types for payouts

use std::time::Duration;
use thiserror::Error;

/// Result type for payout operations
pub type Result<T> = std::result::Result<T, Error>;

/// Payout errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// The rail answered with a transport or internal error
    #[error("Payout rail error: {0}")]
    Rail(String),

    /// The rail did not answer in time
    #[error("Payout rail timed out after {0:?}")]
    RailTimeout(Duration),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<Error> for ledger_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Ledger(e) => e,
            Error::Config(msg) => ledger_core::Error::Config(msg),
            other => ledger_core::Error::Storage(other.to_string()),
        }
    }
}
