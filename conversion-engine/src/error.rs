//! Error types for engine assembly

use thiserror::Error;

/// Engine construction and configuration errors.
///
/// Operations on a running service report [`ledger_core::Error`] so callers
/// see one taxonomy regardless of which component refused.
#[derive(Debug, Error)]
pub enum Error {
    /// Ledger or component error
    #[error(transparent)]
    Ledger(#[from] ledger_core::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

impl From<fraud_detector::Error> for Error {
    fn from(err: fraud_detector::Error) -> Self {
        Error::Ledger(err.into())
    }
}

impl From<rule_engine::Error> for Error {
    fn from(err: rule_engine::Error) -> Self {
        Error::Ledger(err.into())
    }
}

impl From<attribution::Error> for Error {
    fn from(err: attribution::Error) -> Self {
        Error::Ledger(err.into())
    }
}

impl From<payout::Error> for Error {
    fn from(err: payout::Error) -> Self {
        Error::Ledger(err.into())
    }
}
