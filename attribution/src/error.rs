//! Error types for attribution

use thiserror::Error;

/// Attribution error
#[derive(Debug, Error)]
pub enum Error {
    /// Model parameters out of range
    #[error("Invalid attribution model: {0}")]
    InvalidModel(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for ledger_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidModel(msg) => ledger_core::Error::Validation(msg),
            Error::InvalidConfig(msg) => ledger_core::Error::Config(msg),
        }
    }
}
