//! Error types for fraud detector

use thiserror::Error;
use uuid::Uuid;

/// Fraud detector error
#[derive(Debug, Error)]
pub enum Error {
    /// No case with this id
    #[error("Fraud case not found: {0}")]
    CaseNotFound(Uuid),

    /// Review attempted on a case that is no longer pending
    #[error("Fraud case {id} is already {status}")]
    CaseAlreadyResolved {
        /// Case id
        id: Uuid,
        /// Current status
        status: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for ledger_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::CaseNotFound(id) => ledger_core::Error::not_found("fraud case", id),
            Error::CaseAlreadyResolved { .. } => ledger_core::Error::StateConflict(err.to_string()),
            Error::InvalidConfig(msg) => ledger_core::Error::Config(msg),
        }
    }
}
