//! Error types for the webhook adapter

use thiserror::Error;
use uuid::Uuid;

/// Webhook adapter error
#[derive(Debug, Error)]
pub enum Error {
    /// Event type not in the dispatch table. Converted into a failed
    /// outcome by the adapter rather than returned to callers.
    #[error("Unknown event type '{0}'")]
    UnknownEventType(String),

    /// Required payload field absent or empty
    #[error("Missing field '{0}'")]
    MissingField(&'static str),

    /// Payload field present but unusable
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// What is wrong
        reason: String,
    },

    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// Dead-letter entry does not exist
    #[error("Dead-letter entry {0} not found")]
    EntryNotFound(Uuid),

    /// Dead-letter entry failed permanently
    #[error("Not reprocessable: {0}")]
    NotReprocessable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
