//! Error types for rule engine

use thiserror::Error;

/// Rule engine error
#[derive(Debug, Error)]
pub enum Error {
    /// A rule failed validation at load
    #[error("Invalid rule '{rule_id}': {reason}")]
    InvalidRule {
        /// Offending rule
        rule_id: String,
        /// What is wrong
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Field name could not be parsed
    #[error("Unknown rule field '{0}'")]
    UnknownField(String),

    /// Rule file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for ledger_core::Error {
    fn from(err: Error) -> Self {
        ledger_core::Error::Config(err.to_string())
    }
}
