//! Partner webhook adapter
//!
//! Normalizes affiliate-network envelopes into ledger commands:
//! - Typed event dispatch table of pure payload handlers
//! - Structured failure results for unknown or malformed events
//! - Bounded exponential retry for transient failures
//! - Dead-letter queue with manual reprocessing

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod adapter;
pub mod command;
pub mod config;
pub mod dlq;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod retry;

pub use adapter::{RetryReport, WebhookAdapter, WebhookOutcome};
pub use command::{CommandExecutor, CommandOutcome, LedgerCommand};
pub use config::WebhookConfig;
pub use dlq::{DeadLetterQueue, DlqEntry, DlqStats};
pub use envelope::{EventKind, WebhookEnvelope};
pub use error::{Error, Result};
pub use retry::{RetryConfig, RetryEntry, RetryQueue, Scheduled};
