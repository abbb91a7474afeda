//! Ledger commands produced from webhook events

use async_trait::async_trait;
use ledger_core::{StatusUpdate, TrackEvent};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One ledger operation derived from one event
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCommand {
    /// Intake a conversion
    Track(TrackEvent),
    /// Move a transaction to another status
    UpdateStatus(StatusUpdate),
    /// Record approved platform commission
    ApproveCommission {
        /// Partner transaction id
        transaction_id: String,
        /// Approved commission
        amount: Decimal,
        /// Network status label
        status: String,
        /// Network reason
        reason: Option<String>,
    },
}

impl LedgerCommand {
    /// Transaction the command targets
    pub fn transaction_id(&self) -> &str {
        match self {
            LedgerCommand::Track(event) => &event.transaction_id,
            LedgerCommand::UpdateStatus(update) => &update.transaction_id,
            LedgerCommand::ApproveCommission { transaction_id, .. } => transaction_id,
        }
    }

    /// Short name for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerCommand::Track(_) => "track",
            LedgerCommand::UpdateStatus(_) => "update_status",
            LedgerCommand::ApproveCommission { .. } => "approve_commission",
        }
    }
}

/// What executing a command did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// State changed
    Applied {
        /// Description
        message: String,
    },
    /// Already in the requested state (redelivery)
    Unchanged {
        /// Description
        message: String,
    },
    /// Refused as a routine business outcome (e.g. below minimum); no state changed
    Rejected {
        /// Why
        reason: String,
    },
}

impl CommandOutcome {
    /// Whether the event should be reported as handled
    pub fn is_success(&self) -> bool {
        !matches!(self, CommandOutcome::Rejected { .. })
    }

    /// Human-readable message
    pub fn message(&self) -> &str {
        match self {
            CommandOutcome::Applied { message } | CommandOutcome::Unchanged { message } => message,
            CommandOutcome::Rejected { reason } => reason,
        }
    }
}

/// Executes ledger commands (implemented by the service facade)
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run one command
    async fn execute(&self, command: LedgerCommand) -> ledger_core::Result<CommandOutcome>;
}
