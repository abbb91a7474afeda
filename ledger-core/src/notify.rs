//! Outbound notifications emitted after ledger transitions commit
//!
//! Formatting and delivery belong to the downstream notification service;
//! this module only hands typed events across the boundary.

use crate::types::{Currency, UserId, WithdrawalStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Event handed to the notification service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LedgerNotification {
    /// A cashback transaction was confirmed and credited
    CashbackEarned {
        /// Credited user
        user_id: UserId,
        /// Partner transaction id
        transaction_id: String,
        /// Credited amount
        amount: Decimal,
        /// Currency
        currency: Currency,
        /// Spendable balance after the credit
        balance: Decimal,
    },

    /// A confirmed cashback transaction was reversed
    CashbackReversed {
        /// Debited user
        user_id: UserId,
        /// Partner transaction id
        transaction_id: String,
        /// Reversed amount
        amount: Decimal,
        /// Currency
        currency: Currency,
        /// Reason supplied with the cancellation
        reason: Option<String>,
    },

    /// A withdrawal reached a terminal state
    WithdrawalProcessed {
        /// Requesting user
        user_id: UserId,
        /// Withdrawal id
        withdrawal_id: Uuid,
        /// Amount
        amount: Decimal,
        /// Currency
        currency: Currency,
        /// `Completed` or `Failed`
        status: WithdrawalStatus,
    },

    /// Marketing offer broadcast
    PromotionalOffer {
        /// Target user, or `None` for everyone
        user_id: Option<UserId>,
        /// Headline
        title: String,
        /// Body text
        message: String,
    },
}

impl LedgerNotification {
    /// Short event name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerNotification::CashbackEarned { .. } => "cashback_earned",
            LedgerNotification::CashbackReversed { .. } => "cashback_reversed",
            LedgerNotification::WithdrawalProcessed { .. } => "withdrawal_processed",
            LedgerNotification::PromotionalOffer { .. } => "promotional_offer",
        }
    }
}

/// Sink for ledger notifications. Must not block.
pub trait Notifier: Send + Sync {
    /// Hand off a notification
    fn notify(&self, notification: LedgerNotification);
}

/// Writes notifications to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: LedgerNotification) {
        tracing::info!(kind = notification.kind(), ?notification, "Ledger notification");
    }
}

/// Forwards notifications over a bounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<LedgerNotification>,
}

impl ChannelNotifier {
    /// Create notifier and the receiving end
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<LedgerNotification>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: LedgerNotification) {
        let kind = notification.kind();
        if let Err(err) = self.tx.try_send(notification) {
            // Ledger state is already committed
            tracing::warn!(kind, error = %err, "Dropped ledger notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_notifier_delivers() {
        let (notifier, mut rx) = ChannelNotifier::new(4);
        notifier.notify(LedgerNotification::PromotionalOffer {
            user_id: None,
            title: "Double cashback".to_string(),
            message: "All electronics this weekend".to_string(),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind(), "promotional_offer");
    }

    #[test]
    fn test_channel_notifier_drops_when_full() {
        let (notifier, _rx) = ChannelNotifier::new(1);
        for _ in 0..3 {
            notifier.notify(LedgerNotification::PromotionalOffer {
                user_id: Some(UserId::new("u1")),
                title: "t".to_string(),
                message: "m".to_string(),
            });
        }
    }
}
