//! Intake & deduplication
//!
//! Validates and normalizes inbound conversions. Rejections are routine
//! outcomes, not errors: a missing id or an order below the floor yields
//! [`IntakeOutcome::Rejected`] and no transaction.

use chrono::{DateTime, Utc};
use ledger_core::{CashbackTransaction, ConversionEvent, Currency, TrackEvent, TransactionStatus, UserId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Intake configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Orders below this amount create no transaction
    #[serde(with = "ledger_core::decimal")]
    pub min_order_amount: Decimal,

    /// Currency assumed when the partner sends none
    pub default_currency: Currency,

    /// Category assumed when the partner sends none
    pub default_category: String,

    /// Events tracked concurrently by batch ingestion
    pub batch_concurrency: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            min_order_amount: dec!(10.00),
            default_currency: Currency::INR,
            default_category: "other".to_string(),
            batch_concurrency: 16,
        }
    }
}

/// Why an event created no transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// Blank user id
    MissingUserId,
    /// Blank transaction id
    MissingTransactionId,
    /// Zero or negative amount
    NonPositiveAmount {
        /// Amount received
        amount: Decimal,
    },
    /// Below the configured floor
    BelowMinimum {
        /// Amount received
        amount: Decimal,
        /// Configured floor
        minimum: Decimal,
    },
    /// Currency code not supported
    UnsupportedCurrency {
        /// Code received
        currency: String,
    },
    /// Refused by the ledger (e.g. inactive account, currency mismatch)
    Refused {
        /// Ledger message
        message: String,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingUserId => f.write_str("userId is required"),
            Rejection::MissingTransactionId => f.write_str("transactionId is required"),
            Rejection::NonPositiveAmount { amount } => {
                write!(f, "amount must be positive, got {}", amount)
            }
            Rejection::BelowMinimum { amount, minimum } => {
                write!(f, "amount {} is below the minimum order amount {}", amount, minimum)
            }
            Rejection::UnsupportedCurrency { currency } => {
                write!(f, "unsupported currency '{}'", currency)
            }
            Rejection::Refused { message } => f.write_str(message),
        }
    }
}

/// Result of tracking one event
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    /// New pending transaction
    Created(CashbackTransaction),
    /// Transaction id already known; stored row returned unchanged
    Duplicate(CashbackTransaction),
    /// No transaction created
    Rejected(Rejection),
}

impl IntakeOutcome {
    /// The transaction, unless rejected
    pub fn transaction(&self) -> Option<&CashbackTransaction> {
        match self {
            IntakeOutcome::Created(tx) | IntakeOutcome::Duplicate(tx) => Some(tx),
            IntakeOutcome::Rejected(_) => None,
        }
    }

    /// Consume into the transaction, unless rejected
    pub fn into_transaction(self) -> Option<CashbackTransaction> {
        match self {
            IntakeOutcome::Created(tx) | IntakeOutcome::Duplicate(tx) => Some(tx),
            IntakeOutcome::Rejected(_) => None,
        }
    }

    /// Label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            IntakeOutcome::Created(_) => "created",
            IntakeOutcome::Duplicate(_) => "duplicate",
            IntakeOutcome::Rejected(_) => "rejected",
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Validate and normalize an event into a conversion with no rate applied yet.
///
/// Trims ids, parses the currency, lower-cases store and category.
pub fn normalize(
    config: &IntakeConfig,
    event: TrackEvent,
    received_at: DateTime<Utc>,
) -> Result<ConversionEvent, Rejection> {
    let user_id = event.user_id.trim();
    if user_id.is_empty() {
        return Err(Rejection::MissingUserId);
    }
    let transaction_id = event.transaction_id.trim();
    if transaction_id.is_empty() {
        return Err(Rejection::MissingTransactionId);
    }
    if event.amount <= Decimal::ZERO {
        return Err(Rejection::NonPositiveAmount { amount: event.amount });
    }
    if event.amount < config.min_order_amount {
        return Err(Rejection::BelowMinimum {
            amount: event.amount,
            minimum: config.min_order_amount,
        });
    }

    let currency = match event.currency.trim() {
        "" => config.default_currency,
        code => code.parse().map_err(|_| Rejection::UnsupportedCurrency {
            currency: code.to_string(),
        })?,
    };

    let category = non_blank(event.category)
        .map(|c| c.to_lowercase())
        .unwrap_or_else(|| config.default_category.clone());

    Ok(ConversionEvent {
        id: Uuid::now_v7(),
        transaction_id: transaction_id.to_string(),
        user_id: UserId::new(user_id),
        click_id: non_blank(event.click_id),
        order_id: non_blank(event.order_id),
        affiliate_id: non_blank(event.affiliate_id),
        store: event.store.trim().to_lowercase(),
        category,
        order_amount: event.amount,
        currency,
        commission_rate: Decimal::ZERO,
        commission: Decimal::ZERO,
        cashback: Decimal::ZERO,
        products: event.products,
        country: non_blank(event.country).map(|c| c.to_ascii_uppercase()),
        user_agent: non_blank(event.user_agent),
        ip: event.ip,
        status: TransactionStatus::Pending,
        occurred_at: event.occurred_at.unwrap_or(received_at),
        metadata: event.metadata,
    })
}
