//! Core types for the cashback ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)
//! - Append-only financial history (statuses move forward, rows are never deleted)

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

/// Free-form string metadata attached to ledger rows
pub type Metadata = BTreeMap<String, String>;

/// End-user identifier (1:1 with a cashback account)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id carries any non-whitespace characters
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
    /// UAE Dirham
    AED,
    /// Indian Rupee
    INR,
    /// Japanese Yen
    JPY,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::AED => "AED",
            Currency::INR => "INR",
            Currency::JPY => "JPY",
        }
    }

    /// Number of minor-unit decimal places
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Round a money amount to this currency's minor units.
    ///
    /// Rounds toward zero: a credited figure never exceeds the exact product
    /// it was derived from.
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.decimal_places(), RoundingStrategy::ToZero)
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::INR
    }
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "AED" => Ok(Currency::AED),
            "INR" => Ok(Currency::INR),
            "JPY" => Ok(Currency::JPY),
            other => Err(Error::Validation(format!("unsupported currency '{}'", other))),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A tracked affiliate link click. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    /// Click identifier issued by the link tracker
    pub click_id: String,

    /// User who clicked
    pub user_id: UserId,

    /// Marketing source/channel (e.g. "telegram", "email", "search")
    pub source: String,

    /// Destination (merchant) URL
    pub destination_url: String,

    /// Device user agent
    pub user_agent: Option<String>,

    /// Client IP address
    pub ip: Option<IpAddr>,

    /// ISO country code resolved for the click
    pub country: Option<String>,

    /// When the click happened
    pub clicked_at: DateTime<Utc>,
}

/// One product line of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductLine {
    /// Merchant SKU
    pub sku: String,
    /// Display name
    pub name: String,
    /// Quantity ordered
    pub quantity: u32,
    /// Price per unit
    pub unit_price: Decimal,
    /// Product category, if the merchant reports one
    pub category: Option<String>,
}

/// Inbound conversion as handed to intake, before validation and normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackEvent {
    /// Purchasing user
    pub user_id: String,
    /// Partner transaction id (idempotency key)
    pub transaction_id: String,
    /// Merchant order id
    pub order_id: Option<String>,
    /// Order amount
    pub amount: Decimal,
    /// ISO currency code
    pub currency: String,
    /// Merchant / store
    pub store: String,
    /// Product category
    pub category: Option<String>,
    /// Affiliate network id
    pub affiliate_id: Option<String>,
    /// Click this conversion is attributed to
    pub click_id: Option<String>,
    /// Product lines
    pub products: Vec<ProductLine>,
    /// Buyer country as reported by the partner
    pub country: Option<String>,
    /// Buyer user agent as reported by the partner
    pub user_agent: Option<String>,
    /// Buyer IP as reported by the partner
    pub ip: Option<IpAddr>,
    /// When the purchase happened (defaults to receipt time)
    pub occurred_at: Option<DateTime<Utc>>,
    /// Extra partner fields
    pub metadata: Metadata,
}

/// A validated, normalized conversion. Immutable once created except `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionEvent {
    /// Conversion id
    pub id: Uuid,
    /// Partner transaction id (unique)
    pub transaction_id: String,
    /// Purchasing user
    pub user_id: UserId,
    /// Referring click
    pub click_id: Option<String>,
    /// Merchant order id
    pub order_id: Option<String>,
    /// Affiliate network id
    pub affiliate_id: Option<String>,
    /// Store, lower-cased
    pub store: String,
    /// Category, lower-cased
    pub category: String,
    /// Order amount
    pub order_amount: Decimal,
    /// Currency
    pub currency: Currency,
    /// Applied commission rate
    pub commission_rate: Decimal,
    /// Platform commission
    pub commission: Decimal,
    /// User cashback
    pub cashback: Decimal,
    /// Product lines
    pub products: Vec<ProductLine>,
    /// Buyer country
    pub country: Option<String>,
    /// Buyer user agent
    pub user_agent: Option<String>,
    /// Buyer IP
    pub ip: Option<IpAddr>,
    /// Current status (mirrors the cashback transaction)
    pub status: TransactionStatus,
    /// When the purchase happened
    pub occurred_at: DateTime<Utc>,
    /// Extra partner fields
    pub metadata: Metadata,
}

/// Cashback transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Awaiting merchant confirmation (initial)
    Pending = 1,
    /// Confirmed by the merchant; amount is in the spendable balance
    Confirmed = 2,
    /// Refunded, charged back or fraudulent (terminal)
    Cancelled = 3,
}

impl TransactionStatus {
    /// Lower-case wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    /// Whether moving from `self` to `next` is a legal state-machine edge
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Confirmed)
                | (TransactionStatus::Pending, TransactionStatus::Cancelled)
                | (TransactionStatus::Confirmed, TransactionStatus::Cancelled)
        )
    }

    /// Check if status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Cancelled)
    }
}

impl FromStr for TransactionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "confirmed" => Ok(TransactionStatus::Confirmed),
            "cancelled" | "canceled" => Ok(TransactionStatus::Cancelled),
            other => Err(Error::Validation(format!("unknown transaction status '{}'", other))),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only cashback record, keyed by the partner transaction id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashbackTransaction {
    /// Row id
    pub id: Uuid,
    /// Owning user
    pub user_id: UserId,
    /// Partner transaction id (idempotency key, unique)
    pub transaction_id: String,
    /// Cashback amount credited to the user
    pub amount: Decimal,
    /// Order amount the cashback was computed from
    pub order_amount: Decimal,
    /// Currency
    pub currency: Currency,
    /// Current status
    pub status: TransactionStatus,
    /// Metadata (applied rate, rule, fraud score, ...)
    pub metadata: Metadata,
    /// Reason supplied with the latest status change
    pub status_reason: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
    /// When confirmed
    pub confirmed_at: Option<DateTime<Utc>>,
    /// When cancelled
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl CashbackTransaction {
    /// Create a pending transaction for a conversion
    pub fn pending(conversion: &ConversionEvent, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id: conversion.user_id.clone(),
            transaction_id: conversion.transaction_id.clone(),
            amount: conversion.cashback,
            order_amount: conversion.order_amount,
            currency: conversion.currency,
            status: TransactionStatus::Pending,
            metadata,
            status_reason: None,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            cancelled_at: None,
        }
    }
}

/// Per-user cashback account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashbackAccount {
    /// Account id
    pub id: Uuid,
    /// Owning user (1:1)
    pub user_id: UserId,
    /// Spendable balance
    pub balance: Decimal,
    /// Cashback awaiting merchant confirmation
    pub pending_balance: Decimal,
    /// Amount held by pending/processing withdrawals
    pub reserved_balance: Decimal,
    /// Sum of confirmed, uncancelled cashback
    pub total_earned: Decimal,
    /// Sum of completed withdrawals
    pub total_withdrawn: Decimal,
    /// Reversed cashback the user had already withdrawn; recovered from future credits
    pub clawback_outstanding: Decimal,
    /// Currency
    pub currency: Currency,
    /// Whether the account accepts new credits
    pub active: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl CashbackAccount {
    /// Create an empty, active account
    pub fn new(user_id: UserId, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id,
            balance: Decimal::ZERO,
            pending_balance: Decimal::ZERO,
            reserved_balance: Decimal::ZERO,
            total_earned: Decimal::ZERO,
            total_withdrawn: Decimal::ZERO,
            clawback_outstanding: Decimal::ZERO,
            currency,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check money conservation for this account.
    ///
    /// `balance + reserved + withdrawn == earned + clawback_outstanding`,
    /// and no bucket may go negative.
    pub fn check_invariants(&self) -> Result<()> {
        let buckets = [
            ("balance", self.balance),
            ("pending_balance", self.pending_balance),
            ("reserved_balance", self.reserved_balance),
            ("total_earned", self.total_earned),
            ("total_withdrawn", self.total_withdrawn),
            ("clawback_outstanding", self.clawback_outstanding),
        ];
        if let Some((name, value)) = buckets.iter().find(|(_, v)| v.is_sign_negative() && !v.is_zero()) {
            return Err(Error::InvariantViolation(format!(
                "account {} has negative {}: {}",
                self.user_id, name, value
            )));
        }

        let held = self.balance + self.reserved_balance + self.total_withdrawn;
        let owed = self.total_earned + self.clawback_outstanding;
        if held != owed {
            return Err(Error::InvariantViolation(format!(
                "account {} does not conserve money: balance+reserved+withdrawn={} earned+clawback={}",
                self.user_id, held, owed
            )));
        }
        Ok(())
    }
}

/// Payout destination type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethodKind {
    /// UPI virtual payment address
    Upi,
    /// Mobile wallet
    Wallet,
    /// Bank account
    BankAccount,
    /// PayPal account
    Paypal,
}

impl PaymentMethodKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodKind::Upi => "upi",
            PaymentMethodKind::Wallet => "wallet",
            PaymentMethodKind::BankAccount => "bank_account",
            PaymentMethodKind::Paypal => "paypal",
        }
    }
}

impl FromStr for PaymentMethodKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upi" => Ok(PaymentMethodKind::Upi),
            "wallet" | "paytm" | "phonepe" => Ok(PaymentMethodKind::Wallet),
            "bank" | "bank_account" | "bank_transfer" => Ok(PaymentMethodKind::BankAccount),
            "paypal" => Ok(PaymentMethodKind::Paypal),
            other => Err(Error::Validation(format!("unsupported payment method '{}'", other))),
        }
    }
}

/// A user's payout destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    /// Method id
    pub id: Uuid,
    /// Owning user
    pub user_id: UserId,
    /// Type
    pub kind: PaymentMethodKind,
    /// Type-specific details (VPA, account number, ...)
    pub details: Metadata,
    /// Whether ownership was verified
    pub verified: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// When verified
    pub verified_at: Option<DateTime<Utc>>,
}

/// Withdrawal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum WithdrawalStatus {
    /// Requested; amount reserved
    Pending = 1,
    /// Handed to the payout rail
    Processing = 2,
    /// Paid out (terminal)
    Completed = 3,
    /// Payout failed; reservation restored (terminal)
    Failed = 4,
}

impl WithdrawalStatus {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Failed => "failed",
        }
    }

    /// Check if status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Completed | WithdrawalStatus::Failed)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payout request against a cashback account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Request id
    pub id: Uuid,
    /// Requesting user
    pub user_id: UserId,
    /// Amount to pay out
    pub amount: Decimal,
    /// Currency
    pub currency: Currency,
    /// Destination
    pub payment_method_id: Uuid,
    /// Current status
    pub status: WithdrawalStatus,
    /// Rail reference once executed
    pub external_reference: Option<String>,
    /// Failure reason for failed payouts
    pub failure_reason: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
    /// When handed to the rail
    pub processing_started_at: Option<DateTime<Utc>>,
    /// When a terminal state was reached
    pub processed_at: Option<DateTime<Utc>>,
}

/// Platform commission ledger entry, one per partner transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionRecord {
    /// Partner transaction id
    pub transaction_id: String,
    /// Commission approved by the network
    pub amount: Decimal,
    /// Currency
    pub currency: Currency,
    /// Network status (e.g. "approved")
    pub status: String,
    /// Network-supplied reason
    pub reason: Option<String>,
    /// When recorded
    pub recorded_at: DateTime<Utc>,
}

impl CommissionRecord {
    /// Same business content, ignoring the recording timestamp
    pub fn same_terms(&self, other: &CommissionRecord) -> bool {
        self.transaction_id == other.transaction_id
            && self.amount == other.amount
            && self.currency == other.currency
            && self.status == other.status
            && self.reason == other.reason
    }
}
