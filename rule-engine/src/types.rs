//! Rule definitions
//!
//! Rules are configuration, not per-transaction state. They are loaded from
//! TOML or JSON, validated once, and evaluated read-only.

use crate::Error;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Conversion attribute a condition reads
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Field {
    /// Order amount
    Amount,
    /// ISO currency code
    Currency,
    /// Store, lower-cased
    Store,
    /// Category, lower-cased
    Category,
    /// Purchasing user
    UserId,
    /// Number of product lines
    ProductCount,
    /// Partner metadata entry (`metadata.<key>`)
    Metadata(String),
}

impl Field {
    /// Whether the field holds a number
    pub fn is_numeric(&self) -> bool {
        matches!(self, Field::Amount | Field::ProductCount | Field::Metadata(_))
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        if let Some(key) = s.strip_prefix("metadata.") {
            if key.is_empty() {
                return Err(Error::UnknownField(s.to_string()));
            }
            return Ok(Field::Metadata(key.to_string()));
        }
        match s {
            "amount" | "order_amount" => Ok(Field::Amount),
            "currency" => Ok(Field::Currency),
            "store" => Ok(Field::Store),
            "category" => Ok(Field::Category),
            "user_id" => Ok(Field::UserId),
            "product_count" => Ok(Field::ProductCount),
            other => Err(Error::UnknownField(other.to_string())),
        }
    }
}

impl TryFrom<String> for Field {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        s.parse()
    }
}

impl From<Field> for String {
    fn from(field: Field) -> Self {
        field.to_string()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Amount => f.write_str("amount"),
            Field::Currency => f.write_str("currency"),
            Field::Store => f.write_str("store"),
            Field::Category => f.write_str("category"),
            Field::UserId => f.write_str("user_id"),
            Field::ProductCount => f.write_str("product_count"),
            Field::Metadata(key) => write!(f, "metadata.{}", key),
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equal (case-insensitive for text)
    Equals,
    /// Not equal
    NotEquals,
    /// Strictly greater
    GreaterThan,
    /// Greater or equal
    GreaterThanOrEqual,
    /// Strictly less
    LessThan,
    /// Less or equal
    LessThanOrEqual,
    /// Text contains substring
    Contains,
    /// Value is one of a list
    In,
    /// Text starts with prefix
    StartsWith,
}

impl Operator {
    /// Whether the operator orders numbers
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Operator::GreaterThan
                | Operator::GreaterThanOrEqual
                | Operator::LessThan
                | Operator::LessThanOrEqual
        )
    }
}

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    /// Number
    Number(f64),
    /// Text
    Text(String),
    /// List (for `in`)
    List(Vec<RuleValue>),
}

impl RuleValue {
    /// Numeric view (numbers, or text that parses as a decimal)
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            RuleValue::Number(n) => {
                use rust_decimal::prelude::FromPrimitive;
                Decimal::from_f64(*n).map(|d| d.normalize())
            }
            RuleValue::Text(s) => s.trim().parse().ok(),
            RuleValue::List(_) => None,
        }
    }

    /// Text view
    pub fn as_text(&self) -> Option<String> {
        match self {
            RuleValue::Number(n) => Some(n.to_string()),
            RuleValue::Text(s) => Some(s.clone()),
            RuleValue::List(_) => None,
        }
    }
}

/// One `field operator value` test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Attribute
    pub field: Field,
    /// Operator
    pub operator: Operator,
    /// Operand
    pub value: RuleValue,
}

/// Effect of a matching rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Replace the commission rate
    SetCommissionRate {
        /// New rate (fraction of order amount)
        #[serde(with = "ledger_core::decimal")]
        rate: Decimal,
    },
    /// Scale the current rate
    MultiplyRate {
        /// Multiplier
        #[serde(with = "ledger_core::decimal")]
        factor: Decimal,
    },
    /// Add a fixed cashback bonus
    AddBonus {
        /// Bonus amount
        #[serde(with = "ledger_core::decimal")]
        amount: Decimal,
    },
    /// Limit the cashback credited
    CapCashback {
        /// Maximum cashback
        #[serde(with = "ledger_core::decimal")]
        max: Decimal,
    },
    /// Flag the conversion for manual review
    FlagForReview {
        /// Why
        reason: String,
    },
}

impl Action {
    /// Whether the action changes the rate or the cashback credited
    pub fn affects_cashback(&self) -> bool {
        !matches!(self, Action::FlagForReview { .. })
    }
}

/// A configured conditional rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRule {
    /// Unique id
    pub id: String,

    /// Display name
    pub name: String,

    /// Evaluation order; higher numbers are evaluated later and win
    #[serde(default)]
    pub priority: i32,

    /// Disabled rules are skipped
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Conjunction of conditions (empty matches everything)
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Actions run on match
    pub actions: Vec<Action>,
}

fn default_enabled() -> bool {
    true
}

/// How multiple matching rules combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePolicy {
    /// Only the highest-priority match that prices the conversion applies;
    /// flag-only rules never compete
    #[default]
    HighestPriorityWins,
    /// Every matching rule applies in ascending priority order
    Cumulative,
}
