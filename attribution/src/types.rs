//! Attribution records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source label for conversions with no preceding click
pub const DIRECT_SOURCE: &str = "direct";

/// A marketing interaction preceding a conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Touchpoint {
    /// Originating click (`None` for the synthetic direct touchpoint)
    pub click_id: Option<String>,
    /// Channel
    pub source: String,
    /// When it happened
    pub occurred_at: DateTime<Utc>,
}

impl Touchpoint {
    /// Synthetic touchpoint for unreferred conversions
    pub fn direct(at: DateTime<Utc>) -> Self {
        Self {
            click_id: None,
            source: DIRECT_SOURCE.to_string(),
            occurred_at: at,
        }
    }

    /// Whether this is the synthetic direct touchpoint
    pub fn is_direct(&self) -> bool {
        self.click_id.is_none()
    }
}

impl From<&ledger_core::ClickEvent> for Touchpoint {
    fn from(click: &ledger_core::ClickEvent) -> Self {
        Self {
            click_id: Some(click.click_id.clone()),
            source: click.source.clone(),
            occurred_at: click.clicked_at,
        }
    }
}

/// Credit assigned to one touchpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributedTouchpoint {
    /// Touchpoint
    pub touchpoint: Touchpoint,
    /// Share of credit in `[0, 1]`
    pub weight: f64,
    /// Share of order value
    pub attributed_value: Decimal,
    /// Share of platform commission
    pub attributed_commission: Decimal,
}

/// Credit split for one conversion under one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionRecord {
    /// Conversion
    pub conversion_id: Uuid,
    /// Partner transaction id
    pub transaction_id: String,
    /// Model name
    pub model: String,
    /// Touchpoints in time order
    pub touchpoints: Vec<AttributedTouchpoint>,
    /// Order value split
    pub total_value: Decimal,
    /// Commission split
    pub total_commission: Decimal,
    /// When computed
    pub computed_at: DateTime<Utc>,
}

impl AttributionRecord {
    /// Sum of weights (1.0 within float tolerance)
    pub fn weight_sum(&self) -> f64 {
        self.touchpoints.iter().map(|t| t.weight).sum()
    }

    /// Sum of attributed commission (equals `total_commission`)
    pub fn commission_sum(&self) -> Decimal {
        self.touchpoints.iter().map(|t| t.attributed_commission).sum()
    }

    /// Sum of attributed value (equals `total_value`)
    pub fn value_sum(&self) -> Decimal {
        self.touchpoints.iter().map(|t| t.attributed_value).sum()
    }

    /// Touchpoint with the largest weight (earliest on ties)
    pub fn primary(&self) -> Option<&AttributedTouchpoint> {
        self.touchpoints
            .iter()
            .fold(None, |best: Option<&AttributedTouchpoint>, t| match best {
                Some(b) if b.weight >= t.weight => Some(b),
                _ => Some(t),
            })
    }
}
