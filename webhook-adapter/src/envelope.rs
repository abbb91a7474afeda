//! Partner webhook envelope

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Envelope as sent by affiliate partners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// Event type (e.g. `conversion.created`)
    pub event: String,

    /// Event payload
    #[serde(default)]
    pub data: Value,

    /// When the partner emitted the event
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Sending partner
    #[serde(default)]
    pub source: Option<String>,
}

impl WebhookEnvelope {
    /// Create envelope stamped now
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            timestamp: Some(Utc::now()),
            source: None,
        }
    }

    /// Set the sending partner
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Parse one JSON document
    pub fn from_json(raw: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Transaction id carried in the payload, if any
    pub fn transaction_id(&self) -> Option<String> {
        ["transactionId", "transaction_id"]
            .iter()
            .find_map(|k| self.data.get(*k))
            .and_then(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

/// Recognized event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// New conversion
    ConversionCreated,
    /// Merchant confirmed the sale
    ConversionConfirmed,
    /// Order refunded after purchase
    ConversionRefunded,
    /// Network rejected or cancelled the conversion
    ConversionCancelled,
    /// Network approved platform commission
    CommissionApproved,
}

impl EventKind {
    /// Every kind, in dispatch-table order
    pub const ALL: [EventKind; 5] = [
        EventKind::ConversionCreated,
        EventKind::ConversionConfirmed,
        EventKind::ConversionRefunded,
        EventKind::ConversionCancelled,
        EventKind::CommissionApproved,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ConversionCreated => "conversion.created",
            EventKind::ConversionConfirmed => "conversion.confirmed",
            EventKind::ConversionRefunded => "conversion.refunded",
            EventKind::ConversionCancelled => "conversion.cancelled",
            EventKind::CommissionApproved => "affiliate.commission.approved",
        }
    }

    /// Parse a wire name; `None` for unrecognized events
    pub fn parse(event: &str) -> Option<Self> {
        match event.trim().to_ascii_lowercase().as_str() {
            "conversion.created" => Some(EventKind::ConversionCreated),
            "conversion.confirmed" | "conversion.approved" => Some(EventKind::ConversionConfirmed),
            "conversion.refunded" | "conversion.chargeback" => Some(EventKind::ConversionRefunded),
            "conversion.cancelled" | "conversion.canceled" | "conversion.rejected" => {
                Some(EventKind::ConversionCancelled)
            }
            "affiliate.commission.approved" | "commission.approved" => {
                Some(EventKind::CommissionApproved)
            }
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
