//! Event handlers
//!
//! Each handler is a pure function from an event payload to one
//! [`LedgerCommand`]. Adding an event type means adding a row to
//! [`DISPATCH_TABLE`]. Payload keys are accepted in camelCase or snake_case.

use crate::{command::LedgerCommand, envelope::EventKind, Error, Result};
use chrono::{DateTime, Utc};
use ledger_core::{Metadata, ProductLine, StatusUpdate, TrackEvent, TransactionStatus};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

/// Pure payload → command translation
pub type Handler = fn(&Value) -> Result<LedgerCommand>;

/// Event kind → handler
pub static DISPATCH_TABLE: &[(EventKind, Handler)] = &[
    (EventKind::ConversionCreated, conversion_created as Handler),
    (EventKind::ConversionConfirmed, conversion_confirmed as Handler),
    (EventKind::ConversionRefunded, conversion_refunded as Handler),
    (EventKind::ConversionCancelled, conversion_cancelled as Handler),
    (EventKind::CommissionApproved, commission_approved as Handler),
];

/// Handler for a kind
pub fn handler_for(kind: EventKind) -> Option<Handler> {
    DISPATCH_TABLE
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, handler)| *handler)
}

/// Translate a payload for a known kind
pub fn translate(kind: EventKind, data: &Value) -> Result<LedgerCommand> {
    let handler = handler_for(kind).ok_or_else(|| Error::UnknownEventType(kind.to_string()))?;
    handler(data)
}

fn object(data: &Value) -> Result<&Map<String, Value>> {
    data.as_object().ok_or(Error::InvalidField {
        field: "data",
        reason: "expected an object".to_string(),
    })
}

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    lookup(obj, keys).and_then(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn required_text(obj: &Map<String, Value>, keys: &[&str], field: &'static str) -> Result<String> {
    text(obj, keys).ok_or(Error::MissingField(field))
}

fn decimal(obj: &Map<String, Value>, keys: &[&str], field: &'static str) -> Result<Option<Decimal>> {
    match lookup(obj, keys) {
        None => Ok(None),
        Some(v) => ledger_core::decimal::from_json(v)
            .map(Some)
            .ok_or_else(|| Error::InvalidField {
                field,
                reason: format!("not a decimal: {}", v),
            }),
    }
}

fn timestamp(obj: &Map<String, Value>) -> Result<Option<DateTime<Utc>>> {
    match text(obj, &["occurredAt", "occurred_at", "purchasedAt", "purchased_at"]) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| Error::InvalidField {
                field: "occurredAt",
                reason: e.to_string(),
            }),
    }
}

fn metadata(obj: &Map<String, Value>) -> Metadata {
    let mut metadata = Metadata::new();
    if let Some(Value::Object(extra)) = lookup(obj, &["metadata"]) {
        for (key, value) in extra {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            metadata.insert(key.clone(), value);
        }
    }
    metadata
}

fn products(obj: &Map<String, Value>) -> Result<Vec<ProductLine>> {
    let Some(Value::Array(items)) = lookup(obj, &["products"]) else {
        return Ok(Vec::new());
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let item = item.as_object().ok_or(Error::InvalidField {
                field: "products",
                reason: format!("item {} is not an object", i),
            })?;
            let quantity = lookup(item, &["quantity", "qty"])
                .and_then(Value::as_u64)
                .unwrap_or(1);
            Ok(ProductLine {
                sku: text(item, &["sku", "productId", "product_id", "id"])
                    .unwrap_or_else(|| format!("item-{}", i + 1)),
                name: text(item, &["name", "title"]).unwrap_or_default(),
                quantity: u32::try_from(quantity).unwrap_or(u32::MAX),
                unit_price: decimal(item, &["unitPrice", "unit_price", "price"], "products.price")?
                    .unwrap_or_default(),
                category: text(item, &["category"]),
            })
        })
        .collect()
}

fn conversion_created(data: &Value) -> Result<LedgerCommand> {
    let obj = object(data)?;

    let ip = match text(obj, &["ip", "ipAddress", "ip_address"]) {
        None => None,
        Some(raw) => Some(raw.parse().map_err(|_| Error::InvalidField {
            field: "ip",
            reason: format!("'{}' is not an IP address", raw),
        })?),
    };

    Ok(LedgerCommand::Track(TrackEvent {
        user_id: required_text(obj, &["userId", "user_id"], "userId")?,
        transaction_id: required_text(obj, &["transactionId", "transaction_id"], "transactionId")?,
        order_id: text(obj, &["orderId", "order_id"]),
        amount: decimal(obj, &["amount", "orderAmount", "order_amount"], "amount")?
            .ok_or(Error::MissingField("amount"))?,
        currency: text(obj, &["currency"]).unwrap_or_default(),
        store: text(obj, &["store", "merchant"]).unwrap_or_default(),
        category: text(obj, &["category"]),
        affiliate_id: text(obj, &["affiliateId", "affiliate_id"]),
        click_id: text(obj, &["clickId", "click_id", "subId", "sub_id"]),
        products: products(obj)?,
        country: text(obj, &["country", "countryCode", "country_code"]),
        user_agent: text(obj, &["userAgent", "user_agent"]),
        ip,
        occurred_at: timestamp(obj)?,
        metadata: metadata(obj),
    }))
}

fn status_update(data: &Value, status: TransactionStatus, default_reason: &str) -> Result<LedgerCommand> {
    let obj = object(data)?;
    let reason = text(obj, &["reason", "statusReason", "status_reason"])
        .unwrap_or_else(|| default_reason.to_string());

    Ok(LedgerCommand::UpdateStatus(StatusUpdate {
        transaction_id: required_text(obj, &["transactionId", "transaction_id"], "transactionId")?,
        status,
        reason: Some(reason),
        metadata: metadata(obj),
    }))
}

fn conversion_confirmed(data: &Value) -> Result<LedgerCommand> {
    status_update(data, TransactionStatus::Confirmed, "merchant_confirmed")
}

fn conversion_refunded(data: &Value) -> Result<LedgerCommand> {
    status_update(data, TransactionStatus::Cancelled, "refunded")
}

fn conversion_cancelled(data: &Value) -> Result<LedgerCommand> {
    status_update(data, TransactionStatus::Cancelled, "cancelled_by_network")
}

fn commission_approved(data: &Value) -> Result<LedgerCommand> {
    let obj = object(data)?;
    Ok(LedgerCommand::ApproveCommission {
        transaction_id: required_text(obj, &["transactionId", "transaction_id"], "transactionId")?,
        amount: decimal(obj, &["commissionAmount", "commission_amount", "commission"], "commissionAmount")?
            .ok_or(Error::MissingField("commissionAmount"))?,
        status: text(obj, &["status"]).unwrap_or_else(|| "approved".to_string()),
        reason: text(obj, &["reason"]),
    })
}
