//! Serde helpers for money and rates in human-edited input
//!
//! Persisted rows serialize `Decimal` as a string (bincode needs the type
//! hint). Config files and partner payloads write amounts as bare numbers as
//! often as strings, so these helpers accept integers, floats and strings.
//!
//! ```ignore
//! #[serde(with = "ledger_core::decimal")]
//! pub minimum_order_amount: Decimal,
//! ```

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serializer};
use std::collections::BTreeMap;

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Repr {
    fn into_decimal<E: de::Error>(self) -> Result<Decimal, E> {
        match self {
            Repr::Int(i) => Ok(Decimal::from(i)),
            Repr::Float(f) => Decimal::from_f64(f)
                .map(|d| d.normalize())
                .ok_or_else(|| E::custom(format!("{} is not a finite decimal", f))),
            Repr::Text(s) => parse(&s).map_err(E::custom),
        }
    }
}

/// Parse a decimal string, tolerating surrounding whitespace
pub fn parse(s: &str) -> Result<Decimal, String> {
    s.trim()
        .parse::<Decimal>()
        .map_err(|e| format!("invalid decimal '{}': {}", s, e))
}

/// Convert a JSON value (number or string) into a decimal
pub fn from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => parse(&n.to_string()).ok(),
        serde_json::Value::String(s) => parse(s).ok(),
        _ => None,
    }
}

/// Serialize as a string
pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

/// Deserialize from a number or string
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    Repr::deserialize(deserializer)?.into_decimal()
}

/// Same as the parent module for `Option<Decimal>`
pub mod option {
    use super::*;

    /// Serialize as an optional string
    pub fn serialize<S: Serializer>(value: &Option<Decimal>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize from an optional number or string
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Decimal>, D::Error> {
        Option::<Repr>::deserialize(deserializer)?
            .map(Repr::into_decimal)
            .transpose()
    }
}

/// Same as the parent module for string-keyed maps of decimals
pub mod map {
    use super::*;
    use serde::ser::SerializeMap;

    /// Serialize values as strings
    pub fn serialize<S: Serializer>(
        value: &BTreeMap<String, Decimal>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(value.len()))?;
        for (k, v) in value {
            map.serialize_entry(k, &v.to_string())?;
        }
        map.end()
    }

    /// Deserialize values from numbers or strings
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Decimal>, D::Error> {
        BTreeMap::<String, Repr>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, v)| v.into_decimal().map(|d| (k, d)))
            .collect()
    }
}
