//! Default commission rates by product category

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Category lookup table used when no rule sets a rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryRates {
    /// Rate per lower-cased category
    #[serde(with = "ledger_core::decimal::map")]
    pub rates: BTreeMap<String, Decimal>,

    /// Rate for categories not in the table
    #[serde(with = "ledger_core::decimal")]
    pub fallback: Decimal,
}

impl Default for CategoryRates {
    fn default() -> Self {
        let rates = [
            ("electronics", dec!(0.035)),
            ("fashion", dec!(0.05)),
            ("home", dec!(0.03)),
            ("beauty", dec!(0.04)),
            ("travel", dec!(0.02)),
            ("grocery", dec!(0.01)),
            ("books", dec!(0.015)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            rates,
            fallback: dec!(0.02),
        }
    }
}

impl CategoryRates {
    /// Rate for a category and whether it came from the table
    pub fn lookup(&self, category: &str) -> (Decimal, bool) {
        match self.rates.get(&category.trim().to_ascii_lowercase()) {
            Some(rate) => (*rate, true),
            None => (self.fallback, false),
        }
    }

    /// Rate for a category
    pub fn rate_for(&self, category: &str) -> Decimal {
        self.lookup(category).0
    }

    /// Highest configured rate, fallback included
    pub fn max_rate(&self) -> Decimal {
        self.rates
            .values()
            .copied()
            .fold(self.fallback, Decimal::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let rates = CategoryRates::default();
        assert_eq!(rates.rate_for("electronics"), dec!(0.035));
        assert_eq!(rates.rate_for("Grocery"), dec!(0.01));
        assert!(rates.rate_for("grocery") < rates.rate_for("electronics"));
        assert_eq!(rates.lookup("toys"), (dec!(0.02), false));
        assert_eq!(rates.max_rate(), dec!(0.05));
    }

    #[test]
    fn test_from_toml() {
        let rates: CategoryRates = toml::from_str(
            r#"
            fallback = "0.025"
            [rates]
            electronics = "0.04"
            pharmacy = 0
            "#,
        )
        .unwrap();
        assert_eq!(rates.rate_for("electronics"), dec!(0.04));
        assert_eq!(rates.rate_for("pharmacy"), Decimal::ZERO);
        assert_eq!(rates.rate_for("fashion"), dec!(0.025));
    }
}
