//! Rule engine configuration

use crate::{rates::CategoryRates, types::ConversionRule, types::RulePolicy, Error, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Rule engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleEngineConfig {
    /// How multiple matching rules combine
    pub policy: RulePolicy,

    /// Upper bound for any commission rate
    #[serde(with = "ledger_core::decimal")]
    pub max_rate: Decimal,

    /// Fraction of the commission passed to the user as cashback
    #[serde(with = "ledger_core::decimal")]
    pub user_share: Decimal,

    /// Category defaults
    pub category_rates: CategoryRates,

    /// Inline rules
    pub rules: Vec<ConversionRule>,

    /// Additional rules file (`.toml` with `[[rules]]` or `.json` array)
    pub rules_file: Option<PathBuf>,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            policy: RulePolicy::HighestPriorityWins,
            max_rate: dec!(0.25),
            user_share: Decimal::ONE,
            category_rates: CategoryRates::default(),
            rules: Vec::new(),
            rules_file: None,
        }
    }
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<ConversionRule>,
}

impl RuleEngineConfig {
    /// Inline rules plus those from `rules_file`, if set
    pub fn all_rules(&self) -> Result<Vec<ConversionRule>> {
        let mut rules = self.rules.clone();
        if let Some(path) = &self.rules_file {
            rules.extend(load_rules(path)?);
        }
        Ok(rules)
    }
}

/// Load rules from a TOML or JSON file
pub fn load_rules(path: impl AsRef<Path>) -> Result<Vec<ConversionRule>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;

    let rules = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str::<Vec<ConversionRule>>(&content)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?,
        _ => {
            toml::from_str::<RuleFile>(&content)
                .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?
                .rules
        }
    };

    tracing::info!(path = %path.display(), count = rules.len(), "Loaded conversion rules");
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;

    #[test]
    fn test_defaults() {
        let config = RuleEngineConfig::default();
        assert_eq!(config.policy, RulePolicy::HighestPriorityWins);
        assert_eq!(config.max_rate, dec!(0.25));
        assert_eq!(config.user_share, Decimal::ONE);
    }

    #[test]
    fn test_rules_from_toml() {
        let config: RuleEngineConfig = toml::from_str(
            r#"
            policy = "cumulative"
            user_share = "0.8"

            [[rules]]
            id = "weekend"
            name = "Weekend boost"
            priority = 5
            actions = [{ type = "multiply_rate", factor = "1.5" }]

            [[rules.conditions]]
            field = "metadata.campaign"
            operator = "equals"
            value = "weekend"
            "#,
        )
        .unwrap();

        assert_eq!(config.policy, RulePolicy::Cumulative);
        assert_eq!(config.user_share, dec!(0.8));
        assert_eq!(config.rules.len(), 1);
        assert_eq!(
            config.rules[0].actions[0],
            Action::MultiplyRate { factor: dec!(1.5) }
        );
    }

    #[test]
    fn test_load_rules_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"[{"id": "r1", "name": "Books", "actions": [{"type": "set_commission_rate", "rate": 0.02}]}]"#,
        )
        .unwrap();

        let config = RuleEngineConfig {
            rules_file: Some(path),
            ..RuleEngineConfig::default()
        };
        let rules = config.all_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "r1");
    }
}
