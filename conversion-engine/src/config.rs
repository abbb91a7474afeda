//! Engine configuration
//!
//! One TOML document with a table per component; every table and field is
//! optional and falls back to its default.

use crate::{intake::IntakeConfig, scheduler::SchedulerConfig, Error, Result};
use attribution::{AttributionConfig, ModelKind};
use fraud_detector::FraudConfig;
use ledger_core::{StorageBackend, StorageConfig};
use payout::WithdrawalConfig;
use rule_engine::RuleEngineConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use webhook_adapter::WebhookConfig;

/// Cashback engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ledger storage
    pub storage: StorageConfig,

    /// Intake validation
    pub intake: IntakeConfig,

    /// Fraud scoring and review policy
    pub fraud: FraudConfig,

    /// Commission rates and rules
    pub rules: RuleEngineConfig,

    /// Attribution model and window
    pub attribution: AttributionConfig,

    /// Withdrawals and payout rail
    pub withdrawal: WithdrawalConfig,

    /// Webhook retry and dead-letter policy
    pub webhook: WebhookConfig,

    /// Background tasks
    pub scheduler: SchedulerConfig,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}: invalid value '{}': {}", name, value, e)))
}

impl EngineConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables (`CASHBACK_*`) over the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = EngineConfig::default();

        if let Some(dir) = env_var("CASHBACK_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(dir);
            config.storage.backend = StorageBackend::RocksDb;
        }

        if let Some(backend) = env_var("CASHBACK_STORAGE_BACKEND") {
            config.storage.backend = match backend.trim().to_ascii_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "rocksdb" | "rocks_db" => StorageBackend::RocksDb,
                other => {
                    return Err(Error::Config(format!(
                        "CASHBACK_STORAGE_BACKEND: unknown backend '{}'",
                        other
                    )))
                }
            };
        }

        if let Some(amount) = env_var("CASHBACK_MIN_ORDER_AMOUNT") {
            config.intake.min_order_amount = parse_env("CASHBACK_MIN_ORDER_AMOUNT", &amount)?;
        }

        if let Some(amount) = env_var("CASHBACK_MIN_WITHDRAWAL") {
            config.withdrawal.minimum_amount = parse_env("CASHBACK_MIN_WITHDRAWAL", &amount)?;
        }

        if let Some(auto) = env_var("CASHBACK_AUTO_VERIFY") {
            config.withdrawal.auto_verify = parse_env("CASHBACK_AUTO_VERIFY", &auto)?;
        }

        if let Some(threshold) = env_var("CASHBACK_FRAUD_THRESHOLD") {
            config.fraud.review_threshold = parse_env("CASHBACK_FRAUD_THRESHOLD", &threshold)?;
        }

        if let Some(hold) = env_var("CASHBACK_HOLD_DURING_REVIEW") {
            config.fraud.hold_confirmation_during_review =
                parse_env("CASHBACK_HOLD_DURING_REVIEW", &hold)?;
        }

        if let Some(model) = env_var("CASHBACK_ATTRIBUTION_MODEL") {
            config.attribution.model = parse_env::<ModelKind>("CASHBACK_ATTRIBUTION_MODEL", &model)?;
        }

        if let Some(path) = env_var("CASHBACK_RULES_FILE") {
            config.rules.rules_file = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every component's configuration
    pub fn validate(&self) -> Result<()> {
        if self.intake.min_order_amount < rust_decimal::Decimal::ZERO {
            return Err(Error::Config(format!(
                "intake.min_order_amount {} must not be negative",
                self.intake.min_order_amount
            )));
        }
        self.fraud.validate()?;
        self.attribution.validate()?;
        self.withdrawal.validate()?;
        self.webhook.validate().map_err(Error::Config)?;
        self.scheduler.validate().map_err(Error::Config)?;
        Ok(())
    }
}
