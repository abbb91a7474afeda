//! Fraud detector configuration

use crate::velocity::VelocityConfig;
use ipnet::IpNet;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Points each indicator adds to the score
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorWeights {
    /// Bot-like user agent
    pub bot_user_agent: u8,
    /// Non-residential IP
    pub non_residential_ip: u8,
    /// Time-to-convert below threshold
    pub rapid_conversion: u8,
    /// Click/purchase country mismatch
    pub geo_mismatch: u8,
    /// Velocity limit reached
    pub velocity: u8,
    /// No referring click
    pub missing_click: u8,
    /// High order value
    pub high_value: u8,
}

impl Default for IndicatorWeights {
    fn default() -> Self {
        Self {
            bot_user_agent: 40,
            non_residential_ip: 25,
            rapid_conversion: 30,
            geo_mismatch: 20,
            velocity: 15,
            missing_click: 10,
            high_value: 10,
        }
    }
}

/// Fraud detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    /// Score at or above which a case is opened
    pub review_threshold: u8,

    /// Score at or above which the case is confirmed without review
    pub auto_confirm_threshold: Option<u8>,

    /// Refuse to confirm a transaction while its case is pending
    pub hold_confirmation_during_review: bool,

    /// Seconds between click and purchase below which the conversion is suspicious
    pub rapid_conversion_secs: i64,

    /// Order amount at or above which the high-value indicator fires
    #[serde(with = "ledger_core::decimal")]
    pub high_value_threshold: Decimal,

    /// Case-insensitive user-agent substrings that indicate automation
    pub bot_user_agent_patterns: Vec<String>,

    /// Extra networks treated as non-residential (data centers, known proxies)
    pub blocked_networks: Vec<IpNet>,

    /// Indicator weights
    pub weights: IndicatorWeights,

    /// Conversion velocity limits
    pub velocity: VelocityConfig,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            review_threshold: 50,
            auto_confirm_threshold: None,
            hold_confirmation_during_review: false,
            rapid_conversion_secs: 10,
            high_value_threshold: Decimal::from(50_000),
            bot_user_agent_patterns: [
                "bot", "crawler", "spider", "curl", "wget", "python-requests", "headless",
                "phantomjs", "selenium", "scrapy",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            blocked_networks: Vec::new(),
            weights: IndicatorWeights::default(),
            velocity: VelocityConfig::default(),
        }
    }
}

impl FraudConfig {
    /// Reject inconsistent thresholds
    pub fn validate(&self) -> crate::Result<()> {
        if self.review_threshold > 100 {
            return Err(crate::Error::InvalidConfig(format!(
                "review_threshold {} exceeds 100",
                self.review_threshold
            )));
        }
        if let Some(auto) = self.auto_confirm_threshold {
            if auto < self.review_threshold || auto > 100 {
                return Err(crate::Error::InvalidConfig(format!(
                    "auto_confirm_threshold {} must be within [{}, 100]",
                    auto, self.review_threshold
                )));
            }
        }
        if self.velocity.max_conversions == 0 {
            return Err(crate::Error::InvalidConfig(
                "velocity.max_conversions must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FraudConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.review_threshold, 50);
        assert_eq!(config.weights.bot_user_agent, 40);
    }

    #[test]
    fn test_auto_confirm_below_review_is_rejected() {
        let config = FraudConfig {
            auto_confirm_threshold: Some(30),
            ..FraudConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blocked_networks_from_toml() {
        let config: FraudConfig = toml::from_str(
            r#"
            blocked_networks = ["203.0.113.0/24", "2001:db8::/32"]
            high_value_threshold = 25000
            [weights]
            velocity = 20
            "#,
        )
        .unwrap();
        assert_eq!(config.blocked_networks.len(), 2);
        assert_eq!(config.weights.velocity, 20);
        assert_eq!(config.weights.bot_user_agent, 40);
        assert_eq!(config.high_value_threshold, Decimal::from(25_000));
    }
}
