//! Conversion risk scoring
//!
//! Each indicator is evaluated independently and adds its configured weight;
//! the sum is capped at 100. Scoring reads only the conversion, its click and
//! the velocity window, so it is safe to run concurrently for many items.

use crate::{
    config::FraudConfig,
    types::{FraudAssessment, FraudType, Indicator, IndicatorKind, RiskLevel, RiskScore},
    velocity::VelocityController,
    Result,
};
use chrono::Utc;
use ledger_core::{ClickEvent, ConversionEvent};
use std::net::IpAddr;

/// Scores conversions for fraud risk
#[derive(Debug)]
pub struct FraudDetector {
    config: FraudConfig,
    velocity: VelocityController,
}

impl FraudDetector {
    /// Create new detector
    pub fn new(config: FraudConfig) -> Result<Self> {
        config.validate()?;
        let velocity = VelocityController::new(config.velocity.clone());
        Ok(Self { config, velocity })
    }

    /// Active configuration
    pub fn config(&self) -> &FraudConfig {
        &self.config
    }

    /// Velocity tracker
    pub fn velocity(&self) -> &VelocityController {
        &self.velocity
    }

    /// Score a conversion against its referring click, if known
    pub fn assess(&self, conversion: &ConversionEvent, click: Option<&ClickEvent>) -> FraudAssessment {
        let weights = &self.config.weights;
        let mut indicators = Vec::new();

        if let Some(agent) = conversion
            .user_agent
            .as_deref()
            .or_else(|| click.and_then(|c| c.user_agent.as_deref()))
        {
            if let Some(pattern) = self.bot_pattern(agent) {
                indicators.push(Indicator {
                    kind: IndicatorKind::BotUserAgent,
                    weight: weights.bot_user_agent,
                    detail: format!("user agent matches '{}'", pattern),
                });
            }
        }

        if let Some(ip) = conversion.ip.or_else(|| click.and_then(|c| c.ip)) {
            if self.is_non_residential(ip) {
                indicators.push(Indicator {
                    kind: IndicatorKind::NonResidentialIp,
                    weight: weights.non_residential_ip,
                    detail: format!("{} is not a residential address", ip),
                });
            }
        }

        match click {
            Some(click) => {
                let elapsed = conversion.occurred_at - click.clicked_at;
                if elapsed.num_seconds() < self.config.rapid_conversion_secs {
                    indicators.push(Indicator {
                        kind: IndicatorKind::RapidConversion,
                        weight: weights.rapid_conversion,
                        detail: format!(
                            "converted {}s after click (threshold {}s)",
                            elapsed.num_seconds(),
                            self.config.rapid_conversion_secs
                        ),
                    });
                }

                if let (Some(click_country), Some(order_country)) =
                    (click.country.as_deref(), conversion.country.as_deref())
                {
                    if !click_country.eq_ignore_ascii_case(order_country) {
                        indicators.push(Indicator {
                            kind: IndicatorKind::GeoMismatch,
                            weight: weights.geo_mismatch,
                            detail: format!("click from {} but order from {}", click_country, order_country),
                        });
                    }
                }
            }
            None => indicators.push(Indicator {
                kind: IndicatorKind::MissingClick,
                weight: weights.missing_click,
                detail: match &conversion.click_id {
                    Some(id) => format!("click {} is not on record", id),
                    None => "conversion carries no click id".to_string(),
                },
            }),
        }

        if self.velocity.exceeds_limit(&conversion.user_id, Utc::now()) {
            indicators.push(Indicator {
                kind: IndicatorKind::Velocity,
                weight: weights.velocity,
                detail: format!(
                    "more than {} conversions in {} minutes",
                    self.config.velocity.max_conversions, self.config.velocity.window_minutes
                ),
            });
        }

        if conversion.order_amount >= self.config.high_value_threshold {
            indicators.push(Indicator {
                kind: IndicatorKind::HighValue,
                weight: weights.high_value,
                detail: format!(
                    "order amount {} at or above {}",
                    conversion.order_amount, self.config.high_value_threshold
                ),
            });
        }

        let total: u32 = indicators.iter().map(|i| u32::from(i.weight)).sum();
        let score = RiskScore::new(total);
        let fraud_type = indicators
            .iter()
            .max_by_key(|i| i.weight)
            .map(|i| FraudType::from(i.kind));
        let requires_review = score.score() >= self.config.review_threshold;
        let auto_confirm = self
            .config
            .auto_confirm_threshold
            .map_or(false, |t| score.score() >= t);

        if requires_review {
            tracing::warn!(
                transaction_id = %conversion.transaction_id,
                user_id = %conversion.user_id,
                score = score.score(),
                indicators = ?indicators.iter().map(|i| i.kind.as_str()).collect::<Vec<_>>(),
                "Conversion flagged for fraud review"
            );
        }

        FraudAssessment {
            transaction_id: conversion.transaction_id.clone(),
            score,
            level: RiskLevel::from(score),
            indicators,
            fraud_type,
            requires_review,
            auto_confirm,
            assessed_at: Utc::now(),
        }
    }

    /// Count an accepted conversion toward the user's velocity window
    pub fn record_conversion(&self, conversion: &ConversionEvent) {
        self.velocity
            .record(&conversion.user_id, &conversion.transaction_id, conversion.occurred_at);
    }

    fn bot_pattern(&self, user_agent: &str) -> Option<&str> {
        let agent = user_agent.to_ascii_lowercase();
        self.config
            .bot_user_agent_patterns
            .iter()
            .find(|p| !p.is_empty() && agent.contains(&p.to_ascii_lowercase()))
            .map(String::as_str)
    }

    /// Loopback, private, link-local, unspecified, documentation or blocked
    pub fn is_non_residential(&self, ip: IpAddr) -> bool {
        if self.config.blocked_networks.iter().any(|net| net.contains(&ip)) {
            return true;
        }
        match ip {
            IpAddr::V4(v4) => {
                v4.is_loopback()
                    || v4.is_private()
                    || v4.is_link_local()
                    || v4.is_unspecified()
                    || v4.is_documentation()
                    || v4.is_broadcast()
            }
            IpAddr::V6(v6) => {
                let first = v6.segments()[0];
                v6.is_loopback()
                    || v6.is_unspecified()
                    // fc00::/7 unique local
                    || (first & 0xfe00) == 0xfc00
                    // fe80::/10 link local
                    || (first & 0xffc0) == 0xfe80
                    // 2001:db8::/32 documentation
                    || (first == 0x2001 && v6.segments()[1] == 0x0db8)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ledger_core::{Currency, Metadata, TransactionStatus, UserId};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn conversion() -> ConversionEvent {
        ConversionEvent {
            id: Uuid::now_v7(),
            transaction_id: "T1".to_string(),
            user_id: UserId::new("U1"),
            click_id: Some("C1".to_string()),
            order_id: None,
            affiliate_id: None,
            store: "flipkart".to_string(),
            category: "electronics".to_string(),
            order_amount: Decimal::from(4500),
            currency: Currency::INR,
            commission_rate: Decimal::new(35, 3),
            commission: Decimal::new(1575, 1),
            cashback: Decimal::new(1575, 1),
            products: vec![],
            country: Some("IN".to_string()),
            user_agent: Some("Mozilla/5.0 (Linux; Android 14)".to_string()),
            ip: Some("49.36.10.20".parse().unwrap()),
            status: TransactionStatus::Pending,
            occurred_at: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    fn click() -> ClickEvent {
        ClickEvent {
            click_id: "C1".to_string(),
            user_id: UserId::new("U1"),
            source: "telegram".to_string(),
            destination_url: "https://www.flipkart.com/".to_string(),
            user_agent: Some("Mozilla/5.0 (Linux; Android 14)".to_string()),
            ip: Some("49.36.10.20".parse().unwrap()),
            country: Some("IN".to_string()),
            clicked_at: Utc::now() - Duration::hours(2),
        }
    }

    #[test]
    fn test_clean_conversion_scores_zero() {
        let detector = FraudDetector::new(FraudConfig::default()).unwrap();
        let assessment = detector.assess(&conversion(), Some(&click()));

        assert_eq!(assessment.score.score(), 0);
        assert!(assessment.indicators.is_empty());
        assert!(!assessment.requires_review);
        assert_eq!(assessment.fraud_type, None);
    }

    #[test]
    fn test_bot_from_loopback_is_flagged() {
        let detector = FraudDetector::new(FraudConfig::default()).unwrap();
        let mut conv = conversion();
        conv.user_agent = Some("python-requests/2.31".to_string());
        conv.ip = Some("127.0.0.1".parse().unwrap());

        let assessment = detector.assess(&conv, Some(&click()));
        assert_eq!(assessment.score.score(), 65);
        assert!(assessment.requires_review);
        assert_eq!(assessment.fraud_type, Some(FraudType::BotTraffic));
    }

    #[test]
    fn test_rapid_and_geo_mismatch() {
        let detector = FraudDetector::new(FraudConfig::default()).unwrap();
        let mut c = click();
        c.clicked_at = Utc::now() - Duration::seconds(2);
        c.country = Some("US".to_string());

        let assessment = detector.assess(&conversion(), Some(&c));
        let kinds: Vec<_> = assessment.indicators.iter().map(|i| i.kind).collect();
        assert!(kinds.contains(&IndicatorKind::RapidConversion));
        assert!(kinds.contains(&IndicatorKind::GeoMismatch));
        assert_eq!(assessment.score.score(), 50);
        assert_eq!(assessment.fraud_type, Some(FraudType::ClickInjection));
    }

    #[test]
    fn test_missing_click_and_high_value() {
        let detector = FraudDetector::new(FraudConfig::default()).unwrap();
        let mut conv = conversion();
        conv.order_amount = Decimal::from(75_000);

        let assessment = detector.assess(&conv, None);
        assert_eq!(assessment.score.score(), 20);
        assert!(!assessment.requires_review);
    }

    #[test]
    fn test_score_is_capped() {
        let detector = FraudDetector::new(FraudConfig::default()).unwrap();
        let mut conv = conversion();
        conv.user_agent = Some("HeadlessChrome".to_string());
        conv.ip = Some("10.0.0.4".parse().unwrap());
        conv.country = Some("BR".to_string());
        conv.order_amount = Decimal::from(90_000);
        let mut c = click();
        c.clicked_at = Utc::now();

        let assessment = detector.assess(&conv, Some(&c));
        assert_eq!(assessment.score.score(), 100);
        assert_eq!(assessment.level, RiskLevel::High);
    }

    #[test]
    fn test_blocked_network() {
        let config = FraudConfig {
            blocked_networks: vec!["49.36.0.0/16".parse().unwrap()],
            ..FraudConfig::default()
        };
        let detector = FraudDetector::new(config).unwrap();
        assert!(detector.is_non_residential("49.36.10.20".parse().unwrap()));
        assert!(detector.is_non_residential("fd00::1".parse().unwrap()));
        assert!(!detector.is_non_residential("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_velocity_indicator_after_limit() {
        let mut config = FraudConfig::default();
        config.velocity.max_conversions = 2;
        let detector = FraudDetector::new(config).unwrap();

        for i in 0..2 {
            let mut conv = conversion();
            conv.transaction_id = format!("T{i}");
            detector.record_conversion(&conv);
        }

        let assessment = detector.assess(&conversion(), Some(&click()));
        assert_eq!(assessment.indicators[0].kind, IndicatorKind::Velocity);
        assert_eq!(assessment.score.score(), 15);
    }

    proptest::proptest! {
        #[test]
        fn prop_score_never_exceeds_100(
            bot in 0u8..=255,
            ip in 0u8..=255,
            rapid in 0u8..=255,
            high in 0u8..=255,
        ) {
            let config = FraudConfig {
                weights: crate::config::IndicatorWeights {
                    bot_user_agent: bot,
                    non_residential_ip: ip,
                    rapid_conversion: rapid,
                    high_value: high,
                    ..Default::default()
                },
                ..FraudConfig::default()
            };
            let detector = FraudDetector::new(config).unwrap();
            let mut conv = conversion();
            conv.user_agent = Some("Googlebot/2.1".to_string());
            conv.ip = Some("192.168.1.5".parse().unwrap());
            conv.order_amount = Decimal::from(60_000);
            let mut c = click();
            c.clicked_at = Utc::now();

            let assessment = detector.assess(&conv, Some(&c));
            let expected = (u32::from(bot) + u32::from(ip) + u32::from(rapid) + u32::from(high)).min(100);
            proptest::prop_assert_eq!(u32::from(assessment.score.score()), expected);
        }
    }
}
