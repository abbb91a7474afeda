//! Core types for fraud detection

use chrono::{DateTime, Utc};
use ledger_core::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Risk score (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct RiskScore(u8);

impl RiskScore {
    /// Create new risk score, capped at 100
    pub fn new(score: u32) -> Self {
        Self(score.min(100) as u8)
    }

    /// Get raw score
    pub fn score(&self) -> u8 {
        self.0
    }

    /// Check if high risk (>= 75)
    pub fn is_high_risk(&self) -> bool {
        self.0 >= 75
    }

    /// Check if medium risk (50-74)
    pub fn is_medium_risk(&self) -> bool {
        (50..75).contains(&self.0)
    }

    /// Check if low risk (< 50)
    pub fn is_low_risk(&self) -> bool {
        self.0 < 50
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Low risk
    Low,
    /// Medium risk
    Medium,
    /// High risk
    High,
}

impl From<RiskScore> for RiskLevel {
    fn from(score: RiskScore) -> Self {
        if score.is_high_risk() {
            RiskLevel::High
        } else if score.is_medium_risk() {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// A behavioral or technical signal that contributed to a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    /// User agent looks like automation
    BotUserAgent,
    /// Loopback, private, reserved or blocked network
    NonResidentialIp,
    /// Purchase followed the click implausibly fast
    RapidConversion,
    /// Click and purchase came from different countries
    GeoMismatch,
    /// Too many conversions for the user in the window
    Velocity,
    /// No referring click on record
    MissingClick,
    /// Order value above the review threshold
    HighValue,
}

impl IndicatorKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::BotUserAgent => "bot_user_agent",
            IndicatorKind::NonResidentialIp => "non_residential_ip",
            IndicatorKind::RapidConversion => "rapid_conversion",
            IndicatorKind::GeoMismatch => "geo_mismatch",
            IndicatorKind::Velocity => "velocity",
            IndicatorKind::MissingClick => "missing_click",
            IndicatorKind::HighValue => "high_value",
        }
    }
}

/// A triggered indicator and what it added to the score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    /// Which signal fired
    pub kind: IndicatorKind,
    /// Points contributed
    pub weight: u8,
    /// Human-readable detail
    pub detail: String,
}

/// Classification of a suspected fraud
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudType {
    /// Automated clicks or purchases
    BotTraffic,
    /// Traffic via proxies, data centers or blocked ranges
    ProxyTraffic,
    /// Click injected right before an organic purchase
    ClickInjection,
    /// Location inconsistency between click and purchase
    GeoMismatch,
    /// Conversion bursts from one user
    VelocityAbuse,
    /// Anything else worth a look
    Suspicious,
}

impl From<IndicatorKind> for FraudType {
    fn from(kind: IndicatorKind) -> Self {
        match kind {
            IndicatorKind::BotUserAgent => FraudType::BotTraffic,
            IndicatorKind::NonResidentialIp => FraudType::ProxyTraffic,
            IndicatorKind::RapidConversion => FraudType::ClickInjection,
            IndicatorKind::GeoMismatch => FraudType::GeoMismatch,
            IndicatorKind::Velocity => FraudType::VelocityAbuse,
            IndicatorKind::MissingClick | IndicatorKind::HighValue => FraudType::Suspicious,
        }
    }
}

/// How a case was raised or resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Scored by the detector
    Automated,
    /// Raised or resolved by an analyst
    Manual,
}

/// Fraud case status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudStatus {
    /// Awaiting review
    Pending,
    /// Fraud confirmed; associated cashback is cancelled
    ConfirmedFraud,
    /// Reviewed and found legitimate
    Cleared,
}

impl FraudStatus {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            FraudStatus::Pending => "pending",
            FraudStatus::ConfirmedFraud => "confirmed_fraud",
            FraudStatus::Cleared => "cleared",
        }
    }
}

impl fmt::Display for FraudStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of scoring one conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAssessment {
    /// Partner transaction id
    pub transaction_id: String,

    /// Risk score
    pub score: RiskScore,

    /// Risk level
    pub level: RiskLevel,

    /// Indicators that fired
    pub indicators: Vec<Indicator>,

    /// Dominant classification, if anything fired
    pub fraud_type: Option<FraudType>,

    /// Score crossed the review threshold
    pub requires_review: bool,

    /// Score crossed the automatic-confirmation threshold
    pub auto_confirm: bool,

    /// Assessment timestamp
    pub assessed_at: DateTime<Utc>,
}

/// A conversion flagged for review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudCase {
    /// Case id
    pub id: Uuid,
    /// Conversion id
    pub conversion_id: Uuid,
    /// Partner transaction id
    pub transaction_id: String,
    /// Referring click, if any
    pub click_id: Option<String>,
    /// User
    pub user_id: UserId,
    /// Classification
    pub fraud_type: FraudType,
    /// Score at detection
    pub risk_score: RiskScore,
    /// Indicators at detection
    pub indicators: Vec<Indicator>,
    /// How it was raised
    pub detection_method: DetectionMethod,
    /// Current status
    pub status: FraudStatus,
    /// Who resolved it
    pub reviewer: Option<String>,
    /// Resolution notes
    pub notes: Option<String>,
    /// Opened at
    pub created_at: DateTime<Utc>,
    /// Resolved at
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Analyst verdict on a pending case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// It is fraud
    ConfirmFraud,
    /// It is legitimate
    Clear,
}

impl ReviewDecision {
    /// Status the case moves to
    pub fn target_status(&self) -> FraudStatus {
        match self {
            ReviewDecision::ConfirmFraud => FraudStatus::ConfirmedFraud,
            ReviewDecision::Clear => FraudStatus::Cleared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_score_caps_at_100() {
        assert_eq!(RiskScore::new(250).score(), 100);
        assert_eq!(RiskLevel::from(RiskScore::new(80)), RiskLevel::High);
        assert_eq!(RiskLevel::from(RiskScore::new(50)), RiskLevel::Medium);
        assert_eq!(RiskLevel::from(RiskScore::new(10)), RiskLevel::Low);
    }

    #[test]
    fn test_fraud_type_from_indicator() {
        assert_eq!(FraudType::from(IndicatorKind::BotUserAgent), FraudType::BotTraffic);
        assert_eq!(FraudType::from(IndicatorKind::HighValue), FraudType::Suspicious);
    }
}
