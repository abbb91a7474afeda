//! Fraud case repository and review workflow

use crate::{
    types::{
        DetectionMethod, FraudAssessment, FraudCase, FraudStatus, FraudType, ReviewDecision,
    },
    Error, Result,
};
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use ledger_core::{ConversionEvent, UserId};
use uuid::Uuid;

/// In-memory fraud case store, one case per transaction
#[derive(Debug, Default)]
pub struct FraudCaseStore {
    cases: DashMap<Uuid, FraudCase>,
    by_transaction: DashMap<String, Uuid>,
}

impl FraudCaseStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a case for a flagged conversion.
    ///
    /// Automatic confirmation opens the case directly as `confirmed_fraud`.
    /// A second call for the same transaction returns the existing case.
    pub fn open(&self, conversion: &ConversionEvent, assessment: &FraudAssessment) -> FraudCase {
        match self.by_transaction.entry(conversion.transaction_id.clone()) {
            Entry::Occupied(mut existing) => {
                if let Some(case) = self.cases.get(existing.get()) {
                    return case.value().clone();
                }
                let case = new_case(conversion, assessment);
                self.cases.insert(case.id, case.clone());
                existing.insert(case.id);
                case
            }
            Entry::Vacant(slot) => {
                let case = new_case(conversion, assessment);
                self.cases.insert(case.id, case.clone());
                slot.insert(case.id);

                tracing::info!(
                    case_id = %case.id,
                    transaction_id = %case.transaction_id,
                    score = case.risk_score.score(),
                    status = %case.status,
                    "Opened fraud case"
                );
                case
            }
        }
    }

    /// Get case
    pub fn get(&self, id: Uuid) -> Result<FraudCase> {
        self.cases
            .get(&id)
            .map(|c| c.value().clone())
            .ok_or(Error::CaseNotFound(id))
    }

    /// Case for a transaction, if one was opened
    pub fn find_by_transaction(&self, transaction_id: &str) -> Option<FraudCase> {
        let id = *self.by_transaction.get(transaction_id)?.value();
        self.cases.get(&id).map(|c| c.value().clone())
    }

    /// Whether the transaction has a case still awaiting review
    pub fn has_pending_case(&self, transaction_id: &str) -> bool {
        self.find_by_transaction(transaction_id)
            .map_or(false, |c| c.status == FraudStatus::Pending)
    }

    /// Cases, optionally filtered by status and user, oldest first
    pub fn list(&self, status: Option<FraudStatus>, user_id: Option<&UserId>) -> Vec<FraudCase> {
        let mut cases: Vec<FraudCase> = self
            .cases
            .iter()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .filter(|c| user_id.map_or(true, |u| &c.user_id == u))
            .map(|c| c.value().clone())
            .collect();
        cases.sort_by_key(|c| c.created_at);
        cases
    }

    /// Resolve a pending case
    pub fn resolve(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<FraudCase> {
        let mut case = self.cases.get_mut(&id).ok_or(Error::CaseNotFound(id))?;
        if case.status != FraudStatus::Pending {
            return Err(Error::CaseAlreadyResolved {
                id,
                status: case.status.to_string(),
            });
        }

        case.status = decision.target_status();
        case.detection_method = DetectionMethod::Manual;
        case.reviewer = Some(reviewer.to_string());
        case.notes = notes;
        case.resolved_at = Some(Utc::now());

        tracing::info!(
            case_id = %id,
            transaction_id = %case.transaction_id,
            status = %case.status,
            reviewer,
            "Resolved fraud case"
        );
        Ok(case.clone())
    }

    /// Drop a case whose conversion never reached the ledger
    pub fn discard(&self, id: Uuid) -> Option<FraudCase> {
        let (_, case) = self.cases.remove(&id)?;
        self.by_transaction
            .remove_if(&case.transaction_id, |_, mapped| *mapped == id);
        tracing::debug!(case_id = %id, transaction_id = %case.transaction_id, "Discarded fraud case");
        Some(case)
    }

    /// Number of cases per status
    pub fn count(&self, status: FraudStatus) -> usize {
        self.cases.iter().filter(|c| c.status == status).count()
    }
}

fn new_case(conversion: &ConversionEvent, assessment: &FraudAssessment) -> FraudCase {
    let now = Utc::now();
    let (status, resolved_at) = if assessment.auto_confirm {
        (FraudStatus::ConfirmedFraud, Some(now))
    } else {
        (FraudStatus::Pending, None)
    };

    FraudCase {
        id: Uuid::now_v7(),
        conversion_id: conversion.id,
        transaction_id: conversion.transaction_id.clone(),
        click_id: conversion.click_id.clone(),
        user_id: conversion.user_id.clone(),
        fraud_type: assessment.fraud_type.unwrap_or(FraudType::Suspicious),
        risk_score: assessment.score,
        indicators: assessment.indicators.clone(),
        detection_method: DetectionMethod::Automated,
        status,
        reviewer: None,
        notes: None,
        created_at: now,
        resolved_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Indicator, IndicatorKind, RiskLevel, RiskScore};
    use ledger_core::{Currency, Metadata, TransactionStatus};
    use rust_decimal::Decimal;

    fn conversion(tx: &str) -> ConversionEvent {
        ConversionEvent {
            id: Uuid::now_v7(),
            transaction_id: tx.to_string(),
            user_id: UserId::new("U1"),
            click_id: None,
            order_id: None,
            affiliate_id: None,
            store: "myntra".to_string(),
            category: "fashion".to_string(),
            order_amount: Decimal::from(2000),
            currency: Currency::INR,
            commission_rate: Decimal::new(5, 2),
            commission: Decimal::from(100),
            cashback: Decimal::from(100),
            products: vec![],
            country: None,
            user_agent: None,
            ip: None,
            status: TransactionStatus::Pending,
            occurred_at: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    fn assessment(tx: &str, auto_confirm: bool) -> FraudAssessment {
        FraudAssessment {
            transaction_id: tx.to_string(),
            score: RiskScore::new(65),
            level: RiskLevel::Medium,
            indicators: vec![Indicator {
                kind: IndicatorKind::BotUserAgent,
                weight: 40,
                detail: "user agent matches 'bot'".to_string(),
            }],
            fraud_type: Some(FraudType::BotTraffic),
            requires_review: true,
            auto_confirm,
            assessed_at: Utc::now(),
        }
    }

    #[test]
    fn test_open_is_idempotent_per_transaction() {
        let store = FraudCaseStore::new();
        let first = store.open(&conversion("T1"), &assessment("T1", false));
        let second = store.open(&conversion("T1"), &assessment("T1", false));

        assert_eq!(first.id, second.id);
        assert_eq!(store.list(None, None).len(), 1);
        assert!(store.has_pending_case("T1"));
    }

    #[test]
    fn test_resolve_pending_case() {
        let store = FraudCaseStore::new();
        let case = store.open(&conversion("T1"), &assessment("T1", false));

        let resolved = store
            .resolve(case.id, ReviewDecision::Clear, "analyst@ops", Some("known customer".into()))
            .unwrap();
        assert_eq!(resolved.status, FraudStatus::Cleared);
        assert_eq!(resolved.detection_method, DetectionMethod::Manual);
        assert!(!store.has_pending_case("T1"));

        let err = store
            .resolve(case.id, ReviewDecision::ConfirmFraud, "analyst@ops", None)
            .unwrap_err();
        assert!(matches!(err, Error::CaseAlreadyResolved { .. }));
    }

    #[test]
    fn test_auto_confirmed_case() {
        let store = FraudCaseStore::new();
        let case = store.open(&conversion("T2"), &assessment("T2", true));

        assert_eq!(case.status, FraudStatus::ConfirmedFraud);
        assert!(case.resolved_at.is_some());
        assert_eq!(store.count(FraudStatus::ConfirmedFraud), 1);
        assert_eq!(store.list(Some(FraudStatus::Pending), None).len(), 0);
    }

    #[test]
    fn test_discard_frees_transaction() {
        let store = FraudCaseStore::new();
        let case = store.open(&conversion("T3"), &assessment("T3", false));

        let discarded = store.discard(case.id).unwrap();
        assert_eq!(discarded.transaction_id, "T3");
        assert!(store.find_by_transaction("T3").is_none());
        assert!(!store.has_pending_case("T3"));
        assert!(store.list(None, None).is_empty());
        assert!(store.discard(case.id).is_none());

        // A later delivery gets a fresh case
        let reopened = store.open(&conversion("T3"), &assessment("T3", false));
        assert_ne!(reopened.id, case.id);
    }

    #[test]
    fn test_unknown_case() {
        let store = FraudCaseStore::new();
        assert!(matches!(store.get(Uuid::now_v7()), Err(Error::CaseNotFound(_))));
    }
}
