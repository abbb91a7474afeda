//! Cashback service facade
//!
//! Wires intake, fraud scoring, the rule engine, attribution, the ledger,
//! withdrawals and the webhook adapter behind one API. Every operation
//! reports [`ledger_core::Error`]; routine rejections (below-minimum orders,
//! blank ids) are values, not errors.

use crate::{
    analytics::{self, Analytics, DateRange},
    clicks::ClickRegistry,
    config::EngineConfig,
    intake::{self, IntakeConfig, IntakeOutcome, Rejection},
    metrics::EngineMetrics,
    Result as EngineResult,
};
use async_trait::async_trait;
use attribution::{AttributionCalculator, AttributionRecord, ModelKind};
use chrono::{DateTime, Utc};
use fraud_detector::{FraudCase, FraudCaseStore, FraudDetector, FraudStatus, ReviewDecision};
use futures::stream::{self, StreamExt};
use ledger_core::{
    CashbackAccount, CashbackLedger, CashbackTransaction, ClickEvent, Error, LedgerNotification,
    LedgerStore, LogNotifier, Metadata, Notifier, Opened, PaymentMethod, PaymentMethodKind, Result,
    StatusUpdate, TrackEvent, TransactionStatus, Transition, Upsert, UserId, WithdrawalRequest,
    WithdrawalStatus,
};
use payout::{PayoutRail, ReconcileReport, SimulatedRail, WithdrawalProcessor};
use rule_engine::{RateSource, RuleEngine};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use webhook_adapter::{
    CommandExecutor, CommandOutcome, EventKind, LedgerCommand, RetryReport, WebhookAdapter,
    WebhookEnvelope, WebhookOutcome,
};

/// One failed item of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    /// Position in the submitted batch
    pub index: usize,
    /// Transaction id as submitted
    pub transaction_id: String,
    /// Why it failed
    pub reason: String,
}

/// Result of batch ingestion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Items that produced (or found) a transaction
    pub processed: usize,
    /// Items rejected or failed
    pub failed: usize,
    /// Failure details, in batch order
    pub failures: Vec<BatchFailure>,
}

/// Cashback engine service
pub struct CashbackService {
    ledger: Arc<CashbackLedger>,
    intake: IntakeConfig,
    fraud: FraudDetector,
    cases: FraudCaseStore,
    rules: RuleEngine,
    attribution: AttributionCalculator,
    withdrawals: WithdrawalProcessor,
    webhooks: WebhookAdapter,
    clicks: ClickRegistry,
    metrics: EngineMetrics,
}

impl std::fmt::Debug for CashbackService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CashbackService")
            .field("intake", &self.intake)
            .field("withdrawals", &self.withdrawals)
            .finish_non_exhaustive()
    }
}

fn rate_source_label(source: &RateSource) -> String {
    match source {
        RateSource::Category(category) => format!("category:{}", category),
        RateSource::Fallback => "fallback".to_string(),
        RateSource::Rule(id) => format!("rule:{}", id),
    }
}

fn case_metadata(case: &FraudCase) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("fraud_case_id".to_string(), case.id.to_string());
    metadata
}

impl CashbackService {
    /// Assemble a service over explicit collaborators
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn Notifier>,
        rail: Arc<dyn PayoutRail>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let ledger = Arc::new(CashbackLedger::new(store, notifier));
        let withdrawals = WithdrawalProcessor::new(ledger.clone(), rail, config.withdrawal.clone())?;

        Ok(Self {
            ledger,
            intake: config.intake.clone(),
            fraud: FraudDetector::new(config.fraud.clone())?,
            cases: FraudCaseStore::new(),
            rules: RuleEngine::new(config.rules.clone())?,
            attribution: AttributionCalculator::new(&config.attribution)?,
            withdrawals,
            webhooks: WebhookAdapter::new(config.webhook.clone()),
            clicks: ClickRegistry::new(),
            metrics: EngineMetrics::new()?,
        })
    }

    /// Assemble from configuration: configured store, log notifier, simulated rail
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let store = config.storage.open_store()?;
        let rail = Arc::new(SimulatedRail::new(&config.withdrawal.simulated_rail));
        Self::new(config, store, Arc::new(LogNotifier), rail)
    }

    /// Ledger
    pub fn ledger(&self) -> &CashbackLedger {
        &self.ledger
    }

    /// Metrics
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Webhook adapter (retry and dead-letter queues)
    pub fn webhooks(&self) -> &WebhookAdapter {
        &self.webhooks
    }

    // ===== Clicks & conversions =====

    /// Record a link click
    pub fn record_click(&self, click: ClickEvent) -> Result<ClickEvent> {
        self.clicks.record(click)
    }

    /// Track a conversion; `None` when no transaction was created or found
    pub fn track_event(&self, event: TrackEvent) -> Result<Option<CashbackTransaction>> {
        Ok(self.track(event)?.into_transaction())
    }

    /// Track a conversion, reporting how it was handled
    pub fn track(&self, event: TrackEvent) -> Result<IntakeOutcome> {
        let result = self.track_inner(event);
        match &result {
            Ok(outcome) => self.metrics.record_conversion(outcome.label()),
            Err(_) => self.metrics.record_conversion("error"),
        }
        result
    }

    fn track_inner(&self, event: TrackEvent) -> Result<IntakeOutcome> {
        let mut conversion = match intake::normalize(&self.intake, event, Utc::now()) {
            Ok(conversion) => conversion,
            Err(rejection) => {
                warn!(reason = %rejection, "Conversion rejected at intake");
                return Ok(IntakeOutcome::Rejected(rejection));
            }
        };

        // Fast path only; the ledger's insert-if-absent is the guarantee
        if let Some(existing) = self.ledger.find_transaction(&conversion.transaction_id)? {
            debug!(transaction_id = %existing.transaction_id, "Duplicate conversion");
            return Ok(IntakeOutcome::Duplicate(existing));
        }

        let click = conversion
            .click_id
            .as_deref()
            .and_then(|id| self.clicks.get(id));

        let decision = self.rules.evaluate(&conversion);
        conversion.commission_rate = decision.rate;
        conversion.commission = decision.commission;
        conversion.cashback = decision.cashback;

        let mut assessment = self.fraud.assess(&conversion, click.as_ref());

        let mut metadata = conversion.metadata.clone();
        metadata.insert("commission_rate".to_string(), decision.rate.to_string());
        metadata.insert("commission".to_string(), decision.commission.to_string());
        metadata.insert("rate_source".to_string(), rate_source_label(&decision.source));
        if let Some(rule) = decision.applied_rules.last() {
            metadata.insert("rule_id".to_string(), rule.clone());
        }
        metadata.insert("fraud_score".to_string(), assessment.score.score().to_string());
        if decision.needs_review() {
            metadata.insert("review_flags".to_string(), decision.flagged.join(","));
            assessment.requires_review = true;
        }

        let case = if assessment.requires_review {
            let case = self.cases.open(&conversion, &assessment);
            metadata.insert("fraud_case_id".to_string(), case.id.to_string());
            Some(case)
        } else {
            None
        };

        let opened = match self.ledger.open_pending(conversion.clone(), metadata) {
            Ok(opened) => opened,
            Err(e @ (Error::StateConflict(_) | Error::Validation(_))) => {
                warn!(
                    transaction_id = %conversion.transaction_id,
                    user_id = %conversion.user_id,
                    error = %e,
                    "Conversion refused by ledger"
                );
                // Keep the case if a concurrent delivery of this id got in
                if let Some(case) = &case {
                    if self.ledger.find_transaction(&conversion.transaction_id)?.is_none() {
                        self.cases.discard(case.id);
                    }
                }
                return Ok(IntakeOutcome::Rejected(Rejection::Refused {
                    message: e.to_string(),
                }));
            }
            Err(e) => return Err(e),
        };

        let tx = match opened {
            Opened::Existing(tx) => return Ok(IntakeOutcome::Duplicate(tx)),
            Opened::Created(tx) => tx,
        };
        self.fraud.record_conversion(&conversion);
        if case.is_some() {
            self.metrics.record_fraud_case();
        }

        match case {
            Some(case) if case.status == FraudStatus::ConfirmedFraud => {
                let cancelled = self
                    .ledger
                    .cancel(&tx.transaction_id, Some("fraud_confirmed".to_string()), case_metadata(&case))?
                    .into_inner();
                self.metrics.record_transition(TransactionStatus::Cancelled.as_str());
                Ok(IntakeOutcome::Created(cancelled))
            }
            _ => Ok(IntakeOutcome::Created(tx)),
        }
    }

    /// Move a transaction to another status.
    ///
    /// With `hold_confirmation_during_review`, confirming a transaction whose
    /// fraud case is still pending is a state conflict.
    pub fn update_status(&self, update: StatusUpdate) -> Result<Transition> {
        if update.status == TransactionStatus::Confirmed
            && self.fraud.config().hold_confirmation_during_review
            && self.cases.has_pending_case(&update.transaction_id)
        {
            return Err(Error::StateConflict(format!(
                "transaction {} has a fraud case pending review",
                update.transaction_id
            )));
        }

        let transition = self.ledger.transition(update)?;
        if let Transition::Applied(tx) = &transition {
            self.metrics.record_transition(tx.status.as_str());
        }
        Ok(transition)
    }

    /// Record network-approved platform commission
    pub fn approve_commission(
        &self,
        transaction_id: &str,
        amount: Decimal,
        status: &str,
        reason: Option<String>,
    ) -> Result<Upsert> {
        self.ledger.record_commission(transaction_id, amount, status, reason)
    }

    /// Track many events; each item succeeds or fails on its own
    pub async fn batch_process(&self, events: Vec<TrackEvent>) -> BatchResult {
        self.metrics.record_batch(events.len());
        let concurrency = self.intake.batch_concurrency.max(1);

        let mut results: Vec<(usize, String, Result<IntakeOutcome>)> = stream::iter(events.into_iter().enumerate())
            .map(|(index, event)| async move {
                let transaction_id = event.transaction_id.clone();
                (index, transaction_id, self.track(event))
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        results.sort_by_key(|(index, _, _)| *index);

        let mut batch = BatchResult::default();
        for (index, transaction_id, result) in results {
            let reason = match result {
                Ok(IntakeOutcome::Created(_)) | Ok(IntakeOutcome::Duplicate(_)) => {
                    batch.processed += 1;
                    continue;
                }
                Ok(IntakeOutcome::Rejected(rejection)) => rejection.to_string(),
                Err(e) => e.to_string(),
            };
            batch.failed += 1;
            batch.failures.push(BatchFailure {
                index,
                transaction_id,
                reason,
            });
        }

        info!(processed = batch.processed, failed = batch.failed, "Batch processed");
        batch
    }

    // ===== Withdrawals =====

    /// Register a payment method (`upi`, `wallet`, `bank_account`, `paypal`)
    pub fn add_payment_method(&self, user_id: &UserId, kind: &str, details: Metadata) -> Result<PaymentMethod> {
        let kind: PaymentMethodKind = kind.parse()?;
        self.withdrawals.methods().add(user_id, kind, details)
    }

    /// Mark a payment method verified
    pub fn verify_payment_method(&self, user_id: &UserId, method_id: Uuid) -> Result<PaymentMethod> {
        self.withdrawals.methods().verify(user_id, method_id)
    }

    /// A user's payment methods
    pub fn list_payment_methods(&self, user_id: &UserId) -> Result<Vec<PaymentMethod>> {
        self.withdrawals.methods().list(user_id)
    }

    /// Validate and reserve a withdrawal
    pub fn request_withdrawal(
        &self,
        user_id: &UserId,
        amount: Decimal,
        payment_method_id: Uuid,
    ) -> Result<WithdrawalRequest> {
        Ok(self.withdrawals.request(user_id, amount, payment_method_id)?)
    }

    /// Execute a pending withdrawal; other states are returned unchanged
    pub async fn process_withdrawal(&self, withdrawal_id: Uuid) -> Result<WithdrawalRequest> {
        let before = self.ledger.get_withdrawal(withdrawal_id)?.status;
        let withdrawal = self.withdrawals.process(withdrawal_id).await?;
        if withdrawal.status != before && withdrawal.status.is_terminal() {
            self.metrics.record_withdrawal(withdrawal.status.as_str());
        }
        Ok(withdrawal)
    }

    /// Execute every pending withdrawal; returns how many reached a terminal state
    pub async fn process_pending_withdrawals(&self) -> Result<usize> {
        let pending = self
            .ledger
            .store()
            .list_withdrawals(None, Some(WithdrawalStatus::Pending))?;

        let mut settled = 0;
        for withdrawal in pending {
            match self.process_withdrawal(withdrawal.id).await {
                Ok(w) if w.status.is_terminal() => settled += 1,
                Ok(_) => {}
                Err(e) => error!(withdrawal_id = %withdrawal.id, error = %e, "Withdrawal processing failed"),
            }
        }
        Ok(settled)
    }

    /// Resolve stale `processing` withdrawals against the rail
    pub async fn reconcile_withdrawals(&self) -> Result<ReconcileReport> {
        let report = self
            .withdrawals
            .reconcile(self.withdrawals.config().reconcile_after())
            .await?;
        self.metrics
            .withdrawals
            .with_label_values(&[WithdrawalStatus::Completed.as_str()])
            .inc_by(report.completed as u64);
        self.metrics
            .withdrawals
            .with_label_values(&[WithdrawalStatus::Failed.as_str()])
            .inc_by(report.failed as u64);
        Ok(report)
    }

    /// A user's withdrawals, oldest first
    pub fn list_withdrawals(&self, user_id: &UserId) -> Result<Vec<WithdrawalRequest>> {
        Ok(self.withdrawals.list(user_id)?)
    }

    // ===== Fraud review =====

    /// Fraud cases, optionally filtered by status
    pub fn fraud_cases(&self, status: Option<FraudStatus>) -> Vec<FraudCase> {
        self.cases.list(status, None)
    }

    /// Resolve a pending fraud case; confirmed fraud cancels the transaction
    pub fn review_fraud_case(
        &self,
        case_id: Uuid,
        decision: ReviewDecision,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<FraudCase> {
        let case = self.cases.resolve(case_id, decision, reviewer, notes)?;

        if case.status == FraudStatus::ConfirmedFraud {
            let transition = self.ledger.cancel(
                &case.transaction_id,
                Some("fraud_confirmed".to_string()),
                case_metadata(&case),
            )?;
            if transition.is_applied() {
                self.metrics.record_transition(TransactionStatus::Cancelled.as_str());
            }
        }
        Ok(case)
    }

    // ===== Queries =====

    /// Aggregate figures, optionally for one user and a time range
    pub fn get_analytics(&self, user_id: Option<&UserId>, range: DateRange) -> Result<Analytics> {
        let store = self.ledger.store();
        let transactions = store.list_transactions(user_id)?;
        let withdrawals = store.list_withdrawals(user_id, None)?;
        let commissions = store.list_commissions()?;
        Ok(analytics::compute(&transactions, &withdrawals, &commissions, user_id, range))
    }

    /// Get account
    pub fn get_account(&self, user_id: &UserId) -> Result<CashbackAccount> {
        self.ledger.get_account(user_id)
    }

    /// Get transaction
    pub fn get_transaction(&self, transaction_id: &str) -> Result<CashbackTransaction> {
        self.ledger.get_transaction(transaction_id)
    }

    /// Attribution for a conversion with the configured model or `model`
    pub fn attribution_for(&self, transaction_id: &str, model: Option<ModelKind>) -> Result<AttributionRecord> {
        let conversion = self
            .ledger
            .store()
            .get_conversion(transaction_id)?
            .ok_or_else(|| Error::not_found("conversion", transaction_id))?;
        let clicks = self.clicks.for_user(&conversion.user_id);

        match model {
            None => Ok(self.attribution.attribute(&conversion, &clicks)),
            Some(kind) => Ok(self.attribution.attribute_with(kind, &conversion, &clicks)?),
        }
    }

    /// Verify ledger conservation across all accounts
    pub fn audit(&self) -> Result<()> {
        self.ledger.audit()
    }

    // ===== Webhooks & notifications =====

    /// Handle one partner envelope
    pub async fn handle_webhook(&self, envelope: WebhookEnvelope) -> WebhookOutcome {
        let label = EventKind::parse(&envelope.event).map_or("unknown", |k| k.as_str());
        let outcome = self.webhooks.handle(self, envelope).await;
        self.metrics.record_webhook(label, outcome.success);
        outcome
    }

    /// Handle one raw JSON envelope
    pub async fn handle_webhook_json(&self, raw: &str) -> WebhookOutcome {
        let outcome = self.webhooks.handle_json(self, raw).await;
        let label = EventKind::parse(&outcome.event).map_or("unknown", |k| k.as_str());
        self.metrics.record_webhook(label, outcome.success);
        outcome
    }

    /// Redeliver webhook retries that are due
    pub async fn drain_webhook_retries(&self, now: DateTime<Utc>) -> RetryReport {
        self.webhooks.drain_retries(self, now).await
    }

    /// Drop dead-letter entries past retention; returns how many were removed
    pub fn purge_dead_letters(&self, now: DateTime<Utc>) -> usize {
        self.webhooks.dead_letters().purge_expired(now)
    }

    /// Redeliver a dead-lettered webhook
    pub async fn reprocess_dead_letter(&self, entry_id: Uuid) -> webhook_adapter::Result<WebhookOutcome> {
        self.webhooks.reprocess(self, entry_id).await
    }

    /// Broadcast a promotional offer to one user or everyone
    pub fn announce_offer(&self, user_id: Option<UserId>, title: impl Into<String>, message: impl Into<String>) {
        self.ledger.notify(LedgerNotification::PromotionalOffer {
            user_id,
            title: title.into(),
            message: message.into(),
        });
    }
}

#[async_trait]
impl CommandExecutor for CashbackService {
    async fn execute(&self, command: LedgerCommand) -> Result<CommandOutcome> {
        match command {
            LedgerCommand::Track(event) => Ok(match self.track(event)? {
                IntakeOutcome::Created(tx) => CommandOutcome::Applied {
                    message: format!(
                        "Created transaction {} ({} {} {})",
                        tx.transaction_id, tx.amount, tx.currency, tx.status
                    ),
                },
                IntakeOutcome::Duplicate(tx) => CommandOutcome::Unchanged {
                    message: format!("Transaction {} already exists ({})", tx.transaction_id, tx.status),
                },
                IntakeOutcome::Rejected(rejection) => CommandOutcome::Rejected {
                    reason: rejection.to_string(),
                },
            }),
            LedgerCommand::UpdateStatus(update) => Ok(match self.update_status(update)? {
                Transition::Applied(tx) => CommandOutcome::Applied {
                    message: format!("Transaction {} {}", tx.transaction_id, tx.status),
                },
                Transition::AlreadyApplied(tx) => CommandOutcome::Unchanged {
                    message: format!("Transaction {} already {}", tx.transaction_id, tx.status),
                },
            }),
            LedgerCommand::ApproveCommission {
                transaction_id,
                amount,
                status,
                reason,
            } => Ok(match self.approve_commission(&transaction_id, amount, &status, reason)? {
                Upsert::Written => CommandOutcome::Applied {
                    message: format!("Recorded commission {} for {}", amount, transaction_id),
                },
                Upsert::Unchanged => CommandOutcome::Unchanged {
                    message: format!("Commission for {} already recorded", transaction_id),
                },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fraud_detector::FraudConfig;
    use ledger_core::{ChannelNotifier, MemoryStore};
    use rust_decimal_macros::dec;

    fn service_with(config: EngineConfig) -> CashbackService {
        let rail = Arc::new(SimulatedRail::new(&payout::SimulatedRailConfig {
            latency_ms: 0,
            success_rate: 1.0,
        }));
        CashbackService::new(&config, Arc::new(MemoryStore::new()), Arc::new(LogNotifier), rail).unwrap()
    }

    fn service() -> CashbackService {
        service_with(EngineConfig::default())
    }

    fn event(tx: &str, user: &str, amount: Decimal, category: &str) -> TrackEvent {
        TrackEvent {
            user_id: user.to_string(),
            transaction_id: tx.to_string(),
            amount,
            currency: "INR".to_string(),
            store: "flipkart".to_string(),
            category: Some(category.to_string()),
            ..TrackEvent::default()
        }
    }

    fn confirm(tx: &str) -> StatusUpdate {
        StatusUpdate {
            transaction_id: tx.to_string(),
            status: TransactionStatus::Confirmed,
            reason: None,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_track_is_idempotent() {
        let service = service();
        let first = service.track_event(event("T1", "U1", dec!(4500), "electronics")).unwrap().unwrap();
        let second = service.track_event(event("T1", "U1", dec!(4500), "electronics")).unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.amount, dec!(157.50));
        assert_eq!(first.metadata["commission_rate"], "0.035");
        assert_eq!(first.metadata["rate_source"], "category:electronics");

        let account = service.get_account(&UserId::new("U1")).unwrap();
        assert_eq!(account.pending_balance, dec!(157.50));
        assert_eq!(service.metrics().conversions.with_label_values(&["duplicate"]).get(), 1);
    }

    #[test]
    fn test_below_minimum_creates_nothing() {
        let service = service();
        assert_eq!(service.track_event(event("T1", "U1", dec!(5), "electronics")).unwrap(), None);
        assert!(service.get_transaction("T1").is_err());
        assert!(service.get_account(&UserId::new("U1")).is_err());
    }

    #[test]
    fn test_grocery_earns_less_than_electronics() {
        let service = service();
        let electronics = service.track_event(event("T1", "U1", dec!(1000), "electronics")).unwrap().unwrap();
        let grocery = service.track_event(event("T2", "U1", dec!(1000), "grocery")).unwrap().unwrap();
        assert!(grocery.amount < electronics.amount);
    }

    #[test]
    fn test_confirm_then_refund_reverses_balance() {
        let service = service();
        service.track_event(event("T1", "U1", dec!(4500), "electronics")).unwrap();

        assert!(service.update_status(confirm("T1")).unwrap().is_applied());
        assert_eq!(service.get_account(&UserId::new("U1")).unwrap().balance, dec!(157.50));

        let refund = StatusUpdate {
            transaction_id: "T1".to_string(),
            status: TransactionStatus::Cancelled,
            reason: Some("refunded".to_string()),
            metadata: Metadata::new(),
        };
        assert!(service.update_status(refund).unwrap().is_applied());
        let account = service.get_account(&UserId::new("U1")).unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.total_earned, Decimal::ZERO);

        assert!(matches!(service.update_status(confirm("T1")), Err(Error::StateConflict(_))));
        service.audit().unwrap();
    }

    #[test]
    fn test_hold_confirmation_during_review() {
        let config = EngineConfig {
            fraud: FraudConfig {
                review_threshold: 10,
                hold_confirmation_during_review: true,
                ..FraudConfig::default()
            },
            ..EngineConfig::default()
        };
        let service = service_with(config);

        // No click on record: the missing-click indicator alone reaches the threshold
        let tx = service.track_event(event("T1", "U1", dec!(1000), "fashion")).unwrap().unwrap();
        let case_id: Uuid = tx.metadata["fraud_case_id"].parse().unwrap();

        assert!(matches!(service.update_status(confirm("T1")), Err(Error::StateConflict(_))));

        service
            .review_fraud_case(case_id, ReviewDecision::Clear, "analyst", None)
            .unwrap();
        assert!(service.update_status(confirm("T1")).unwrap().is_applied());
    }

    #[test]
    fn test_confirmed_fraud_cancels_transaction() {
        let config = EngineConfig {
            fraud: FraudConfig {
                review_threshold: 10,
                ..FraudConfig::default()
            },
            ..EngineConfig::default()
        };
        let service = service_with(config);
        let tx = service.track_event(event("T1", "U1", dec!(1000), "fashion")).unwrap().unwrap();
        let case_id: Uuid = tx.metadata["fraud_case_id"].parse().unwrap();

        let case = service
            .review_fraud_case(case_id, ReviewDecision::ConfirmFraud, "analyst", Some("bot".to_string()))
            .unwrap();
        assert_eq!(case.status, FraudStatus::ConfirmedFraud);

        let tx = service.get_transaction("T1").unwrap();
        assert_eq!(tx.status, TransactionStatus::Cancelled);
        assert_eq!(tx.status_reason.as_deref(), Some("fraud_confirmed"));
        assert_eq!(service.get_account(&UserId::new("U1")).unwrap().pending_balance, Decimal::ZERO);

        assert!(service
            .review_fraud_case(case_id, ReviewDecision::Clear, "analyst", None)
            .is_err());
    }

    #[test]
    fn test_refused_conversion_leaves_no_fraud_case() {
        let config = EngineConfig {
            fraud: FraudConfig {
                review_threshold: 10,
                ..FraudConfig::default()
            },
            ..EngineConfig::default()
        };
        let service = service_with(config);
        let user = UserId::new("U1");
        service.track_event(event("T0", "U1", dec!(1000), "fashion")).unwrap().unwrap();
        assert_eq!(service.fraud_cases(None).len(), 1);
        service.ledger().set_account_active(&user, false).unwrap();

        let outcome = service.track(event("T1", "U1", dec!(1000), "fashion")).unwrap();
        assert!(matches!(outcome, IntakeOutcome::Rejected(Rejection::Refused { .. })));

        let cases = service.fraud_cases(None);
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].transaction_id, "T0");
        assert_eq!(service.metrics().fraud_cases.get(), 1);
        assert!(service.get_transaction("T1").is_err());
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let service = service();
        let result = service
            .batch_process(vec![
                event("T1", "U1", dec!(500), "fashion"),
                event("", "U1", dec!(500), "fashion"),
                event("T3", "U2", dec!(1), "fashion"),
                event("T1", "U1", dec!(500), "fashion"),
            ])
            .await;

        assert_eq!(result.processed, 2);
        assert_eq!(result.failed, 2);
        assert_eq!(result.failures[0].index, 1);
        assert_eq!(result.failures[1].index, 2);
        assert_eq!(service.ledger().store().list_transactions(None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_withdrawal_lifecycle() {
        let service = service();
        let user = UserId::new("U1");
        service.track_event(event("T1", "U1", dec!(10000), "fashion")).unwrap();
        service.update_status(confirm("T1")).unwrap();
        assert_eq!(service.get_account(&user).unwrap().balance, dec!(500.00));

        let mut details = Metadata::new();
        details.insert("vpa".to_string(), "u1@upi".to_string());
        let method = service.add_payment_method(&user, "upi", details).unwrap();

        assert!(matches!(
            service.request_withdrawal(&user, dec!(200), method.id),
            Err(Error::UnverifiedPaymentMethod(_))
        ));
        service.verify_payment_method(&user, method.id).unwrap();
        assert!(matches!(
            service.request_withdrawal(&user, dec!(50), method.id),
            Err(Error::BelowMinimumWithdrawal { .. })
        ));
        assert!(matches!(
            service.request_withdrawal(&user, dec!(600), method.id),
            Err(Error::InsufficientBalance { .. })
        ));
        assert!(service.list_withdrawals(&user).unwrap().is_empty());

        let withdrawal = service.request_withdrawal(&user, dec!(200), method.id).unwrap();
        assert_eq!(service.get_account(&user).unwrap().balance, dec!(300.00));

        let done = service.process_withdrawal(withdrawal.id).await.unwrap();
        assert_eq!(done.status, WithdrawalStatus::Completed);
        let again = service.process_withdrawal(withdrawal.id).await.unwrap();
        assert_eq!(again.status, WithdrawalStatus::Completed);

        let account = service.get_account(&user).unwrap();
        assert_eq!(account.total_withdrawn, dec!(200));
        assert_eq!(account.balance, dec!(300.00));
        assert_eq!(service.metrics().withdrawals.with_label_values(&["completed"]).get(), 1);
        service.audit().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_webhook_leaves_state_unchanged() {
        let service = service();
        let outcome = service
            .handle_webhook(WebhookEnvelope::new(
                "conversion.exploded",
                serde_json::json!({"transactionId": "T1", "userId": "U1", "amount": 100}),
            ))
            .await;
        assert!(!outcome.success);
        assert!(service.ledger().store().list_transactions(None).unwrap().is_empty());
        assert!(service.ledger().store().list_accounts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offer_reaches_notifier() {
        let (notifier, mut rx) = ChannelNotifier::new(4);
        let rail = Arc::new(SimulatedRail::new(&payout::SimulatedRailConfig::default()));
        let service = CashbackService::new(
            &EngineConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(notifier),
            rail,
        )
        .unwrap();

        service.announce_offer(None, "Diwali", "Double cashback on electronics");
        match rx.recv().await {
            Some(LedgerNotification::PromotionalOffer { title, .. }) => assert_eq!(title, "Diwali"),
            other => panic!("unexpected notification: {:?}", other),
        }
    }
}
