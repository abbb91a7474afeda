//! Webhook adapter
//!
//! Turns partner envelopes into ledger commands and runs them through a
//! [`CommandExecutor`]. Handling never returns an error to the sender:
//! every envelope yields a [`WebhookOutcome`]. Failures that may succeed
//! later (transaction not yet created, storage hiccup) go to the retry
//! queue; exhausted retries and malformed events go to the dead-letter
//! queue.

use crate::{
    command::CommandExecutor,
    config::WebhookConfig,
    dlq::{DeadLetterQueue, DlqStats},
    envelope::{EventKind, WebhookEnvelope},
    handlers,
    retry::{RetryQueue, Scheduled},
    Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result reported back for one envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookOutcome {
    /// Whether the event was handled
    pub success: bool,
    /// Human-readable result
    pub message: String,
    /// Event type as received
    pub event: String,
    /// Transaction the event referred to
    pub transaction_id: Option<String>,
    /// Whether a retry was queued
    pub retry_scheduled: bool,
}

impl WebhookOutcome {
    fn new(envelope: &WebhookEnvelope, success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
            event: envelope.event.clone(),
            transaction_id: envelope.transaction_id(),
            retry_scheduled: false,
        }
    }
}

/// Result of draining due retries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryReport {
    /// Entries attempted
    pub attempted: usize,
    /// Entries that succeeded
    pub succeeded: usize,
    /// Entries queued again
    pub rescheduled: usize,
    /// Entries moved to the dead-letter queue or failed permanently
    pub dead_lettered: usize,
}

/// Failure classes for executor errors
fn is_retryable(err: &ledger_core::Error) -> bool {
    matches!(
        err,
        ledger_core::Error::NotFound { .. } | ledger_core::Error::Storage(_) | ledger_core::Error::Io(_)
    )
}

/// Partner webhook adapter
#[derive(Debug)]
pub struct WebhookAdapter {
    config: WebhookConfig,
    retries: RetryQueue,
    dead_letters: DeadLetterQueue,
}

impl Default for WebhookAdapter {
    fn default() -> Self {
        Self::new(WebhookConfig::default())
    }
}

impl WebhookAdapter {
    /// Create adapter
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            retries: RetryQueue::new(config.retry.clone()),
            dead_letters: DeadLetterQueue::new(config.dlq_retention_days, config.dlq_max_entries),
            config,
        }
    }

    /// Configuration
    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Retry queue
    pub fn retries(&self) -> &RetryQueue {
        &self.retries
    }

    /// Dead-letter queue
    pub fn dead_letters(&self) -> &DeadLetterQueue {
        &self.dead_letters
    }

    /// Dead-letter statistics
    pub fn dlq_stats(&self) -> DlqStats {
        self.dead_letters.stats()
    }

    /// Handle a raw JSON envelope
    pub async fn handle_json(&self, executor: &dyn CommandExecutor, raw: &str) -> WebhookOutcome {
        match WebhookEnvelope::from_json(raw) {
            Ok(envelope) => self.handle(executor, envelope).await,
            Err(e) => {
                warn!(error = %e, "Malformed webhook envelope");
                WebhookOutcome {
                    success: false,
                    message: format!("Malformed envelope: {}", e),
                    event: String::new(),
                    transaction_id: None,
                    retry_scheduled: false,
                }
            }
        }
    }

    /// Handle one envelope (first delivery)
    pub async fn handle(&self, executor: &dyn CommandExecutor, envelope: WebhookEnvelope) -> WebhookOutcome {
        let now = Utc::now();
        self.deliver(executor, envelope, 1, now, now).await
    }

    async fn deliver(
        &self,
        executor: &dyn CommandExecutor,
        envelope: WebhookEnvelope,
        attempt: u32,
        first_failed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> WebhookOutcome {
        let Some(kind) = EventKind::parse(&envelope.event) else {
            let message = format!("Unknown event type '{}'", envelope.event);
            warn!(event = %envelope.event, source = ?envelope.source, "Unrecognized webhook event");
            let outcome = WebhookOutcome::new(&envelope, false, message.clone());
            self.dead_letters.route(envelope, message, attempt, first_failed_at, false);
            return outcome;
        };

        let command = match handlers::translate(kind, &envelope.data) {
            Ok(command) => command,
            Err(e) => {
                let message = format!("Invalid {} payload: {}", kind, e);
                warn!(event = %kind, error = %e, "Rejected webhook payload");
                let outcome = WebhookOutcome::new(&envelope, false, message.clone());
                self.dead_letters.route(envelope, message, attempt, first_failed_at, false);
                return outcome;
            }
        };

        let command_kind = command.kind();
        match executor.execute(command).await {
            Ok(result) => {
                debug!(
                    event = %kind,
                    command = command_kind,
                    attempt,
                    success = result.is_success(),
                    "Webhook handled"
                );
                WebhookOutcome::new(&envelope, result.is_success(), result.message())
            }
            Err(e) if is_retryable(&e) => {
                let message = e.to_string();
                let mut outcome = WebhookOutcome::new(&envelope, false, message.clone());
                match self.retries.schedule(envelope.clone(), message.clone(), attempt, first_failed_at, now) {
                    Scheduled::Retry { id, at } => {
                        info!(
                            event = %kind,
                            retry_id = %id,
                            attempt,
                            next_attempt_at = %at,
                            error = %message,
                            "Webhook scheduled for retry"
                        );
                        outcome.retry_scheduled = true;
                    }
                    Scheduled::Exhausted => {
                        self.dead_letters.route(envelope, message, attempt, first_failed_at, true);
                    }
                }
                outcome
            }
            Err(e) => {
                warn!(event = %kind, command = command_kind, error = %e, "Webhook rejected by ledger");
                WebhookOutcome::new(&envelope, false, e.to_string())
            }
        }
    }

    /// Redeliver retries due at `now`
    pub async fn drain_retries(&self, executor: &dyn CommandExecutor, now: DateTime<Utc>) -> RetryReport {
        let mut report = RetryReport::default();
        for entry in self.retries.take_due(now) {
            report.attempted += 1;
            let outcome = self
                .deliver(executor, entry.envelope, entry.attempts + 1, entry.first_failed_at, now)
                .await;
            if outcome.success {
                report.succeeded += 1;
            } else if outcome.retry_scheduled {
                report.rescheduled += 1;
            } else {
                report.dead_lettered += 1;
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                rescheduled = report.rescheduled,
                dead_lettered = report.dead_lettered,
                "Drained webhook retries"
            );
        }
        report
    }

    /// Redeliver a reprocessable dead-letter entry as a fresh delivery
    pub async fn reprocess(&self, executor: &dyn CommandExecutor, id: Uuid) -> Result<WebhookOutcome> {
        let envelope = self.dead_letters.take_for_reprocess(id)?;
        Ok(self.handle(executor, envelope).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandOutcome, LedgerCommand};
    use crate::Error;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashSet;

    /// Executor that knows a fixed set of transactions
    #[derive(Default)]
    struct MockExecutor {
        known: Mutex<HashSet<String>>,
        confirmed: Mutex<HashSet<String>>,
        executed: Mutex<Vec<LedgerCommand>>,
    }

    #[async_trait]
    impl CommandExecutor for MockExecutor {
        async fn execute(&self, command: LedgerCommand) -> ledger_core::Result<CommandOutcome> {
            self.executed.lock().push(command.clone());
            let id = command.transaction_id().to_string();
            match command {
                LedgerCommand::Track(_) => {
                    if self.known.lock().insert(id.clone()) {
                        Ok(CommandOutcome::Applied {
                            message: format!("created {}", id),
                        })
                    } else {
                        Ok(CommandOutcome::Unchanged {
                            message: format!("duplicate {}", id),
                        })
                    }
                }
                LedgerCommand::UpdateStatus(_) => {
                    if !self.known.lock().contains(&id) {
                        return Err(ledger_core::Error::not_found("transaction", id));
                    }
                    if self.confirmed.lock().insert(id.clone()) {
                        Ok(CommandOutcome::Applied {
                            message: "confirmed".to_string(),
                        })
                    } else {
                        Ok(CommandOutcome::Unchanged {
                            message: "already confirmed".to_string(),
                        })
                    }
                }
                LedgerCommand::ApproveCommission { .. } => {
                    Err(ledger_core::Error::StateConflict("commission locked".to_string()))
                }
            }
        }
    }

    fn created(id: &str) -> WebhookEnvelope {
        WebhookEnvelope::new(
            "conversion.created",
            json!({"userId": "U1", "transactionId": id, "amount": "4500", "currency": "INR"}),
        )
    }

    fn confirmed(id: &str) -> WebhookEnvelope {
        WebhookEnvelope::new("conversion.confirmed", json!({"transactionId": id}))
    }

    #[tokio::test]
    async fn test_unknown_event_is_structured_failure() {
        let adapter = WebhookAdapter::default();
        let executor = MockExecutor::default();

        let outcome = adapter
            .handle(&executor, WebhookEnvelope::new("conversion.teleported", json!({"transactionId": "T1"})))
            .await;

        assert!(!outcome.success);
        assert!(outcome.message.contains("Unknown event type"));
        assert_eq!(outcome.transaction_id.as_deref(), Some("T1"));
        assert!(executor.executed.lock().is_empty());
        assert_eq!(adapter.dlq_stats().total_entries, 1);
        assert_eq!(adapter.dlq_stats().reprocessable, 0);
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let adapter = WebhookAdapter::default();
        let executor = MockExecutor::default();

        assert!(adapter.handle(&executor, created("T1")).await.success);
        let again = adapter.handle(&executor, created("T1")).await;
        assert!(again.success);
        assert!(again.message.contains("duplicate"));

        assert!(adapter.handle(&executor, confirmed("T1")).await.success);
        let again = adapter.handle(&executor, confirmed("T1")).await;
        assert!(again.success);
        assert_eq!(again.message, "already confirmed");
    }

    #[tokio::test]
    async fn test_not_found_is_retried_then_succeeds() {
        let adapter = WebhookAdapter::default();
        let executor = MockExecutor::default();

        let outcome = adapter.handle(&executor, confirmed("T9")).await;
        assert!(!outcome.success);
        assert!(outcome.retry_scheduled);
        assert_eq!(adapter.retries().len(), 1);

        // not yet due
        let report = adapter.drain_retries(&executor, Utc::now()).await;
        assert_eq!(report.attempted, 0);

        executor.known.lock().insert("T9".to_string());
        let report = adapter
            .drain_retries(&executor, Utc::now() + chrono::Duration::seconds(10))
            .await;
        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
        assert!(adapter.retries().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_go_to_dead_letters() {
        let config = WebhookConfig {
            retry: crate::retry::RetryConfig {
                max_attempts: 2,
                base_delay_ms: 10,
                max_delay_secs: 1,
            },
            ..WebhookConfig::default()
        };
        let adapter = WebhookAdapter::new(config);
        let executor = MockExecutor::default();

        assert!(adapter.handle(&executor, confirmed("T404")).await.retry_scheduled);
        let report = adapter
            .drain_retries(&executor, Utc::now() + chrono::Duration::seconds(5))
            .await;
        assert_eq!(report.dead_lettered, 1);
        assert!(adapter.retries().is_empty());

        let entries = adapter.dead_letters().list(true, 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].retry_count, 2);

        executor.known.lock().insert("T404".to_string());
        let outcome = adapter.reprocess(&executor, entries[0].id).await.unwrap();
        assert!(outcome.success);
        assert!(adapter.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_business_rejection_is_not_retried() {
        let adapter = WebhookAdapter::default();
        let executor = MockExecutor::default();

        let outcome = adapter
            .handle(
                &executor,
                WebhookEnvelope::new(
                    "affiliate.commission.approved",
                    json!({"transactionId": "T1", "commissionAmount": "135.00"}),
                ),
            )
            .await;
        assert!(!outcome.success);
        assert!(!outcome.retry_scheduled);
        assert!(adapter.retries().is_empty());
        assert!(adapter.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payloads() {
        let adapter = WebhookAdapter::default();
        let executor = MockExecutor::default();

        let outcome = adapter
            .handle(&executor, WebhookEnvelope::new("conversion.created", json!({"userId": "U1"})))
            .await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("transactionId"));

        let outcome = adapter.handle_json(&executor, "{not json").await;
        assert!(!outcome.success);

        let permanent = adapter.dead_letters().list(false, 10);
        assert_eq!(permanent.len(), 1);
        assert!(matches!(
            adapter.reprocess(&executor, permanent[0].id).await,
            Err(Error::NotReprocessable(_))
        ));
    }
}
