//! Metrics collection for observability
//!
//! Prometheus metrics for the cashback engine, held in a private registry
//! so several engines can coexist in one process.
//!
//! # Metrics
//!
//! - `cashback_conversions_total{outcome}` - Tracked conversions by intake outcome
//! - `cashback_transitions_total{kind}` - Applied ledger transitions
//! - `cashback_fraud_cases_total` - Fraud cases opened
//! - `cashback_withdrawals_total{status}` - Withdrawals reaching a terminal state
//! - `cashback_webhooks_total{event,outcome}` - Handled webhook envelopes
//! - `cashback_batch_size` - Histogram of batch sizes

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Metrics collector
#[derive(Clone)]
pub struct EngineMetrics {
    /// Conversions by outcome (created, duplicate, rejected, error)
    pub conversions: IntCounterVec,

    /// Applied transitions (confirmed, cancelled)
    pub transitions: IntCounterVec,

    /// Fraud cases opened
    pub fraud_cases: IntCounter,

    /// Terminal withdrawals by status
    pub withdrawals: IntCounterVec,

    /// Webhooks by event and outcome
    pub webhooks: IntCounterVec,

    /// Batch size histogram
    pub batch_size: Histogram,

    registry: Registry,
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics").finish_non_exhaustive()
    }
}

impl EngineMetrics {
    /// Create and register all metrics
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let conversions = IntCounterVec::new(
            Opts::new("cashback_conversions_total", "Tracked conversions by intake outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(conversions.clone()))?;

        let transitions = IntCounterVec::new(
            Opts::new("cashback_transitions_total", "Applied ledger transitions"),
            &["kind"],
        )?;
        registry.register(Box::new(transitions.clone()))?;

        let fraud_cases = IntCounter::new("cashback_fraud_cases_total", "Fraud cases opened")?;
        registry.register(Box::new(fraud_cases.clone()))?;

        let withdrawals = IntCounterVec::new(
            Opts::new("cashback_withdrawals_total", "Withdrawals reaching a terminal state"),
            &["status"],
        )?;
        registry.register(Box::new(withdrawals.clone()))?;

        let webhooks = IntCounterVec::new(
            Opts::new("cashback_webhooks_total", "Handled webhook envelopes"),
            &["event", "outcome"],
        )?;
        registry.register(Box::new(webhooks.clone()))?;

        let batch_size = Histogram::with_opts(
            HistogramOpts::new("cashback_batch_size", "Histogram of batch sizes")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]),
        )?;
        registry.register(Box::new(batch_size.clone()))?;

        Ok(Self {
            conversions,
            transitions,
            fraud_cases,
            withdrawals,
            webhooks,
            batch_size,
            registry,
        })
    }

    /// Record an intake outcome
    pub fn record_conversion(&self, outcome: &str) {
        self.conversions.with_label_values(&[outcome]).inc();
    }

    /// Record an applied transition
    pub fn record_transition(&self, kind: &str) {
        self.transitions.with_label_values(&[kind]).inc();
    }

    /// Record an opened fraud case
    pub fn record_fraud_case(&self) {
        self.fraud_cases.inc();
    }

    /// Record a terminal withdrawal
    pub fn record_withdrawal(&self, status: &str) {
        self.withdrawals.with_label_values(&[status]).inc();
    }

    /// Record a handled webhook
    pub fn record_webhook(&self, event: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.webhooks.with_label_values(&[event, outcome]).inc();
    }

    /// Record a batch
    pub fn record_batch(&self, size: usize) {
        self.batch_size.observe(size as f64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = EngineMetrics::new().unwrap();
        assert_eq!(metrics.fraud_cases.get(), 0);
        assert_eq!(metrics.conversions.with_label_values(&["created"]).get(), 0);
    }

    #[test]
    fn test_record_and_render() {
        let metrics = EngineMetrics::new().unwrap();
        metrics.record_conversion("created");
        metrics.record_conversion("created");
        metrics.record_webhook("conversion.created", true);
        metrics.record_batch(10);

        assert_eq!(metrics.conversions.with_label_values(&["created"]).get(), 2);
        let text = metrics.render();
        assert!(text.contains("cashback_conversions_total"));
        assert!(text.contains("cashback_webhooks_total"));
    }

    #[test]
    fn test_independent_registries() {
        let a = EngineMetrics::new().unwrap();
        let b = EngineMetrics::new().unwrap();
        a.record_fraud_case();
        assert_eq!(a.fraud_cases.get(), 1);
        assert_eq!(b.fraud_cases.get(), 0);
    }
}
