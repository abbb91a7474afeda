//! Dead-letter queue
//!
//! Holds events that failed permanently or ran out of retries, with:
//! - failure reason tracking
//! - retry attempt counting
//! - expiry after the retention period
//! - a size bound, evicting the entry closest to expiry
//! - manual reprocessing of entries classified as reprocessable

use crate::{envelope::WebhookEnvelope, Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

/// DLQ entry with failure metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    /// Entry id
    pub id: Uuid,
    /// Original event
    pub envelope: WebhookEnvelope,
    /// Last failure
    pub failure_reason: String,
    /// Attempts made
    pub retry_count: u32,
    /// First failure
    pub first_failure_at: DateTime<Utc>,
    /// Last failure
    pub last_failure_at: DateTime<Utc>,
    /// Removal time
    pub expires_at: DateTime<Utc>,
    /// Whether a manual retry can succeed
    pub reprocessable: bool,
}

/// DLQ statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DlqStats {
    /// Entries held
    pub total_entries: usize,
    /// Entries eligible for reprocessing
    pub reprocessable: usize,
    /// Entries past expiry (not yet purged)
    pub expired: usize,
    /// Entry count per event type
    pub by_event: HashMap<String, usize>,
}

/// In-memory dead-letter queue
#[derive(Debug)]
pub struct DeadLetterQueue {
    entries: RwLock<HashMap<Uuid, DlqEntry>>,
    retention_days: i64,
    max_entries: usize,
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new(30, 10_000)
    }
}

impl DeadLetterQueue {
    /// Create queue
    pub fn new(retention_days: i64, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retention_days,
            max_entries: max_entries.max(1),
        }
    }

    /// Whether a failure reason looks transient
    pub fn is_transient(reason: &str) -> bool {
        let transient = [
            "timeout",
            "timed out",
            "connection",
            "unavailable",
            "storage error",
            "temporar",
            "not found",
        ];
        let reason = reason.to_lowercase();
        transient.iter().any(|t| reason.contains(t))
    }

    /// Route an event to the queue; returns the entry id
    pub fn route(
        &self,
        envelope: WebhookEnvelope,
        failure_reason: impl Into<String>,
        retry_count: u32,
        first_failure_at: DateTime<Utc>,
        retryable: bool,
    ) -> Uuid {
        let now = Utc::now();
        let failure_reason = failure_reason.into();
        let entry = DlqEntry {
            id: Uuid::new_v4(),
            reprocessable: retryable || Self::is_transient(&failure_reason),
            envelope,
            failure_reason,
            retry_count,
            first_failure_at,
            last_failure_at: now,
            expires_at: first_failure_at + chrono::Duration::days(self.retention_days),
        };

        warn!(
            entry_id = %entry.id,
            event = %entry.envelope.event,
            reason = %entry.failure_reason,
            retry_count,
            reprocessable = entry.reprocessable,
            "Webhook moved to dead-letter queue"
        );

        let id = entry.id;
        let mut entries = self.entries.write();
        entries.insert(id, entry);
        if entries.len() > self.max_entries {
            let oldest = entries.values().min_by_key(|e| e.expires_at).map(|e| e.id);
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                warn!(
                    evicted = %oldest,
                    max_entries = self.max_entries,
                    "Dead-letter queue full, evicted oldest entry"
                );
            }
        }
        id
    }

    /// Get entry
    pub fn get(&self, id: Uuid) -> Option<DlqEntry> {
        self.entries.read().get(&id).cloned()
    }

    /// Remove a reprocessable entry and return its event for redelivery
    pub fn take_for_reprocess(&self, id: Uuid) -> Result<WebhookEnvelope> {
        let mut entries = self.entries.write();
        let entry = entries.get(&id).ok_or(Error::EntryNotFound(id))?;
        if !entry.reprocessable {
            return Err(Error::NotReprocessable(format!(
                "entry {} failed permanently: {}",
                id, entry.failure_reason
            )));
        }
        let entry = entries.remove(&id).ok_or(Error::EntryNotFound(id))?;
        info!(entry_id = %id, event = %entry.envelope.event, "Reprocessing dead-letter entry");
        Ok(entry.envelope)
    }

    /// Entries, newest failure first
    pub fn list(&self, reprocessable_only: bool, limit: usize) -> Vec<DlqEntry> {
        let mut entries: Vec<DlqEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| !reprocessable_only || e.reprocessable)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.last_failure_at.cmp(&a.last_failure_at));
        entries.truncate(limit);
        entries
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// Statistics
    pub fn stats(&self) -> DlqStats {
        let now = Utc::now();
        let entries = self.entries.read();
        let mut stats = DlqStats {
            total_entries: entries.len(),
            ..DlqStats::default()
        };
        for entry in entries.values() {
            if entry.reprocessable {
                stats.reprocessable += 1;
            }
            if entry.expires_at <= now {
                stats.expired += 1;
            }
            *stats.by_event.entry(entry.envelope.event.clone()).or_default() += 1;
        }
        stats
    }

    /// Entries held
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_transient() {
        assert!(DeadLetterQueue::is_transient("connection timeout"));
        assert!(DeadLetterQueue::is_transient("service temporarily unavailable"));
        assert!(DeadLetterQueue::is_transient("transaction not found: T9"));
        assert!(!DeadLetterQueue::is_transient("invalid schema"));
        assert!(!DeadLetterQueue::is_transient("Unknown event type 'x'"));
    }

    #[test]
    fn test_route_and_reprocess() {
        let dlq = DeadLetterQueue::default();
        let now = Utc::now();

        let retryable = dlq.route(
            WebhookEnvelope::new("conversion.confirmed", json!({"transactionId": "T1"})),
            "transaction not found: T1",
            5,
            now,
            true,
        );
        let permanent = dlq.route(
            WebhookEnvelope::new("conversion.teleported", json!({})),
            "Unknown event type 'conversion.teleported'",
            1,
            now,
            false,
        );

        let stats = dlq.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.reprocessable, 1);
        assert_eq!(stats.by_event["conversion.confirmed"], 1);
        assert_eq!(dlq.list(true, 10).len(), 1);

        assert!(matches!(
            dlq.take_for_reprocess(permanent),
            Err(Error::NotReprocessable(_))
        ));
        let envelope = dlq.take_for_reprocess(retryable).unwrap();
        assert_eq!(envelope.event, "conversion.confirmed");
        assert!(matches!(
            dlq.take_for_reprocess(retryable),
            Err(Error::EntryNotFound(_))
        ));
        assert_eq!(dlq.len(), 1);
    }

    #[test]
    fn test_bounded_size_evicts_closest_to_expiry() {
        let dlq = DeadLetterQueue::new(30, 2);
        let now = Utc::now();
        let oldest = dlq.route(
            WebhookEnvelope::new("spam", json!({})),
            "Unknown event type 'spam'",
            1,
            now - chrono::Duration::days(3),
            false,
        );
        let middle = dlq.route(
            WebhookEnvelope::new("spam", json!({})),
            "Unknown event type 'spam'",
            1,
            now - chrono::Duration::days(2),
            false,
        );
        let newest = dlq.route(
            WebhookEnvelope::new("spam", json!({})),
            "Unknown event type 'spam'",
            1,
            now,
            false,
        );

        assert_eq!(dlq.len(), 2);
        assert!(dlq.get(oldest).is_none());
        assert!(dlq.get(middle).is_some());
        assert!(dlq.get(newest).is_some());
    }

    #[test]
    fn test_retention_counts_from_first_failure() {
        let dlq = DeadLetterQueue::new(7, 100);
        let now = Utc::now();
        let stale = dlq.route(
            WebhookEnvelope::new("conversion.confirmed", json!({})),
            "timeout",
            5,
            now - chrono::Duration::days(8),
            true,
        );
        assert_eq!(dlq.stats().expired, 1);
        assert_eq!(dlq.purge_expired(now), 1);
        assert!(dlq.get(stale).is_none());
    }

    #[test]
    fn test_purge_expired() {
        let dlq = DeadLetterQueue::new(1, 100);
        dlq.route(WebhookEnvelope::new("x", json!({})), "bad", 1, Utc::now(), false);
        assert_eq!(dlq.purge_expired(Utc::now()), 0);
        assert_eq!(dlq.purge_expired(Utc::now() + chrono::Duration::days(2)), 1);
        assert!(dlq.is_empty());
    }
}
