//! Retry queue with bounded exponential backoff

use crate::envelope::WebhookEnvelope;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts including the first delivery
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds); doubles per attempt
    pub base_delay_ms: u64,

    /// Upper bound on any single delay (seconds)
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2_000,
            max_delay_secs: 3_600,
        }
    }
}

impl RetryConfig {
    /// Delay after `attempt` failed attempts (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay).min(Duration::from_secs(self.max_delay_secs))
    }
}

/// A failed delivery waiting for another attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryEntry {
    /// Entry id
    pub id: Uuid,
    /// Event to redeliver
    pub envelope: WebhookEnvelope,
    /// Attempts made so far
    pub attempts: u32,
    /// Most recent failure
    pub last_error: String,
    /// First failure
    pub first_failed_at: DateTime<Utc>,
    /// When the entry becomes due
    pub next_attempt_at: DateTime<Utc>,
}

/// Result of scheduling a retry
#[derive(Debug, Clone, PartialEq)]
pub enum Scheduled {
    /// Will be retried at the given time
    Retry {
        /// Entry id
        id: Uuid,
        /// Due time
        at: DateTime<Utc>,
    },
    /// Attempts used up
    Exhausted,
}

/// In-memory retry queue
#[derive(Debug, Default)]
pub struct RetryQueue {
    config: RetryConfig,
    entries: Mutex<Vec<RetryEntry>>,
}

impl RetryQueue {
    /// Create queue
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Policy
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Schedule another attempt after `attempts` failures
    pub fn schedule(
        &self,
        envelope: WebhookEnvelope,
        error: impl Into<String>,
        attempts: u32,
        first_failed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Scheduled {
        if attempts >= self.config.max_attempts {
            return Scheduled::Exhausted;
        }

        let delay = chrono::Duration::from_std(self.config.backoff(attempts))
            .unwrap_or_else(|_| chrono::Duration::seconds(self.config.max_delay_secs as i64));
        let entry = RetryEntry {
            id: Uuid::new_v4(),
            envelope,
            attempts,
            last_error: error.into(),
            first_failed_at,
            next_attempt_at: now + delay,
        };
        let scheduled = Scheduled::Retry {
            id: entry.id,
            at: entry.next_attempt_at,
        };
        self.entries.lock().push(entry);
        scheduled
    }

    /// Remove and return entries due at `now`, earliest first
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<RetryEntry> {
        let mut entries = self.entries.lock();
        let (mut due, waiting): (Vec<_>, Vec<_>) =
            entries.drain(..).partition(|e| e.next_attempt_at <= now);
        *entries = waiting;
        due.sort_by_key(|e| e.next_attempt_at);
        due
    }

    /// Entries waiting
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
