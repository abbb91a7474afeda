//! Webhook adapter configuration

use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};

/// Webhook adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Retry policy for retryable failures
    pub retry: RetryConfig,

    /// Days a dead-letter entry is kept after its first failure
    pub dlq_retention_days: i64,

    /// Upper bound on dead-letter entries; the oldest is evicted past it
    pub dlq_max_entries: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            dlq_retention_days: 30,
            dlq_max_entries: 10_000,
        }
    }
}

impl WebhookConfig {
    /// Check ranges
    pub fn validate(&self) -> Result<(), String> {
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.base_delay_ms == 0 {
            return Err("retry.base_delay_ms must be positive".to_string());
        }
        if self.dlq_retention_days <= 0 {
            return Err("dlq_retention_days must be positive".to_string());
        }
        if self.dlq_max_entries == 0 {
            return Err("dlq_max_entries must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WebhookConfig::default();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 2_000);
        assert_eq!(config.retry.max_delay_secs, 3_600);
        assert_eq!(config.dlq_max_entries, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: WebhookConfig = toml::from_str(
            r#"
            dlq_retention_days = 7

            [retry]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.dlq_retention_days, 7);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 2_000);

        let broken = WebhookConfig {
            dlq_retention_days: 0,
            ..WebhookConfig::default()
        };
        assert!(broken.validate().is_err());

        let unbounded = WebhookConfig {
            dlq_max_entries: 0,
            ..WebhookConfig::default()
        };
        assert!(unbounded.validate().is_err());
    }
}
