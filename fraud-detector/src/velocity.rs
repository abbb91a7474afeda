//! Conversion velocity tracking per user

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use ledger_core::UserId;
use serde::{Deserialize, Serialize};

/// Velocity control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    /// Conversions per user in the window at which the indicator fires
    pub max_conversions: u32,

    /// Sliding window duration in minutes (default: 60)
    pub window_minutes: i64,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            max_conversions: 10,
            window_minutes: 60,
        }
    }
}

/// Conversion record for velocity tracking
#[derive(Debug, Clone)]
struct ConversionRecord {
    transaction_id: String,
    timestamp: DateTime<Utc>,
}

/// Per-user sliding window
#[derive(Debug, Default)]
struct UserVelocity {
    conversions: Vec<ConversionRecord>,
}

impl UserVelocity {
    /// Clean up conversions outside the window
    fn cleanup(&mut self, window_start: DateTime<Utc>) {
        self.conversions.retain(|c| c.timestamp >= window_start);
    }

    fn count_since(&self, window_start: DateTime<Utc>) -> usize {
        self.conversions
            .iter()
            .filter(|c| c.timestamp >= window_start)
            .count()
    }
}

/// Tracks how many conversions each user produced recently
#[derive(Debug)]
pub struct VelocityController {
    config: VelocityConfig,
    users: DashMap<UserId, UserVelocity>,
}

impl VelocityController {
    /// Create new velocity controller
    pub fn new(config: VelocityConfig) -> Self {
        Self {
            config,
            users: DashMap::new(),
        }
    }

    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::minutes(self.config.window_minutes)
    }

    /// Conversions recorded for `user_id` inside the window ending at `now`
    pub fn recent_count(&self, user_id: &UserId, now: DateTime<Utc>) -> usize {
        let window_start = self.window_start(now);
        self.users
            .get(user_id)
            .map(|entry| entry.count_since(window_start))
            .unwrap_or(0)
    }

    /// Whether one more conversion at `now` reaches the limit
    pub fn exceeds_limit(&self, user_id: &UserId, now: DateTime<Utc>) -> bool {
        self.recent_count(user_id, now) + 1 > self.config.max_conversions as usize
    }

    /// Record an accepted conversion. Re-recording the same transaction is a no-op.
    pub fn record(&self, user_id: &UserId, transaction_id: &str, at: DateTime<Utc>) {
        let window_start = self.window_start(Utc::now().max(at));
        let mut entry = self.users.entry(user_id.clone()).or_default();
        let user = entry.value_mut();

        user.cleanup(window_start);
        if user.conversions.iter().any(|c| c.transaction_id == transaction_id) {
            return;
        }
        user.conversions.push(ConversionRecord {
            transaction_id: transaction_id.to_string(),
            timestamp: at,
        });
    }

    /// Get current velocity stats for a user
    pub fn get_velocity_stats(&self, user_id: &UserId) -> Option<VelocityStats> {
        let now = Utc::now();
        let window_start = self.window_start(now);

        self.users.get_mut(user_id).map(|mut entry| {
            let user = entry.value_mut();
            user.cleanup(window_start);
            let count = user.conversions.len() as u32;

            VelocityStats {
                user_id: user_id.clone(),
                conversion_count: count,
                remaining_conversions: self.config.max_conversions.saturating_sub(count),
                window_start,
                window_end: now,
            }
        })
    }

    /// Clear velocity data for a user
    pub fn reset_user(&self, user_id: &UserId) {
        self.users.remove(user_id);
    }

    /// Get total number of tracked users
    pub fn tracked_users(&self) -> usize {
        self.users.len()
    }
}

/// Velocity statistics for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityStats {
    /// User
    pub user_id: UserId,
    /// Conversions in window
    pub conversion_count: u32,
    /// Conversions left before the indicator fires
    pub remaining_conversions: u32,
    /// Window start
    pub window_start: DateTime<Utc>,
    /// Window end
    pub window_end: DateTime<Utc>,
}
