//! Click registry
//!
//! Clicks are immutable: recording a click id twice keeps the first record.

use dashmap::{mapref::entry::Entry, DashMap};
use ledger_core::{ClickEvent, Error, Result, UserId};

/// In-memory click store indexed by click id and by user
#[derive(Debug, Default)]
pub struct ClickRegistry {
    clicks: DashMap<String, ClickEvent>,
    by_user: DashMap<UserId, Vec<String>>,
}

impl ClickRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a click; returns the stored click
    pub fn record(&self, mut click: ClickEvent) -> Result<ClickEvent> {
        click.click_id = click.click_id.trim().to_string();
        if click.click_id.is_empty() {
            return Err(Error::Validation("click_id is required".to_string()));
        }
        if click.user_id.is_blank() {
            return Err(Error::Validation("user_id is required".to_string()));
        }

        match self.clicks.entry(click.click_id.clone()) {
            Entry::Occupied(existing) => {
                tracing::debug!(click_id = %click.click_id, "Click already recorded");
                Ok(existing.get().clone())
            }
            Entry::Vacant(slot) => {
                self.by_user
                    .entry(click.user_id.clone())
                    .or_default()
                    .push(click.click_id.clone());
                tracing::debug!(
                    click_id = %click.click_id,
                    user_id = %click.user_id,
                    source = %click.source,
                    "Recorded click"
                );
                slot.insert(click.clone());
                Ok(click)
            }
        }
    }

    /// Get a click
    pub fn get(&self, click_id: &str) -> Option<ClickEvent> {
        self.clicks.get(click_id).map(|c| c.value().clone())
    }

    /// A user's clicks, oldest first
    pub fn for_user(&self, user_id: &UserId) -> Vec<ClickEvent> {
        let ids = match self.by_user.get(user_id) {
            Some(ids) => ids.value().clone(),
            None => return Vec::new(),
        };
        let mut clicks: Vec<ClickEvent> = ids.iter().filter_map(|id| self.get(id)).collect();
        clicks.sort_by_key(|c| c.clicked_at);
        clicks
    }

    /// Clicks recorded
    pub fn len(&self) -> usize {
        self.clicks.len()
    }

    /// Whether empty
    pub fn is_empty(&self) -> bool {
        self.clicks.is_empty()
    }
}
