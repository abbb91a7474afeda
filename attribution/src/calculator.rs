//! Attribution calculator
//!
//! Output is reporting only. Nothing here feeds back into the credited
//! cashback amount.

use crate::{
    config::AttributionConfig,
    model::{AttributionModel, ModelKind},
    types::{AttributedTouchpoint, AttributionRecord, Touchpoint},
    Result,
};
use chrono::{Duration, Utc};
use ledger_core::{ClickEvent, ConversionEvent};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::cmp::Ordering;
use tracing::debug;

/// Attribution calculator
pub struct AttributionCalculator {
    model: Box<dyn AttributionModel>,
    kind: ModelKind,
    window: Duration,
    max_touchpoints: usize,
}

impl std::fmt::Debug for AttributionCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributionCalculator")
            .field("model", &self.kind)
            .field("window", &self.window)
            .field("max_touchpoints", &self.max_touchpoints)
            .finish()
    }
}

impl AttributionCalculator {
    /// Create from configuration
    pub fn new(config: &AttributionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model: config.model.build()?,
            kind: config.model,
            window: Duration::days(i64::from(config.window_days)),
            max_touchpoints: config.max_touchpoints,
        })
    }

    /// Default model
    pub fn model(&self) -> ModelKind {
        self.kind
    }

    /// Touchpoints for a conversion: the user's clicks inside the window,
    /// oldest first. The referenced click counts even if outside the window.
    pub fn touchpoints(&self, conversion: &ConversionEvent, clicks: &[ClickEvent]) -> Vec<Touchpoint> {
        let converted_at = conversion.occurred_at;
        let window_start = converted_at - self.window;

        let mut selected: Vec<&ClickEvent> = clicks
            .iter()
            .filter(|c| c.user_id == conversion.user_id)
            .filter(|c| {
                let referenced = conversion.click_id.as_deref() == Some(c.click_id.as_str());
                let in_window = c.clicked_at >= window_start && c.clicked_at <= converted_at;
                referenced || in_window
            })
            .collect();

        selected.sort_by(|a, b| {
            a.clicked_at
                .cmp(&b.clicked_at)
                .then_with(|| a.click_id.cmp(&b.click_id))
        });
        selected.dedup_by(|a, b| a.click_id == b.click_id);

        if selected.len() > self.max_touchpoints {
            let drop = selected.len() - self.max_touchpoints;
            selected.drain(..drop);
        }

        if selected.is_empty() {
            return vec![Touchpoint::direct(converted_at)];
        }
        selected.into_iter().map(Touchpoint::from).collect()
    }

    /// Attribute with the configured model
    pub fn attribute(&self, conversion: &ConversionEvent, clicks: &[ClickEvent]) -> AttributionRecord {
        let touchpoints = self.touchpoints(conversion, clicks);
        self.attribute_touchpoints(self.model.as_ref(), conversion, touchpoints)
    }

    /// Attribute with another model (for comparison reports)
    pub fn attribute_with(
        &self,
        kind: ModelKind,
        conversion: &ConversionEvent,
        clicks: &[ClickEvent],
    ) -> Result<AttributionRecord> {
        let model = kind.build()?;
        let touchpoints = self.touchpoints(conversion, clicks);
        Ok(self.attribute_touchpoints(model.as_ref(), conversion, touchpoints))
    }

    fn attribute_touchpoints(
        &self,
        model: &dyn AttributionModel,
        conversion: &ConversionEvent,
        touchpoints: Vec<Touchpoint>,
    ) -> AttributionRecord {
        let weights = normalize(model.weights(&touchpoints, conversion.occurred_at), touchpoints.len());

        let places = conversion.currency.decimal_places();
        let values = allocate(conversion.order_amount, &weights, places);
        let commissions = allocate(conversion.commission, &weights, places);

        let touchpoints: Vec<AttributedTouchpoint> = touchpoints
            .into_iter()
            .zip(weights)
            .zip(values.into_iter().zip(commissions))
            .map(|((touchpoint, weight), (value, commission))| AttributedTouchpoint {
                touchpoint,
                weight,
                attributed_value: value,
                attributed_commission: commission,
            })
            .collect();

        debug!(
            transaction_id = %conversion.transaction_id,
            model = model.name(),
            touchpoints = touchpoints.len(),
            "Conversion attributed"
        );

        AttributionRecord {
            conversion_id: conversion.id,
            transaction_id: conversion.transaction_id.clone(),
            model: model.name().to_string(),
            touchpoints,
            total_value: conversion.order_amount,
            total_commission: conversion.commission,
            computed_at: Utc::now(),
        }
    }
}

/// Scale raw weights to sum to one; degenerate input becomes uniform
fn normalize(raw: Vec<f64>, n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let cleaned: Vec<f64> = raw
        .into_iter()
        .chain(std::iter::repeat(0.0))
        .take(n)
        .map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
        .collect();
    let sum: f64 = cleaned.iter().sum();
    if sum <= 0.0 {
        return vec![1.0 / n as f64; n];
    }
    cleaned.into_iter().map(|w| w / sum).collect()
}

/// Split `total` by `weights` so the parts sum exactly to `total`.
///
/// Each share is truncated to the unit implied by `places` (or the scale of
/// `total`, if finer); the leftover units go to the largest fractional
/// remainders, earliest index first on ties.
pub fn allocate(total: Decimal, weights: &[f64], places: u32) -> Vec<Decimal> {
    if weights.is_empty() {
        return Vec::new();
    }
    if total.is_sign_negative() {
        return allocate(-total, weights, places).into_iter().map(|d| -d).collect();
    }

    let places = places.max(total.scale());
    let unit = Decimal::new(1, places);

    let mut parts = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for &w in weights {
        let exact = Decimal::from_f64(w).map_or(Decimal::ZERO, |w| total * w);
        let floor = exact.round_dp_with_strategy(places, RoundingStrategy::ToZero);
        remainders.push(exact - floor);
        parts.push(floor);
    }

    let allocated: Decimal = parts.iter().copied().sum();
    let mut leftover = total - allocated;

    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| {
        remainders[b]
            .partial_cmp(&remainders[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    if leftover >= unit {
        let units = (leftover / unit).trunc();
        let n = Decimal::from(order.len());
        let each = (units / n).trunc();
        let extra = units - each * n;
        for (rank, &idx) in order.iter().enumerate() {
            let bonus = if Decimal::from(rank) < extra { unit } else { Decimal::ZERO };
            parts[idx] += each * unit + bonus;
        }
        leftover -= units * unit;
    }
    // Weights summing above one can over-allocate; take it back from the end
    while leftover < Decimal::ZERO {
        let Some(idx) = order.iter().rev().copied().find(|&i| parts[i] >= unit) else {
            break;
        };
        parts[idx] -= unit;
        leftover += unit;
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use ledger_core::{Currency, TransactionStatus, UserId};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn conversion(click_id: Option<&str>, commission: Decimal) -> ConversionEvent {
        ConversionEvent {
            id: Uuid::new_v4(),
            transaction_id: "T1".to_string(),
            user_id: UserId::new("u1"),
            click_id: click_id.map(str::to_string),
            order_id: None,
            affiliate_id: None,
            store: "amazon".to_string(),
            category: "electronics".to_string(),
            order_amount: dec!(4500),
            currency: Currency::INR,
            commission_rate: dec!(0.035),
            commission,
            cashback: commission,
            products: Vec::new(),
            country: None,
            user_agent: None,
            ip: None,
            status: TransactionStatus::Pending,
            occurred_at: Utc::now(),
            metadata: Default::default(),
        }
    }

    fn click(id: &str, user: &str, source: &str, at: DateTime<Utc>) -> ClickEvent {
        ClickEvent {
            click_id: id.to_string(),
            user_id: UserId::new(user),
            source: source.to_string(),
            destination_url: "https://shop.example/p/1".to_string(),
            user_agent: None,
            ip: None,
            country: None,
            clicked_at: at,
        }
    }

    fn calculator(model: ModelKind) -> AttributionCalculator {
        AttributionCalculator::new(&AttributionConfig {
            model,
            ..AttributionConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_last_touch_gets_full_credit() {
        let conv = conversion(None, dec!(157.50));
        let clicks = vec![
            click("c1", "u1", "email", conv.occurred_at - Duration::days(3)),
            click("c2", "u1", "telegram", conv.occurred_at - Duration::hours(1)),
        ];

        let record = calculator(ModelKind::LastTouch).attribute(&conv, &clicks);
        assert_eq!(record.model, "last_touch");
        assert_eq!(record.touchpoints.len(), 2);
        assert_eq!(record.touchpoints[1].touchpoint.source, "telegram");
        assert_eq!(record.touchpoints[1].attributed_commission, dec!(157.50));
        assert_eq!(record.touchpoints[0].attributed_commission, Decimal::ZERO);
        assert_eq!(record.primary().unwrap().touchpoint.source, "telegram");
    }

    #[test]
    fn test_direct_touchpoint_when_no_clicks() {
        let conv = conversion(None, dec!(10));
        let record = calculator(ModelKind::Linear).attribute(&conv, &[]);
        assert_eq!(record.touchpoints.len(), 1);
        assert!(record.touchpoints[0].touchpoint.is_direct());
        assert_eq!(record.touchpoints[0].weight, 1.0);
        assert_eq!(record.commission_sum(), dec!(10));
    }

    #[test]
    fn test_window_and_user_filter() {
        let conv = conversion(Some("old"), dec!(50));
        let clicks = vec![
            click("old", "u1", "email", conv.occurred_at - Duration::days(45)),
            click("stale", "u1", "search", conv.occurred_at - Duration::days(40)),
            click("other", "u2", "email", conv.occurred_at - Duration::hours(2)),
            click("recent", "u1", "telegram", conv.occurred_at - Duration::hours(2)),
            click("future", "u1", "telegram", conv.occurred_at + Duration::hours(2)),
        ];

        let tps = calculator(ModelKind::LastTouch).touchpoints(&conv, &clicks);
        let ids: Vec<_> = tps.iter().filter_map(|t| t.click_id.as_deref()).collect();
        assert_eq!(ids, vec!["old", "recent"]);
    }

    #[test]
    fn test_linear_split_sums_exactly() {
        let conv = conversion(None, dec!(100));
        let clicks: Vec<_> = (0..3)
            .map(|i| click(&format!("c{}", i), "u1", "email", conv.occurred_at - Duration::hours(3 - i)))
            .collect();

        let record = calculator(ModelKind::Linear).attribute(&conv, &clicks);
        let shares: Vec<_> = record
            .touchpoints
            .iter()
            .map(|t| t.attributed_commission)
            .collect();
        assert_eq!(shares, vec![dec!(33.34), dec!(33.33), dec!(33.33)]);
        assert_eq!(record.commission_sum(), dec!(100));
        assert_eq!(record.value_sum(), dec!(4500));
        assert!((record.weight_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_attribute_with_other_model() {
        let conv = conversion(None, dec!(90));
        let clicks = vec![
            click("c1", "u1", "email", conv.occurred_at - Duration::hours(5)),
            click("c2", "u1", "search", conv.occurred_at - Duration::hours(1)),
        ];
        let calc = calculator(ModelKind::LastTouch);
        let record = calc
            .attribute_with(ModelKind::FirstTouch, &conv, &clicks)
            .unwrap();
        assert_eq!(record.model, "first_touch");
        assert_eq!(record.touchpoints[0].attributed_commission, dec!(90));
    }

    #[test]
    fn test_allocate_zero_decimal_currency() {
        let parts = allocate(dec!(10), &[1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0], 0);
        assert_eq!(parts.iter().copied().sum::<Decimal>(), dec!(10));
        assert_eq!(parts, vec![dec!(4), dec!(3), dec!(3)]);
    }
}
