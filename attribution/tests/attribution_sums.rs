//! Weight and money sums hold for every model and touchpoint count

use attribution::{AttributionCalculator, AttributionConfig, ModelKind};
use chrono::{Duration, Utc};
use ledger_core::{ClickEvent, ConversionEvent, Currency, TransactionStatus, UserId};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

fn arb_model() -> impl Strategy<Value = ModelKind> {
    prop_oneof![
        Just(ModelKind::LastTouch),
        Just(ModelKind::FirstTouch),
        Just(ModelKind::Linear),
        (0u32..=50, 0u32..=50).prop_map(|(f, l)| ModelKind::PositionBased {
            first: f as f64 / 100.0,
            last: l as f64 / 100.0,
        }),
        (1u32..=500).prop_map(|h| ModelKind::TimeDecay {
            half_life_hours: h as f64,
        }),
    ]
}

fn conversion(amount: Decimal, commission: Decimal, currency: Currency) -> ConversionEvent {
    ConversionEvent {
        id: Uuid::new_v4(),
        transaction_id: "T-prop".to_string(),
        user_id: UserId::new("u1"),
        click_id: None,
        order_id: None,
        affiliate_id: None,
        store: "store".to_string(),
        category: "fashion".to_string(),
        order_amount: amount,
        currency,
        commission_rate: Decimal::ZERO,
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

proptest! {
    #[test]
    fn weights_and_money_sum_to_totals(
        model in arb_model(),
        offsets in prop::collection::vec(0i64..(30 * 24 * 60), 0..12),
        amount_cents in 1i64..10_000_000,
        commission_bp in 0i64..2_500,
        yen in any::<bool>(),
    ) {
        let currency = if yen { Currency::JPY } else { Currency::INR };
        let places = currency.decimal_places();
        let amount = Decimal::new(amount_cents, 2).round_dp(places);
        let commission = currency.round(amount * Decimal::new(commission_bp, 4));
        let conv = conversion(amount, commission, currency);

        let clicks: Vec<ClickEvent> = offsets
            .iter()
            .enumerate()
            .map(|(i, minutes)| ClickEvent {
                click_id: format!("c{}", i),
                user_id: UserId::new("u1"),
                source: if i % 2 == 0 { "email".into() } else { "search".into() },
                destination_url: "https://shop.example".into(),
                user_agent: None,
                ip: None,
                country: None,
                clicked_at: conv.occurred_at - Duration::minutes(*minutes),
            })
            .collect();

        let calc = AttributionCalculator::new(&AttributionConfig {
            model,
            ..AttributionConfig::default()
        })
        .unwrap();
        let record = calc.attribute(&conv, &clicks);

        prop_assert_eq!(record.touchpoints.len(), clicks.len().max(1));
        prop_assert!((record.weight_sum() - 1.0).abs() < 1e-9);
        prop_assert!(record.touchpoints.iter().all(|t| t.weight >= 0.0));
        prop_assert_eq!(record.commission_sum(), commission);
        prop_assert_eq!(record.value_sum(), amount);
        prop_assert!(record.touchpoints.iter().all(|t| !t.attributed_commission.is_sign_negative()));
    }
}
