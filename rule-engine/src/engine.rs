//! Commission rate evaluation
//!
//! The engine picks a base rate from the category table, lets matching rules
//! adjust it, then derives commission and cashback with currency rounding.
//! Cashback never exceeds commission, and commission never exceeds
//! `amount * max_rate`.

use crate::{
    config::RuleEngineConfig,
    rates::CategoryRates,
    types::{Action, Condition, ConversionRule, Field, Operator, RulePolicy, RuleValue},
    Error, Result,
};
use ledger_core::ConversionEvent;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Where the final rate came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RateSource {
    /// Category table entry
    Category(String),
    /// Category not in table
    Fallback,
    /// Set or scaled by a rule
    Rule(String),
}

/// Result of evaluating one conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateDecision {
    /// Effective commission rate after clamping
    pub rate: Decimal,
    /// Platform commission
    pub commission: Decimal,
    /// User cashback
    pub cashback: Decimal,
    /// Fixed bonus included in cashback (before capping)
    pub bonus: Decimal,
    /// Rate origin
    pub source: RateSource,
    /// Every enabled rule whose conditions held
    pub matched_rules: Vec<String>,
    /// Rules whose rate actions were applied
    pub applied_rules: Vec<String>,
    /// Review flags raised by matching rules
    pub flagged: Vec<String>,
}

impl RateDecision {
    /// Whether any rule asked for manual review
    pub fn needs_review(&self) -> bool {
        !self.flagged.is_empty()
    }
}

/// Rule engine
#[derive(Debug, Clone)]
pub struct RuleEngine {
    policy: RulePolicy,
    max_rate: Decimal,
    user_share: Decimal,
    category_rates: CategoryRates,
    /// Enabled and disabled rules, ascending priority, declaration order kept on ties
    rules: Vec<ConversionRule>,
}

impl RuleEngine {
    /// Build and validate an engine
    pub fn new(config: RuleEngineConfig) -> Result<Self> {
        let rules = config.all_rules()?;
        Self::with_rules(config, rules)
    }

    /// Build from explicit rules, ignoring `config.rules` and `config.rules_file`
    pub fn with_rules(config: RuleEngineConfig, mut rules: Vec<ConversionRule>) -> Result<Self> {
        if config.max_rate <= Decimal::ZERO || config.max_rate > Decimal::ONE {
            return Err(Error::InvalidConfig(format!(
                "max_rate {} must be within (0, 1]",
                config.max_rate
            )));
        }
        if config.user_share < Decimal::ZERO || config.user_share > Decimal::ONE {
            return Err(Error::InvalidConfig(format!(
                "user_share {} must be within [0, 1]",
                config.user_share
            )));
        }

        for (category, rate) in config
            .category_rates
            .rates
            .iter()
            .map(|(c, r)| (c.as_str(), *r))
            .chain(std::iter::once(("fallback", config.category_rates.fallback)))
        {
            if rate < Decimal::ZERO || rate > config.max_rate {
                return Err(Error::InvalidConfig(format!(
                    "rate {} for '{}' must be within [0, {}]",
                    rate, category, config.max_rate
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(invalid(rule, "duplicate rule id"));
            }
            validate_rule(rule, config.max_rate)?;
        }

        rules.sort_by_key(|r| r.priority);

        debug!(
            rules = rules.len(),
            policy = ?config.policy,
            "Rule engine ready"
        );

        Ok(Self {
            policy: config.policy,
            max_rate: config.max_rate,
            user_share: config.user_share,
            category_rates: config.category_rates,
            rules,
        })
    }

    /// Loaded rules in evaluation order
    pub fn rules(&self) -> &[ConversionRule] {
        &self.rules
    }

    /// Category table
    pub fn category_rates(&self) -> &CategoryRates {
        &self.category_rates
    }

    /// Active policy
    pub fn policy(&self) -> RulePolicy {
        self.policy
    }

    /// Rate cap
    pub fn max_rate(&self) -> Decimal {
        self.max_rate
    }

    /// Compute rate, commission and cashback for a conversion
    pub fn evaluate(&self, conversion: &ConversionEvent) -> RateDecision {
        let (base_rate, in_table) = self.category_rates.lookup(&conversion.category);
        let mut source = if in_table {
            RateSource::Category(conversion.category.clone())
        } else {
            RateSource::Fallback
        };

        let matched: Vec<&ConversionRule> = self
            .rules
            .iter()
            .filter(|rule| rule.enabled && rule_matches(rule, conversion))
            .collect();

        let applied: Vec<&ConversionRule> = match self.policy {
            RulePolicy::HighestPriorityWins => matched
                .iter()
                .rev()
                .find(|rule| rule.actions.iter().any(Action::affects_cashback))
                .copied()
                .into_iter()
                .collect(),
            RulePolicy::Cumulative => matched.clone(),
        };

        let mut rate = base_rate;
        let mut bonus = Decimal::ZERO;
        let mut cap: Option<Decimal> = None;

        for rule in &applied {
            for action in &rule.actions {
                match action {
                    Action::SetCommissionRate { rate: r } => {
                        rate = *r;
                        source = RateSource::Rule(rule.id.clone());
                    }
                    Action::MultiplyRate { factor } => {
                        rate *= *factor;
                        source = RateSource::Rule(rule.id.clone());
                    }
                    Action::AddBonus { amount } => bonus += *amount,
                    Action::CapCashback { max } => {
                        cap = Some(cap.map_or(*max, |c| c.min(*max)));
                    }
                    Action::FlagForReview { .. } => {}
                }
            }
        }

        // Flags are collected from every match, independent of policy
        let flagged: Vec<String> = matched
            .iter()
            .flat_map(|rule| {
                rule.actions.iter().filter_map(move |action| match action {
                    Action::FlagForReview { reason } => Some(format!("{}: {}", rule.id, reason)),
                    _ => None,
                })
            })
            .collect();

        if rate > self.max_rate {
            warn!(
                transaction_id = %conversion.transaction_id,
                rate = %rate,
                max_rate = %self.max_rate,
                "Commission rate clamped"
            );
            rate = self.max_rate;
        }
        if rate < Decimal::ZERO {
            rate = Decimal::ZERO;
        }

        let currency = conversion.currency;
        let amount = conversion.order_amount.max(Decimal::ZERO);
        let commission = currency.round(amount * rate);

        let mut cashback = currency.round(commission * self.user_share) + currency.round(bonus);
        if let Some(cap) = cap {
            cashback = cashback.min(cap);
        }
        let cashback = cashback.min(commission).max(Decimal::ZERO);

        let decision = RateDecision {
            rate,
            commission,
            cashback,
            bonus,
            source,
            matched_rules: matched.iter().map(|r| r.id.clone()).collect(),
            applied_rules: applied.iter().map(|r| r.id.clone()).collect(),
            flagged,
        };

        debug!(
            transaction_id = %conversion.transaction_id,
            rate = %decision.rate,
            commission = %decision.commission,
            cashback = %decision.cashback,
            matched = decision.matched_rules.len(),
            "Conversion evaluated"
        );

        decision
    }
}

fn invalid(rule: &ConversionRule, reason: impl Into<String>) -> Error {
    Error::InvalidRule {
        rule_id: rule.id.clone(),
        reason: reason.into(),
    }
}

fn validate_rule(rule: &ConversionRule, max_rate: Decimal) -> Result<()> {
    if rule.id.trim().is_empty() {
        return Err(invalid(rule, "id is empty"));
    }
    if rule.name.trim().is_empty() {
        return Err(invalid(rule, "name is empty"));
    }
    if rule.actions.is_empty() {
        return Err(invalid(rule, "no actions"));
    }

    for condition in &rule.conditions {
        validate_condition(rule, condition)?;
    }

    for action in &rule.actions {
        match action {
            Action::SetCommissionRate { rate } if *rate < Decimal::ZERO || *rate > max_rate => {
                return Err(invalid(
                    rule,
                    format!("rate {} must be within [0, {}]", rate, max_rate),
                ));
            }
            Action::MultiplyRate { factor } if *factor < Decimal::ZERO => {
                return Err(invalid(rule, format!("negative multiplier {}", factor)));
            }
            Action::AddBonus { amount } if *amount < Decimal::ZERO => {
                return Err(invalid(rule, format!("negative bonus {}", amount)));
            }
            Action::CapCashback { max } if *max < Decimal::ZERO => {
                return Err(invalid(rule, format!("negative cap {}", max)));
            }
            Action::FlagForReview { reason } if reason.trim().is_empty() => {
                return Err(invalid(rule, "review flag without reason"));
            }
            _ => {}
        }
    }

    Ok(())
}

fn validate_condition(rule: &ConversionRule, condition: &Condition) -> Result<()> {
    let op = condition.operator;

    if op.is_ordering() {
        if !condition.field.is_numeric() {
            return Err(invalid(
                rule,
                format!("{:?} needs a numeric field, got '{}'", op, condition.field),
            ));
        }
        if condition.value.as_decimal().is_none() {
            return Err(invalid(rule, format!("{:?} needs a numeric value", op)));
        }
    }

    match (op, &condition.value) {
        (Operator::In, RuleValue::List(items)) if items.is_empty() => {
            Err(invalid(rule, "'in' with empty list"))
        }
        (Operator::In, RuleValue::List(_)) => Ok(()),
        (Operator::In, _) => Err(invalid(rule, "'in' needs a list value")),
        (_, RuleValue::List(_)) => Err(invalid(
            rule,
            format!("{:?} does not accept a list value", op),
        )),
        _ => Ok(()),
    }
}

/// A conversion attribute as seen by conditions
#[derive(Debug, Clone)]
enum FieldValue {
    Number(Decimal),
    Text(String),
}

impl FieldValue {
    fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_text(&self) -> String {
        match self {
            FieldValue::Number(n) => n.normalize().to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

fn field_value(conversion: &ConversionEvent, field: &Field) -> Option<FieldValue> {
    match field {
        Field::Amount => Some(FieldValue::Number(conversion.order_amount)),
        Field::Currency => Some(FieldValue::Text(conversion.currency.to_string())),
        Field::Store => Some(FieldValue::Text(conversion.store.clone())),
        Field::Category => Some(FieldValue::Text(conversion.category.clone())),
        Field::UserId => Some(FieldValue::Text(conversion.user_id.as_str().to_string())),
        Field::ProductCount => Some(FieldValue::Number(Decimal::from(conversion.products.len()))),
        Field::Metadata(key) => conversion
            .metadata
            .get(key)
            .map(|v| FieldValue::Text(v.clone())),
    }
}

fn rule_matches(rule: &ConversionRule, conversion: &ConversionEvent) -> bool {
    rule.conditions
        .iter()
        .all(|condition| condition_matches(condition, conversion))
}

fn condition_matches(condition: &Condition, conversion: &ConversionEvent) -> bool {
    // Missing attribute never matches
    let Some(actual) = field_value(conversion, &condition.field) else {
        return false;
    };

    match condition.operator {
        Operator::Equals => values_equal(&actual, &condition.value),
        Operator::NotEquals => !values_equal(&actual, &condition.value),
        Operator::In => match &condition.value {
            RuleValue::List(items) => items.iter().any(|item| values_equal(&actual, item)),
            other => values_equal(&actual, other),
        },
        Operator::Contains => text_pair(&actual, &condition.value)
            .map(|(a, e)| a.contains(&e))
            .unwrap_or(false),
        Operator::StartsWith => text_pair(&actual, &condition.value)
            .map(|(a, e)| a.starts_with(&e))
            .unwrap_or(false),
        op => {
            let (Some(a), Some(e)) = (actual.as_decimal(), condition.value.as_decimal()) else {
                return false;
            };
            let ord = a.cmp(&e);
            match op {
                Operator::GreaterThan => ord == Ordering::Greater,
                Operator::GreaterThanOrEqual => ord != Ordering::Less,
                Operator::LessThan => ord == Ordering::Less,
                Operator::LessThanOrEqual => ord != Ordering::Greater,
                _ => false,
            }
        }
    }
}

fn values_equal(actual: &FieldValue, expected: &RuleValue) -> bool {
    if let (FieldValue::Number(a), Some(e)) = (actual, expected.as_decimal()) {
        return *a == e;
    }
    match expected.as_text() {
        Some(e) => actual.as_text().trim().eq_ignore_ascii_case(e.trim()),
        None => false,
    }
}

fn text_pair(actual: &FieldValue, expected: &RuleValue) -> Option<(String, String)> {
    let expected = expected.as_text()?;
    Some((
        actual.as_text().to_ascii_lowercase(),
        expected.to_ascii_lowercase(),
    ))
}
