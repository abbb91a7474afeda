//! Read-only ledger analytics

use chrono::{DateTime, Utc};
use ledger_core::{
    CashbackTransaction, CommissionRecord, TransactionStatus, UserId, WithdrawalRequest,
    WithdrawalStatus,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Inclusive time range; open ends are unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Start
    pub from: Option<DateTime<Utc>>,
    /// End
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Range between two instants
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// Whether `at` lies inside the range
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

/// Aggregate figures over transactions, withdrawals and commissions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    /// Distinct users with a transaction in scope
    pub total_users: usize,
    /// Transactions in scope
    pub total_transactions: usize,
    /// Pending transactions
    pub pending_count: usize,
    /// Confirmed transactions
    pub confirmed_count: usize,
    /// Cancelled transactions
    pub cancelled_count: usize,
    /// Confirmed cashback
    pub total_earned: Decimal,
    /// Cashback awaiting confirmation
    pub total_pending: Decimal,
    /// Completed withdrawals
    pub total_withdrawn: Decimal,
    /// Platform commission recorded against in-scope transactions
    pub total_commission: Decimal,
    /// Mean confirmed cashback per confirmed transaction
    pub average_cashback: Decimal,
}

/// Compute analytics.
///
/// Transactions are scoped by user and creation time, withdrawals by user
/// and creation time, commissions by the transactions in scope.
pub fn compute(
    transactions: &[CashbackTransaction],
    withdrawals: &[WithdrawalRequest],
    commissions: &[CommissionRecord],
    user_id: Option<&UserId>,
    range: DateRange,
) -> Analytics {
    let in_scope = |owner: &UserId, at: DateTime<Utc>| {
        user_id.map_or(true, |u| u == owner) && range.contains(at)
    };

    let mut analytics = Analytics::default();
    let mut users = HashSet::new();
    let mut scoped_ids = HashSet::new();

    for tx in transactions.iter().filter(|tx| in_scope(&tx.user_id, tx.created_at)) {
        analytics.total_transactions += 1;
        users.insert(&tx.user_id);
        scoped_ids.insert(tx.transaction_id.as_str());
        match tx.status {
            TransactionStatus::Pending => {
                analytics.pending_count += 1;
                analytics.total_pending += tx.amount;
            }
            TransactionStatus::Confirmed => {
                analytics.confirmed_count += 1;
                analytics.total_earned += tx.amount;
            }
            TransactionStatus::Cancelled => analytics.cancelled_count += 1,
        }
    }
    analytics.total_users = users.len();

    analytics.total_withdrawn = withdrawals
        .iter()
        .filter(|w| w.status == WithdrawalStatus::Completed)
        .filter(|w| in_scope(&w.user_id, w.created_at))
        .map(|w| w.amount)
        .sum();

    let commission_by_tx: HashMap<&str, Decimal> = commissions
        .iter()
        .map(|c| (c.transaction_id.as_str(), c.amount))
        .collect();
    analytics.total_commission = scoped_ids
        .iter()
        .filter_map(|id| commission_by_tx.get(id))
        .copied()
        .sum();

    if analytics.confirmed_count > 0 {
        analytics.average_cashback =
            (analytics.total_earned / Decimal::from(analytics.confirmed_count)).round_dp(2);
    }
    analytics
}
