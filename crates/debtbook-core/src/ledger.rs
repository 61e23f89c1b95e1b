//! Pure derivations over canonical debt records.
//!
//! Everything here is a function of its inputs and the caller-supplied
//! clock: no I/O, no mutation, no memoization. Derived values are always
//! recomputed from canonical records so they can never go stale behind
//! the cache.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::DebtRecord;

/// Totals and counts for the whole ledger, computed in a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerOverview {
    pub total_i_owe: Decimal,
    pub total_they_owe: Decimal,
    /// Unpaid debts, both directions.
    pub active_count: usize,
    /// Unpaid debts past their due date.
    pub overdue_count: usize,
}

/// Sum of unpaid amounts the user owes others.
pub fn total_owed_by_me(debts: &[DebtRecord]) -> Decimal {
    debts
        .iter()
        .filter(|d| d.is_my_debt && !d.is_paid_back)
        .map(|d| d.amount)
        .sum()
}

/// Sum of unpaid amounts others owe the user.
pub fn total_owed_to_me(debts: &[DebtRecord]) -> Decimal {
    debts
        .iter()
        .filter(|d| !d.is_my_debt && !d.is_paid_back)
        .map(|d| d.amount)
        .sum()
}

/// Signed unpaid balance against one contact: positive means the contact
/// owes the user net, negative means the user owes the contact net.
pub fn net_balance(debts: &[DebtRecord], contact_id: &str) -> Decimal {
    debts
        .iter()
        .filter(|d| d.contact_id == contact_id && !d.is_paid_back)
        .map(|d| if d.is_my_debt { -d.amount } else { d.amount })
        .sum()
}

/// Whole-ledger overview. Field-for-field it matches the individual
/// functions above; the consistency is pinned by a test below.
pub fn overview(debts: &[DebtRecord], now: DateTime<Utc>) -> LedgerOverview {
    let mut result = LedgerOverview::default();
    for debt in debts {
        if debt.is_paid_back {
            continue;
        }
        result.active_count += 1;
        if debt.is_overdue(now) {
            result.overdue_count += 1;
        }
        if debt.is_my_debt {
            result.total_i_owe += debt.amount;
        } else {
            result.total_they_owe += debt.amount;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::str::FromStr;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn debt(
        id: &str,
        contact: &str,
        amount: &str,
        mine: bool,
        paid: bool,
        due_offset_days: i64,
    ) -> DebtRecord {
        DebtRecord {
            record_id: id.to_string(),
            contact_id: contact.to_string(),
            contact_name: contact.to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            description: "test".to_string(),
            created_date: now() - Duration::days(30),
            due_date: now() + Duration::days(due_offset_days),
            is_my_debt: mine,
            is_paid_back: paid,
        }
    }

    fn sample() -> Vec<DebtRecord> {
        vec![
            debt("d1", "c1", "50", true, false, 10),   // I owe, active
            debt("d2", "c1", "20.50", false, false, -1), // they owe, overdue
            debt("d3", "c2", "100", false, false, 5),  // they owe, active
            debt("d4", "c2", "75", true, true, -30),   // paid, excluded everywhere
            debt("d5", "c1", "5", true, false, -2),    // I owe, overdue
        ]
    }

    #[test]
    fn test_directional_totals_exclude_paid() {
        let debts = sample();
        assert_eq!(total_owed_by_me(&debts), Decimal::from_str("55").unwrap());
        assert_eq!(total_owed_to_me(&debts), Decimal::from_str("120.50").unwrap());
    }

    #[test]
    fn test_net_balance_sign_convention() {
        let debts = sample();
        // c1: they owe 20.50, I owe 55 -> net negative
        assert_eq!(
            net_balance(&debts, "c1"),
            Decimal::from_str("-34.50").unwrap()
        );
        // c2: they owe 100, my 75 is paid -> net positive
        assert_eq!(net_balance(&debts, "c2"), Decimal::from(100));
        // unknown contact: zero
        assert_eq!(net_balance(&debts, "c9"), Decimal::ZERO);
    }

    #[test]
    fn test_overview_matches_individual_functions() {
        let debts = sample();
        let view = overview(&debts, now());
        assert_eq!(view.total_i_owe, total_owed_by_me(&debts));
        assert_eq!(view.total_they_owe, total_owed_to_me(&debts));
        assert_eq!(
            view.active_count,
            debts.iter().filter(|d| !d.is_paid_back).count()
        );
        assert_eq!(
            view.overdue_count,
            debts
                .iter()
                .filter(|d| !d.is_paid_back && d.is_overdue(now()))
                .count()
        );
        assert_eq!(view.active_count, 4);
        assert_eq!(view.overdue_count, 2);
    }

    #[test]
    fn test_empty_ledger() {
        let view = overview(&[], now());
        assert_eq!(view, LedgerOverview::default());
        assert_eq!(total_owed_by_me(&[]), Decimal::ZERO);
        assert_eq!(net_balance(&[], "c1"), Decimal::ZERO);
    }

    #[test]
    fn test_deterministic_for_fixed_inputs() {
        let debts = sample();
        let first = overview(&debts, now());
        let second = overview(&debts, now());
        assert_eq!(first, second);
        // inputs are untouched
        assert_eq!(debts, sample());
    }
}
