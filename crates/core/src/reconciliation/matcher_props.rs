//! Property-based tests for the matcher.
//!
//! - Determinism: shuffling either input never changes the result
//! - Every pair qualifies and no row is used twice

use std::collections::HashSet;

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::config::ReconciliationConfig;
use tally_shared::types::{AccountId, ProviderTransactionId};

use super::matcher::match_transactions;
use super::types::NormalizedBankTransaction;
use crate::ledger::{NewTransaction, Transaction};

/// Few distinct amounts so that collisions and ties are common.
fn amount() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        Just(Decimal::new(-1200, 0)),
        Just(Decimal::new(-3000, 2)),
        Just(Decimal::new(-999, 2)),
        Just(Decimal::new(250_000, 2)),
    ]
}

fn payee() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("ACH RENT CO".to_string()),
        Just("Rent".to_string()),
        Just("GYM".to_string()),
        Just("Payroll deposit".to_string()),
    ]
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

fn bank_rows() -> impl Strategy<Value = Vec<NormalizedBankTransaction>> {
    prop::collection::vec((1u32..20, amount(), payee()), 0..12).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(idx, (day, amount, payee))| NormalizedBankTransaction {
                provider_transaction_id: ProviderTransactionId::parse(&format!("b{idx}")).unwrap(),
                date: date(day),
                amount,
                payee,
            })
            .collect()
    })
}

fn manual_rows() -> impl Strategy<Value = Vec<Transaction>> {
    prop::collection::vec((1u32..20, amount(), payee()), 0..12).prop_map(|rows| {
        let account = AccountId::new();
        rows.into_iter()
            .enumerate()
            .map(|(idx, (day, amount, payee))| {
                Transaction::manual(
                    account,
                    idx as u64 + 1,
                    NewTransaction {
                        date: date(day),
                        payee,
                        amount,
                        category: None,
                        notes: None,
                    },
                )
            })
            .collect()
    })
}

fn shuffled<T: Clone + std::fmt::Debug>(rows: Vec<T>) -> impl Strategy<Value = (Vec<T>, Vec<T>)> {
    let original = rows.clone();
    Just(rows).prop_shuffle().prop_map(move |copy| (original.clone(), copy))
}

fn config() -> impl Strategy<Value = ReconciliationConfig> {
    (0u32..5, any::<bool>()).prop_map(|(date_window_days, payee_tiebreak)| ReconciliationConfig {
        date_window_days,
        payee_tiebreak,
        ..ReconciliationConfig::default()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// *For any* candidate sets, matching a permutation of the inputs
    /// returns exactly the same result.
    #[test]
    fn prop_matching_is_order_independent(
        (bank, bank_shuffled) in bank_rows().prop_flat_map(shuffled),
        (manual, manual_shuffled) in manual_rows().prop_flat_map(shuffled),
        config in config(),
    ) {
        let expected = match_transactions(&bank, &manual, &config);
        let actual = match_transactions(&bank_shuffled, &manual_shuffled, &config);
        prop_assert_eq!(actual, expected);
    }

    /// *For any* candidate sets, every pair has equal amounts within the
    /// window, each row is used at most once, and every bank row is either
    /// paired or reported unmatched.
    #[test]
    fn prop_pairs_qualify_and_are_one_to_one(
        bank in bank_rows(),
        manual in manual_rows(),
        config in config(),
    ) {
        let result = match_transactions(&bank, &manual, &config);
        let mut banks = HashSet::new();
        let mut manuals = HashSet::new();

        for pair in &result.pairs {
            let partner = manual.iter().find(|m| m.id == pair.manual_id).unwrap();
            prop_assert_eq!(partner.amount, pair.bank.amount);
            let delta = (pair.bank.date - partner.date).num_days().abs();
            prop_assert!(delta <= i64::from(config.date_window_days));
            prop_assert_eq!(delta, pair.date_delta_days);
            prop_assert!(banks.insert(pair.bank.provider_transaction_id.clone()));
            prop_assert!(manuals.insert(pair.manual_id));
        }

        prop_assert_eq!(result.pairs.len() + result.unmatched_bank.len(), bank.len());
        for row in &result.unmatched_bank {
            prop_assert!(!banks.contains(&row.provider_transaction_id));
        }
    }
}
