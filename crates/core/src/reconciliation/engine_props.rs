//! Property-based tests for sync passes.
//!
//! - Replaying a batch is a no-op
//! - Converted rows never change again

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::config::{ReconciliationConfig, SignConvention};
use tally_shared::types::{AccountId, Currency};

use super::engine::reconcile;
use super::types::BankTransaction;
use crate::ledger::{Account, LedgerStore, NewTransaction, ReconciliationStatus, Transaction};

fn amount() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        Just(Decimal::new(-1200, 0)),
        Just(Decimal::new(-45, 0)),
        Just(Decimal::new(1999, 2)),
    ]
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 4, day).unwrap()
}

fn config() -> ReconciliationConfig {
    ReconciliationConfig {
        sign_convention: SignConvention::NegativeIsDebit,
        ..ReconciliationConfig::default()
    }
}

fn ledger(manual: &[(u32, Decimal)]) -> LedgerStore {
    let mut store = LedgerStore::new(Account::new("Props", Currency::Usd, Decimal::ZERO, date(1)));
    for &(day, amount) in manual {
        let sequence = store.allocate_sequence();
        let transaction = Transaction::manual(
            store.account().id,
            sequence,
            NewTransaction {
                date: date(day),
                payee: "Manual".to_string(),
                amount,
                category: None,
                notes: None,
            },
        );
        store.insert(transaction).unwrap();
    }
    store
}

fn batch(account: AccountId, prefix: &str, rows: &[(u32, Decimal)]) -> Vec<BankTransaction> {
    rows.iter()
        .enumerate()
        .map(|(idx, &(day, amount))| BankTransaction {
            provider_transaction_id: format!("{prefix}-{idx}"),
            account_id: account,
            date: date(day),
            amount,
            payee_or_merchant_name: "BANK".to_string(),
        })
        .collect()
}

fn rows() -> impl Strategy<Value = Vec<(u32, Decimal)>> {
    prop::collection::vec((1u32..15, amount()), 0..10)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// *For any* ledger and batch, reconciling the same batch twice leaves
    /// the ledger exactly as reconciling it once.
    #[test]
    fn prop_sync_is_idempotent(manual in rows(), incoming in rows()) {
        let mut store = ledger(&manual);
        let feed = batch(store.account().id, "b", &incoming);

        let first = reconcile(&mut store, feed.clone(), &config()).unwrap();
        prop_assert_eq!(first.converted + first.inserted, incoming.len());
        let once = store.list_ordered();

        let second = reconcile(&mut store, feed, &config()).unwrap();
        prop_assert!(!second.changed_ledger());
        prop_assert_eq!(second.skipped_duplicates, incoming.len());
        prop_assert_eq!(store.list_ordered(), once);
    }

    /// *For any* follow-up batch, rows converted by an earlier pass keep
    /// their status and bank link.
    #[test]
    fn prop_conversion_is_one_way(
        manual in rows(),
        incoming in rows(),
        later in rows(),
    ) {
        let mut store = ledger(&manual);
        let account = store.account().id;
        reconcile(&mut store, batch(account, "first", &incoming), &config()).unwrap();
        let converted: Vec<Transaction> = store
            .list_ordered()
            .into_iter()
            .map(|row| row.transaction)
            .filter(|t| t.status == ReconciliationStatus::Converted)
            .collect();

        reconcile(&mut store, batch(account, "later", &later), &config()).unwrap();
        for before in &converted {
            let after = store.get(before.id).unwrap();
            prop_assert_eq!(after.status, ReconciliationStatus::Converted);
            prop_assert_eq!(&after.linked_transaction_id, &before.linked_transaction_id);
        }
    }
}
