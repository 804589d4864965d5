//! Property-based tests for LedgerStore.
//!
//! - Running balances are a prefix sum over `(date, sequence)` after any mix
//!   of inserts, removes, conversions and anchor moves, counted from the
//!   pivot row when the anchor is repositioned
//! - Pruning history before the anchor keeps every remaining balance
//! - Reconstructing a balance and re-anchoring on it round-trips
//! - Rolling back to a savepoint restores the exact prior state

use chrono::{Datelike, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::types::{Currency, ProviderTransactionId};

use super::store::LedgerStore;
use super::types::{Account, NewTransaction, Transaction};

#[derive(Debug, Clone)]
enum Op {
    Insert { day: u32, cents: i64 },
    Remove(usize),
    Convert(usize),
    SetStartingBalance { cents: i64 },
    RepositionAnchor { pick: usize, cents: i64 },
    PruneBeforeAnchor,
    RemoveAnchorRow,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u32..28, -500_000i64..500_000).prop_map(|(day, cents)| Op::Insert { day, cents }),
        1 => any::<usize>().prop_map(Op::Remove),
        1 => any::<usize>().prop_map(Op::Convert),
        1 => (-1_000_000i64..1_000_000).prop_map(|cents| Op::SetStartingBalance { cents }),
        1 => (any::<usize>(), -1_000_000i64..1_000_000)
            .prop_map(|(pick, cents)| Op::RepositionAnchor { pick, cents }),
        1 => Just(Op::PruneBeforeAnchor),
        1 => Just(Op::RemoveAnchorRow),
    ]
}

/// Strategy for a starting balance (-10,000.00 to 10,000.00).
fn starting_balance() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..1_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, day).unwrap()
}

fn new_store(balance: Decimal) -> LedgerStore {
    LedgerStore::new(Account::new("Props", Currency::Usd, balance, date(1)))
}

fn apply(store: &mut LedgerStore, op: &Op, counter: &mut usize) {
    match *op {
        Op::Insert { day, cents } => {
            // Rows may not precede the anchor date.
            let day = day.max(store.account().anchor.date.day());
            let sequence = store.allocate_sequence();
            let transaction = Transaction::manual(
                store.account().id,
                sequence,
                NewTransaction {
                    date: date(day),
                    payee: format!("p{sequence}"),
                    amount: Decimal::new(cents, 2),
                    category: None,
                    notes: None,
                },
            );
            store.insert(transaction).unwrap();
        }
        Op::Remove(pick) => {
            if !store.is_empty() {
                let rows = store.list_ordered();
                let id = rows[pick % rows.len()].transaction.id;
                store.remove(id).unwrap();
            }
        }
        Op::Convert(pick) => {
            let pending = store.unreconciled();
            if !pending.is_empty() {
                *counter += 1;
                let bank_id = ProviderTransactionId::parse(&format!("bank-{counter}")).unwrap();
                store.convert(pending[pick % pending.len()].id, bank_id).unwrap();
            }
        }
        Op::SetStartingBalance { cents } => {
            store
                .set_starting_balance(Decimal::new(cents, 2), date(1))
                .unwrap();
        }
        Op::RepositionAnchor { pick, cents } => {
            if !store.is_empty() {
                let rows = store.list_ordered();
                let id = rows[pick % rows.len()].transaction.id;
                store.reposition_anchor(Decimal::new(cents, 2), id).unwrap();
            }
        }
        Op::PruneBeforeAnchor => {
            store.prune_before_anchor();
        }
        Op::RemoveAnchorRow => {
            if let Some(pivot) = store.account().anchor.after {
                store.remove(pivot).unwrap();
            }
        }
    }
}

fn assert_prefix_sums(store: &LedgerStore) -> Result<(), TestCaseError> {
    let anchor = store.account().anchor;
    let rows = store.list_ordered();
    for pair in rows.windows(2) {
        prop_assert!(pair[0].transaction.sort_key() < pair[1].transaction.sort_key());
    }

    let pivot = match anchor.after {
        Some(id) => {
            let pos = rows.iter().position(|row| row.transaction.id == id);
            prop_assert!(pos.is_some(), "anchor row {} is missing", id);
            pos
        }
        None => {
            prop_assert!(rows.iter().all(|row| row.transaction.date >= anchor.date));
            None
        }
    };

    let mut expected = anchor.balance;
    for (pos, row) in rows.iter().enumerate() {
        match pivot {
            Some(p) if pos < p => {
                prop_assert!(row.before_anchor);
                prop_assert_eq!(row.running_balance, None);
            }
            Some(p) if pos == p => {
                prop_assert!(!row.before_anchor);
                prop_assert_eq!(row.running_balance, Some(anchor.balance));
            }
            _ => {
                expected += row.transaction.amount;
                prop_assert!(!row.before_anchor);
                prop_assert_eq!(row.running_balance, Some(expected));
            }
        }
    }
    prop_assert_eq!(store.current_balance(), expected);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// *For any* sequence of mutations, every running balance equals the
    /// anchor plus the sum of all amounts up to and including that row, or
    /// after the pivot row when the anchor is repositioned.
    #[test]
    fn prop_balance_invariant(
        balance in starting_balance(),
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let mut store = new_store(balance);
        let mut counter = 0;
        for op in &ops {
            apply(&mut store, op, &mut counter);
            assert_prefix_sums(&store)?;
        }
    }

    /// *For any* repositioned anchor, deleting the earlier history leaves a
    /// plain anchor and the same balance on every kept row.
    #[test]
    fn prop_prune_keeps_balances(
        balance in starting_balance(),
        ops in prop::collection::vec(op_strategy(), 1..40),
        pick in any::<usize>(),
        anchor_cents in -1_000_000i64..1_000_000,
    ) {
        let mut store = new_store(balance);
        let mut counter = 0;
        for op in &ops {
            apply(&mut store, op, &mut counter);
        }
        prop_assume!(!store.is_empty());

        let rows = store.list_ordered();
        let pos = pick % rows.len();
        store
            .reposition_anchor(Decimal::new(anchor_cents, 2), rows[pos].transaction.id)
            .unwrap();
        let kept: Vec<_> = store.list_ordered().into_iter().skip(pos).collect();

        prop_assert_eq!(store.prune_before_anchor(), pos);
        prop_assert_eq!(store.account().anchor.after, None);
        prop_assert_eq!(store.list_ordered(), kept);
        assert_prefix_sums(&store)?;
    }

    /// *For any* ledger and target, re-anchoring on the balance reconstructed
    /// from a known current balance yields that balance at the target and
    /// the known balance at the end.
    #[test]
    fn prop_reconstruction_round_trip(
        ops in prop::collection::vec(op_strategy(), 1..40),
        pick in any::<usize>(),
        known in starting_balance(),
    ) {
        let mut store = new_store(Decimal::ZERO);
        let mut counter = 0;
        for op in &ops {
            apply(&mut store, op, &mut counter);
        }
        prop_assume!(!store.is_empty());

        let rows = store.list_ordered();
        let target = rows[pick % rows.len()].transaction.id;
        let reconstructed = store.balance_at_with(known, target).unwrap();
        store.reposition_anchor(reconstructed, target).unwrap();

        prop_assert_eq!(store.row(target).unwrap().running_balance, Some(reconstructed));
        prop_assert_eq!(store.current_balance(), known);
        for row in store.list_ordered() {
            prop_assert_eq!(row.before_anchor, row.running_balance.is_none());
        }
    }

    /// *For any* prefix and suffix of mutations, rolling back the suffix
    /// restores the rows, balances and anchor exactly.
    #[test]
    fn prop_rollback_restores_state(
        balance in starting_balance(),
        prefix in prop::collection::vec(op_strategy(), 0..30),
        suffix in prop::collection::vec(op_strategy(), 1..30),
    ) {
        let mut store = new_store(balance);
        let mut counter = 0;
        for op in &prefix {
            apply(&mut store, op, &mut counter);
        }
        let rows = store.list_ordered();
        let anchor = store.account().anchor;
        let savepoint = store.savepoint();

        for op in &suffix {
            apply(&mut store, op, &mut counter);
        }
        store.rollback_to(savepoint);

        prop_assert_eq!(store.list_ordered(), rows);
        prop_assert_eq!(store.account().anchor, anchor);
    }
}
