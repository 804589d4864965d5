//! Pairing of bank rows with pending manual rows.
//!
//! A pair qualifies when both amounts are exactly equal (after sign
//! normalization) and the dates are at most `date_window_days` apart.
//!
//! Assignment is greedy, not a global optimum. Every qualifying edge is
//! ranked by
//!
//! 1. absolute date distance
//! 2. payee token overlap, larger first (when `payee_tiebreak` is on)
//! 3. manual insertion sequence, oldest first, then manual id
//! 4. bank date, then bank provider id
//!
//! and edges are claimed in that order whenever both ends are still free.
//! The result is stable and easy to explain; swapping in a minimum-cost
//! assignment would not change the function's contract.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use tally_shared::config::ReconciliationConfig;

use super::normalize::payee_tokens;
use super::types::{Ambiguity, MatchPair, MatchResult, NormalizedBankTransaction};
use crate::ledger::Transaction;

struct Edge {
    date_delta: i64,
    payee_rank: Reverse<usize>,
    manual: usize,
    bank: usize,
}

/// Proposes pairings between bank rows and unreconciled manual rows.
///
/// Pure and deterministic: the result does not depend on input order.
#[must_use]
pub fn match_transactions(
    bank: &[NormalizedBankTransaction],
    manual: &[Transaction],
    config: &ReconciliationConfig,
) -> MatchResult {
    let mut bank: Vec<&NormalizedBankTransaction> = bank.iter().collect();
    bank.sort_by(|a, b| {
        (a.date, &a.provider_transaction_id).cmp(&(b.date, &b.provider_transaction_id))
    });
    let mut manual: Vec<&Transaction> = manual.iter().filter(|t| t.is_unreconciled()).collect();
    manual.sort_by_key(|t| (t.sequence, t.id));

    let mut by_amount: BTreeMap<Decimal, Vec<usize>> = BTreeMap::new();
    for (idx, transaction) in manual.iter().enumerate() {
        by_amount.entry(transaction.amount).or_default().push(idx);
    }
    let manual_tokens: Vec<BTreeSet<String>> = if config.payee_tiebreak {
        manual.iter().map(|t| payee_tokens(&t.payee)).collect()
    } else {
        Vec::new()
    };

    let window = i64::from(config.date_window_days);
    let mut edges = Vec::new();
    let mut candidates_by_bank: Vec<Vec<usize>> = vec![Vec::new(); bank.len()];

    for (bank_idx, row) in bank.iter().enumerate() {
        let Some(same_amount) = by_amount.get(&row.amount) else {
            continue;
        };
        let bank_tokens = config.payee_tiebreak.then(|| payee_tokens(&row.payee));

        for &manual_idx in same_amount {
            let date_delta = (row.date - manual[manual_idx].date).num_days().abs();
            if date_delta > window {
                continue;
            }
            let overlap = bank_tokens
                .as_ref()
                .map_or(0, |tokens| tokens.intersection(&manual_tokens[manual_idx]).count());
            edges.push(Edge {
                date_delta,
                payee_rank: Reverse(overlap),
                manual: manual_idx,
                bank: bank_idx,
            });
        }
    }

    // Bank indices follow (date, provider id) order, so comparing them
    // breaks the final tie without rebuilding the key.
    edges.sort_by_key(|e| (e.date_delta, e.payee_rank, e.manual, e.bank));
    for edge in &edges {
        candidates_by_bank[edge.bank].push(edge.manual);
    }

    let mut bank_used = vec![false; bank.len()];
    let mut manual_used = vec![false; manual.len()];
    let mut result = MatchResult::default();

    for edge in &edges {
        if bank_used[edge.bank] || manual_used[edge.manual] {
            continue;
        }

        let free: Vec<usize> = candidates_by_bank[edge.bank]
            .iter()
            .copied()
            .filter(|&idx| !manual_used[idx])
            .collect();
        if free.len() > 1 {
            result.ambiguities.push(Ambiguity {
                provider_transaction_id: bank[edge.bank].provider_transaction_id.clone(),
                candidates: free.iter().map(|&idx| manual[idx].id).collect(),
            });
        }

        bank_used[edge.bank] = true;
        manual_used[edge.manual] = true;
        result.pairs.push(MatchPair {
            bank: bank[edge.bank].clone(),
            manual_id: manual[edge.manual].id,
            date_delta_days: edge.date_delta,
        });
    }

    result.unmatched_bank = bank
        .iter()
        .zip(&bank_used)
        .filter(|(_, used)| !**used)
        .map(|(row, _)| (*row).clone())
        .collect();
    result
}
