//! One bank-sync pass against a ledger.

use std::collections::HashSet;

use tally_shared::config::{AmbiguityPolicy, ReconciliationConfig};

use super::matcher::match_transactions;
use super::normalize::normalize;
use super::types::{
    BankTransaction, MatchResult, NormalizedBankTransaction, Rejection, ReconciliationSummary,
};
use crate::ledger::{LedgerError, LedgerStore, Transaction};

/// Merges a batch of feed rows into `store`.
///
/// Rows are normalized, deduplicated against every upstream id the ledger
/// already references or has dismissed, then matched against the pending
/// manual rows. Conversions and inserts are applied as one unit: on error
/// the store is rolled back to its state before the pass.
///
/// # Errors
///
/// - `MatchAmbiguous` when ambiguity is rejected and a tie occurred
/// - any store error raised while applying, after rolling back
pub fn reconcile(
    store: &mut LedgerStore,
    batch: Vec<BankTransaction>,
    config: &ReconciliationConfig,
) -> Result<ReconciliationSummary, LedgerError> {
    let account = store.account();
    let (account_id, currency, anchor_date) = (account.id, account.currency, account.anchor.date);
    let mut summary = ReconciliationSummary::default();
    let mut seen = HashSet::new();
    let mut candidates = Vec::with_capacity(batch.len());

    for raw in batch {
        let row = match normalize(&raw, account_id, currency, config.sign_convention) {
            Ok(row) => row,
            Err(reason) => {
                tracing::debug!(
                    provider_transaction_id = %raw.provider_transaction_id,
                    ?reason,
                    "rejected bank transaction"
                );
                summary.rejected += 1;
                summary.rejections.push(Rejection {
                    provider_transaction_id: raw.provider_transaction_id,
                    reason,
                });
                continue;
            }
        };

        let id = &row.provider_transaction_id;
        if store.is_referenced(id) || store.is_dismissed(id) || !seen.insert(id.clone()) {
            summary.skipped_duplicates += 1;
            continue;
        }
        if row.date < anchor_date {
            summary.skipped_before_anchor += 1;
            continue;
        }
        candidates.push(row);
    }

    let result = match_transactions(&candidates, &store.unreconciled(), config);
    summary.ambiguous = result.ambiguities.len();
    if config.ambiguity == AmbiguityPolicy::Reject && !result.ambiguities.is_empty() {
        return Err(LedgerError::MatchAmbiguous(
            result
                .ambiguities
                .into_iter()
                .map(|a| a.provider_transaction_id)
                .collect(),
        ));
    }

    let savepoint = store.savepoint();
    if let Err(err) = apply(store, result, &mut summary) {
        store.rollback_to(savepoint);
        return Err(err);
    }

    tracing::debug!(
        account_id = %account_id,
        converted = summary.converted,
        inserted = summary.inserted,
        skipped_duplicates = summary.skipped_duplicates,
        rejected = summary.rejected,
        "reconciliation pass applied"
    );
    Ok(summary)
}

fn apply(
    store: &mut LedgerStore,
    result: MatchResult,
    summary: &mut ReconciliationSummary,
) -> Result<(), LedgerError> {
    for pair in result.pairs {
        store.convert(pair.manual_id, pair.bank.provider_transaction_id)?;
        summary.converted += 1;
        summary.converted_ids.push(pair.manual_id);
    }

    for row in result.unmatched_bank {
        let NormalizedBankTransaction {
            provider_transaction_id,
            date,
            amount,
            payee,
        } = row;
        let sequence = store.allocate_sequence();
        let transaction = Transaction::bank_confirmed(
            store.account().id,
            sequence,
            provider_transaction_id,
            date,
            payee,
            amount,
        );
        let id = transaction.id;
        store.insert(transaction)?;
        summary.inserted += 1;
        summary.inserted_ids.push(id);
    }
    Ok(())
}
