//! Balance reconstruction for re-basing history.
//!
//! Read-only: nothing here mutates a ledger.

use rust_decimal::Decimal;
use tally_shared::types::TransactionId;

use super::error::LedgerError;
use super::types::Transaction;

/// Returns the balance immediately after `target` posted.
///
/// Walks backward from the most recent row in `rows` (which must be in
/// ledger order), subtracting each amount from `current_balance` until the
/// target is reached.
///
/// # Errors
///
/// - `TargetNotFound` if `target` is not in `rows`
/// - `InvalidAnchor` if the walk leaves `Decimal`'s range
pub fn balance_at(
    current_balance: Decimal,
    rows: &[Transaction],
    target: TransactionId,
) -> Result<Decimal, LedgerError> {
    let mut balance = current_balance;
    for transaction in rows.iter().rev() {
        if transaction.id == target {
            return Ok(balance);
        }
        balance = balance.checked_sub(transaction.amount).ok_or_else(|| {
            LedgerError::InvalidAnchor(format!(
                "balance overflowed walking back from {current_balance}"
            ))
        })?;
    }
    Err(LedgerError::TargetNotFound(target))
}
