//! Types exchanged with the bank-feed collaborator and the UI.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{AccountId, ProviderTransactionId, TransactionId};

/// A bank transaction exactly as the aggregation provider delivered it.
///
/// Untrusted: normalization validates every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransaction {
    /// Provider-assigned id.
    pub provider_transaction_id: String,
    /// Account the provider attributes the row to.
    pub account_id: AccountId,
    /// Posting date.
    pub date: NaiveDate,
    /// Amount in the provider's sign convention, as an exact decimal string.
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    /// Payee or merchant name.
    #[serde(alias = "payee")]
    pub payee_or_merchant_name: String,
}

/// A bank transaction in the ledger's shape and sign convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedBankTransaction {
    /// Trimmed provider id.
    pub provider_transaction_id: ProviderTransactionId,
    /// Posting date.
    pub date: NaiveDate,
    /// Signed amount. Negative is a debit.
    pub amount: Decimal,
    /// Trimmed payee.
    pub payee: String,
}

/// Why a feed row was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Row is attributed to a different account.
    ForeignAccount,
    /// Provider id is blank.
    MissingProviderId,
    /// Amount is zero.
    ZeroAmount,
    /// Amount exceeds the largest supported magnitude.
    AmountOutOfRange,
    /// Amount has more decimal places than the account currency.
    InvalidPrecision,
}

/// A refused feed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Provider id as delivered.
    pub provider_transaction_id: String,
    /// Reason.
    pub reason: RejectReason,
}

/// A bank row paired with the manual row it confirms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPair {
    /// The bank row.
    pub bank: NormalizedBankTransaction,
    /// The manual row to convert.
    pub manual_id: TransactionId,
    /// Absolute distance between the two dates.
    pub date_delta_days: i64,
}

/// A bank row that had several qualifying manual candidates when claimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ambiguity {
    /// The bank row.
    pub provider_transaction_id: ProviderTransactionId,
    /// Every free candidate at claim time, best first.
    pub candidates: Vec<TransactionId>,
}

/// Output of the matcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Pairs to convert, in claim order.
    pub pairs: Vec<MatchPair>,
    /// Bank rows to insert as new bank-confirmed rows, ordered by `(date, id)`.
    pub unmatched_bank: Vec<NormalizedBankTransaction>,
    /// Informational tie reports.
    pub ambiguities: Vec<Ambiguity>,
}

/// What one sync pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    /// Manual rows converted.
    pub converted: usize,
    /// New bank-confirmed rows.
    pub inserted: usize,
    /// Rows already known, dismissed, or repeated within the batch.
    pub skipped_duplicates: usize,
    /// Rows dated before the account anchor.
    pub skipped_before_anchor: usize,
    /// Rows refused by normalization.
    pub rejected: usize,
    /// Bank rows matched despite several candidates.
    pub ambiguous: usize,
    /// Ids of the converted manual rows.
    pub converted_ids: Vec<TransactionId>,
    /// Ids of the inserted rows.
    pub inserted_ids: Vec<TransactionId>,
    /// Details of refused rows.
    pub rejections: Vec<Rejection>,
}

impl ReconciliationSummary {
    /// Returns true if the pass changed the ledger.
    #[must_use]
    pub fn changed_ledger(&self) -> bool {
        self.converted > 0 || self.inserted > 0
    }
}
