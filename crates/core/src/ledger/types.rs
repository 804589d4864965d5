//! Domain types for the per-account ledger.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{AccountId, Currency, ProviderTransactionId, TransactionId};

/// Where a transaction was first recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    /// Entered by the user.
    Manual,
    /// Pulled from the bank-aggregation feed.
    Bank,
}

impl TransactionSource {
    /// Returns the string representation for storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Bank => "bank",
        }
    }
}

impl std::str::FromStr for TransactionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "bank" => Ok(Self::Bank),
            _ => Err(format!("Unknown transaction source: {s}")),
        }
    }
}

/// Reconciliation state of a transaction.
///
/// `Pending -> Converted` is the only transition and it never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    /// Manual entry not yet seen on the bank feed.
    Pending,
    /// Manual entry matched to a bank transaction.
    Converted,
    /// Row created directly from the bank feed.
    BankConfirmed,
}

impl ReconciliationStatus {
    /// Returns the string representation for storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Converted => "converted",
            Self::BankConfirmed => "bank_confirmed",
        }
    }
}

impl std::str::FromStr for ReconciliationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "converted" => Ok(Self::Converted),
            "bank_confirmed" => Ok(Self::BankConfirmed),
            _ => Err(format!("Unknown reconciliation status: {s}")),
        }
    }
}

/// A single money movement on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier.
    pub id: TransactionId,
    /// Owning account.
    pub account_id: AccountId,
    /// Effective calendar date.
    pub date: NaiveDate,
    /// Per-account insertion sequence, the tiebreaker within a date.
    pub sequence: u64,
    /// Merchant or manual label.
    pub payee: String,
    /// Signed amount. Negative is a debit.
    pub amount: Decimal,
    /// Origin of the row.
    pub source: TransactionSource,
    /// Reconciliation state.
    pub status: ReconciliationStatus,
    /// Bank transaction this manual row was matched against.
    pub linked_transaction_id: Option<ProviderTransactionId>,
    /// Upstream id of a row created from the bank feed.
    pub provider_transaction_id: Option<ProviderTransactionId>,
    /// Free-form category.
    pub category: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
}

impl Transaction {
    /// Builds a pending manual transaction.
    #[must_use]
    pub fn manual(account_id: AccountId, sequence: u64, input: NewTransaction) -> Self {
        Self {
            id: TransactionId::new(),
            account_id,
            date: input.date,
            sequence,
            payee: input.payee,
            amount: input.amount,
            source: TransactionSource::Manual,
            status: ReconciliationStatus::Pending,
            linked_transaction_id: None,
            provider_transaction_id: None,
            category: input.category,
            notes: input.notes,
        }
    }

    /// Builds a bank-confirmed transaction from a normalized feed row.
    #[must_use]
    pub fn bank_confirmed(
        account_id: AccountId,
        sequence: u64,
        provider_transaction_id: ProviderTransactionId,
        date: NaiveDate,
        payee: String,
        amount: Decimal,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            account_id,
            date,
            sequence,
            payee,
            amount,
            source: TransactionSource::Bank,
            status: ReconciliationStatus::BankConfirmed,
            linked_transaction_id: None,
            provider_transaction_id: Some(provider_transaction_id),
            category: None,
            notes: None,
        }
    }

    /// Sort key for the account's total order.
    #[must_use]
    pub fn sort_key(&self) -> (NaiveDate, u64) {
        (self.date, self.sequence)
    }

    /// The upstream bank id this row stands for, if any.
    #[must_use]
    pub fn upstream_reference(&self) -> Option<&ProviderTransactionId> {
        match self.status {
            ReconciliationStatus::Converted => self.linked_transaction_id.as_ref(),
            ReconciliationStatus::BankConfirmed => self.provider_transaction_id.as_ref(),
            ReconciliationStatus::Pending => None,
        }
    }

    /// Returns true if this row is a candidate for matching.
    #[must_use]
    pub fn is_unreconciled(&self) -> bool {
        self.source == TransactionSource::Manual && self.status == ReconciliationStatus::Pending
    }

    /// Checks that source, status and upstream ids agree.
    #[must_use]
    pub fn has_consistent_state(&self) -> bool {
        match (self.source, self.status) {
            (TransactionSource::Manual, ReconciliationStatus::Pending) => {
                self.linked_transaction_id.is_none() && self.provider_transaction_id.is_none()
            }
            (TransactionSource::Manual, ReconciliationStatus::Converted) => {
                self.linked_transaction_id.is_some() && self.provider_transaction_id.is_none()
            }
            (TransactionSource::Bank, ReconciliationStatus::BankConfirmed) => {
                self.provider_transaction_id.is_some() && self.linked_transaction_id.is_none()
            }
            _ => false,
        }
    }
}

/// User input for a new manual transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Effective date.
    pub date: NaiveDate,
    /// Label.
    pub payee: String,
    /// Signed amount. Negative is a debit.
    pub amount: Decimal,
    /// Optional category.
    #[serde(default)]
    pub category: Option<String>,
    /// Optional notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Edit of the fields that never take part in matching or balance math.
///
/// `None` leaves a field unchanged; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEdit {
    /// New payee.
    #[serde(default)]
    pub payee: Option<String>,
    /// New category.
    #[serde(default)]
    pub category: Option<Option<String>>,
    /// New notes.
    #[serde(default)]
    pub notes: Option<Option<String>>,
}

impl TransactionEdit {
    /// Returns true if the edit changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payee.is_none() && self.category.is_none() && self.notes.is_none()
    }
}

/// The point from which running balances are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    /// Balance at the anchor.
    pub balance: Decimal,
    /// Anchor date.
    pub date: NaiveDate,
    /// `None` places the anchor before every transaction. `Some(id)` places it
    /// immediately after that transaction, marking everything earlier as
    /// ignored history.
    pub after: Option<TransactionId>,
}

impl Anchor {
    /// A starting balance that precedes every transaction.
    #[must_use]
    pub fn starting(balance: Decimal, date: NaiveDate) -> Self {
        Self {
            balance,
            date,
            after: None,
        }
    }
}

/// A single-currency account with its anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier.
    pub id: AccountId,
    /// Display name.
    pub name: String,
    /// Account currency.
    pub currency: Currency,
    /// Running-balance anchor.
    pub anchor: Anchor,
    /// Next insertion sequence to hand out.
    pub next_sequence: u64,
}

impl Account {
    /// Creates an empty account with a starting balance.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        currency: Currency,
        starting_balance: Decimal,
        starting_date: NaiveDate,
    ) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
            currency,
            anchor: Anchor::starting(starting_balance, starting_date),
            next_sequence: 1,
        }
    }
}

/// Read model row: a transaction with its derived balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    /// The transaction.
    #[serde(flatten)]
    pub transaction: Transaction,
    /// Balance immediately after this transaction. `None` for ignored history.
    pub running_balance: Option<Decimal>,
    /// True if the row precedes a repositioned anchor.
    pub before_anchor: bool,
}

/// Persisted state of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// The account and its anchor.
    pub account: Account,
    /// Transactions in any order.
    pub transactions: Vec<Transaction>,
    /// Upstream ids the user deleted.
    pub dismissed: Vec<ProviderTransactionId>,
}

/// One entry of a store's change journal.
///
/// Every variant carries what is needed to undo it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerChange {
    /// A transaction was inserted.
    Inserted(Transaction),
    /// A transaction was replaced in place.
    Updated {
        /// State before the change.
        before: Transaction,
        /// State after the change.
        after: Transaction,
    },
    /// A transaction was deleted.
    Removed(Transaction),
    /// The anchor moved.
    AnchorChanged {
        /// Previous anchor.
        before: Anchor,
        /// New anchor.
        after: Anchor,
    },
    /// An upstream id was recorded as dismissed.
    BankReferenceDismissed(ProviderTransactionId),
}

/// What re-basing does with transactions before the new anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebasePolicy {
    /// Keep them, excluded from running balances.
    #[default]
    IgnoreEarlier,
    /// Delete them and make the anchor a plain starting balance.
    DeleteEarlier,
}
