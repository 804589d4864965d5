//! In-memory ledger for one account.
//!
//! Rows are kept sorted by `(date, sequence)` with a parallel vector of
//! running balances. Every mutation validates first, then changes state,
//! then recomputes balances from the first affected index to the end.
//!
//! Mutations append to a change journal carrying before-images, which is
//! what makes savepoints and post-persistence rollback possible.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_shared::types::{MAX_AMOUNT, ProviderTransactionId, TransactionId, within_limit};

use super::error::LedgerError;
use super::reconstruct;
use super::types::{
    Account, Anchor, LedgerChange, LedgerRow, LedgerSnapshot, ReconciliationStatus, Transaction,
    TransactionEdit,
};

/// Position in the change journal to roll back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint(usize);

/// Ordered transactions of a single account with derived running balances.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    account: Account,
    rows: Vec<Transaction>,
    balances: Vec<Option<Decimal>>,
    index: HashMap<TransactionId, (NaiveDate, u64)>,
    sequences: HashSet<u64>,
    references: HashMap<ProviderTransactionId, TransactionId>,
    dismissed: HashSet<ProviderTransactionId>,
    journal: Vec<LedgerChange>,
}

impl LedgerStore {
    /// Creates an empty ledger for an account.
    #[must_use]
    pub fn new(account: Account) -> Self {
        Self {
            account,
            rows: Vec::new(),
            balances: Vec::new(),
            index: HashMap::new(),
            sequences: HashSet::new(),
            references: HashMap::new(),
            dismissed: HashSet::new(),
            journal: Vec::new(),
        }
    }

    /// Rebuilds a ledger from persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot violates any ledger invariant.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, LedgerError> {
        let LedgerSnapshot {
            account,
            transactions,
            dismissed,
        } = snapshot;
        let mut store = Self::new(account);

        for transaction in transactions {
            store.validate_shape(&transaction)?;
            store.validate_unique(&transaction)?;
            store.place(transaction);
        }

        if let Some(pivot) = store.account.anchor.after
            && !store.index.contains_key(&pivot)
        {
            return Err(LedgerError::InvalidAnchor(format!(
                "anchor transaction {pivot} is not in the ledger"
            )));
        }

        store.dismissed = dismissed.into_iter().collect();
        store.recompute_from(0);
        Ok(store)
    }

    // ========== Read API ==========

    /// The account this ledger belongs to.
    #[must_use]
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Number of transactions, ignored history included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the ledger has no transactions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Looks up a transaction by id.
    #[must_use]
    pub fn get(&self, id: TransactionId) -> Option<&Transaction> {
        self.position(id).map(|pos| &self.rows[pos])
    }

    /// Looks up a transaction with its running balance.
    #[must_use]
    pub fn row(&self, id: TransactionId) -> Option<LedgerRow> {
        let pivot = self.pivot_index();
        self.position(id).map(|pos| self.row_at(pos, pivot))
    }

    /// All transactions in order with running balances attached.
    #[must_use]
    pub fn list_ordered(&self) -> Vec<LedgerRow> {
        let pivot = self.pivot_index();
        (0..self.rows.len())
            .map(|pos| self.row_at(pos, pivot))
            .collect()
    }

    /// Pending manual transactions after the anchor, ordered by `(date, sequence)`.
    #[must_use]
    pub fn unreconciled(&self) -> Vec<Transaction> {
        let first = self.pivot_index().unwrap_or(0);
        self.rows[first..]
            .iter()
            .filter(|t| t.is_unreconciled())
            .cloned()
            .collect()
    }

    /// Balance after the most recent transaction.
    #[must_use]
    pub fn current_balance(&self) -> Decimal {
        self.balances
            .last()
            .copied()
            .flatten()
            .unwrap_or(self.account.anchor.balance)
    }

    /// Returns true if a row references this upstream id.
    #[must_use]
    pub fn is_referenced(&self, reference: &ProviderTransactionId) -> bool {
        self.references.contains_key(reference)
    }

    /// Returns true if the user deleted a row carrying this upstream id.
    #[must_use]
    pub fn is_dismissed(&self, reference: &ProviderTransactionId) -> bool {
        self.dismissed.contains(reference)
    }

    /// Upstream ids the user deleted.
    #[must_use]
    pub fn dismissed(&self) -> Vec<ProviderTransactionId> {
        let mut ids: Vec<_> = self.dismissed.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Balance immediately after `target`, walking back from the current balance.
    ///
    /// # Errors
    ///
    /// Returns `TargetNotFound` if the transaction is not in the ledger.
    pub fn balance_at(&self, target: TransactionId) -> Result<Decimal, LedgerError> {
        reconstruct::balance_at(self.current_balance(), &self.rows, target)
    }

    /// Like [`Self::balance_at`] but starting from an externally known balance.
    ///
    /// # Errors
    ///
    /// - `InvalidAnchor` if the known balance does not fit the account currency
    /// - `TargetNotFound` if the transaction is not in the ledger
    pub fn balance_at_with(
        &self,
        known_current: Decimal,
        target: TransactionId,
    ) -> Result<Decimal, LedgerError> {
        self.check_anchor_amount(known_current)?;
        reconstruct::balance_at(known_current, &self.rows, target)
    }

    /// Captures the current state as a persistable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            account: self.account.clone(),
            transactions: self.rows.clone(),
            dismissed: self.dismissed(),
        }
    }

    // ========== Mutations ==========

    /// Hands out the next insertion sequence. Sequences are never reused.
    pub fn allocate_sequence(&mut self) -> u64 {
        let sequence = self.account.next_sequence;
        self.account.next_sequence += 1;
        sequence
    }

    /// Inserts a transaction at its sort position.
    ///
    /// # Errors
    ///
    /// - `DuplicateId` if the id exists
    /// - `InvalidTransaction` if fields disagree, the row belongs elsewhere,
    ///   the sequence is taken, or the row is dated before the anchor
    /// - `DuplicateBankReference` if its upstream id is referenced or dismissed
    pub fn insert(&mut self, transaction: Transaction) -> Result<(), LedgerError> {
        if self.index.contains_key(&transaction.id) {
            return Err(LedgerError::DuplicateId(transaction.id));
        }
        self.validate_shape(&transaction)?;
        if transaction.date < self.account.anchor.date {
            return Err(LedgerError::InvalidTransaction(format!(
                "dated {} before the account anchor {}",
                transaction.date, self.account.anchor.date
            )));
        }
        self.validate_unique(&transaction)?;
        if let Some(reference) = transaction.upstream_reference()
            && self.dismissed.contains(reference)
        {
            return Err(LedgerError::DuplicateBankReference(reference.clone()));
        }

        let pos = self.place(transaction.clone());
        self.journal.push(LedgerChange::Inserted(transaction));
        self.recompute_from(pos);
        Ok(())
    }

    /// Removes a transaction.
    ///
    /// Upstream ids carried by the row are dismissed. Removing the
    /// transaction a repositioned anchor sits after moves the anchor to the
    /// preceding row, keeping its balance.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the transaction does not exist.
    pub fn remove(&mut self, id: TransactionId) -> Result<Transaction, LedgerError> {
        let pos = self.position(id).ok_or(LedgerError::NotFound(id))?;
        let pivot_removed = self.account.anchor.after == Some(id);

        let removed = self.take_out(pos);
        self.journal.push(LedgerChange::Removed(removed.clone()));
        self.dismiss(&removed);

        if pivot_removed {
            let before = self.account.anchor;
            let after = match pos.checked_sub(1) {
                Some(prev) => Anchor {
                    balance: before.balance,
                    date: self.rows[prev].date,
                    after: Some(self.rows[prev].id),
                },
                None => Anchor::starting(before.balance, removed.date),
            };
            self.set_anchor(after);
            self.recompute_from(0);
        } else {
            self.recompute_from(pos);
        }

        Ok(removed)
    }

    /// Replaces the anchor with a starting balance preceding every transaction.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAnchor` if `date` is after the earliest transaction or
    /// the amount does not fit the account currency.
    pub fn set_starting_balance(
        &mut self,
        amount: Decimal,
        date: NaiveDate,
    ) -> Result<(), LedgerError> {
        self.check_anchor_amount(amount)?;
        if let Some(first) = self.rows.first()
            && date > first.date
        {
            return Err(LedgerError::InvalidAnchor(format!(
                "starting date {date} is after the earliest transaction on {}",
                first.date
            )));
        }

        self.set_anchor(Anchor::starting(amount, date));
        self.recompute_from(0);
        Ok(())
    }

    /// Places the anchor immediately after `after`, with `amount` as that
    /// transaction's running balance. Earlier rows become ignored history.
    ///
    /// # Errors
    ///
    /// - `TargetNotFound` if the transaction does not exist
    /// - `InvalidAnchor` if the amount does not fit the account currency
    pub fn reposition_anchor(
        &mut self,
        amount: Decimal,
        after: TransactionId,
    ) -> Result<(), LedgerError> {
        let pos = self
            .position(after)
            .ok_or(LedgerError::TargetNotFound(after))?;
        self.check_anchor_amount(amount)?;

        self.set_anchor(Anchor {
            balance: amount,
            date: self.rows[pos].date,
            after: Some(after),
        });
        self.recompute_from(0);
        Ok(())
    }

    /// Deletes the ignored history before a repositioned anchor and turns the
    /// anchor into a plain starting balance. Kept rows keep their balances.
    ///
    /// Returns the number of deleted transactions.
    pub fn prune_before_anchor(&mut self) -> usize {
        let Some(pivot) = self.pivot_index() else {
            return 0;
        };

        let mut pruned = 0;
        for _ in 0..pivot {
            let removed = self.take_out(0);
            self.journal.push(LedgerChange::Removed(removed.clone()));
            self.dismiss(&removed);
            pruned += 1;
        }

        let first = &self.rows[0];
        let anchor = Anchor::starting(self.account.anchor.balance - first.amount, first.date);
        self.set_anchor(anchor);
        self.recompute_from(0);
        pruned
    }

    /// Updates the fields that take no part in matching or balances.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the transaction does not exist.
    pub fn edit(&mut self, id: TransactionId, edit: TransactionEdit) -> Result<(), LedgerError> {
        let pos = self.position(id).ok_or(LedgerError::NotFound(id))?;
        if edit.is_empty() {
            return Ok(());
        }

        let before = self.rows[pos].clone();
        let mut after = before.clone();
        if let Some(payee) = edit.payee {
            after.payee = payee;
        }
        if let Some(category) = edit.category {
            after.category = category;
        }
        if let Some(notes) = edit.notes {
            after.notes = notes;
        }

        self.replace(pos, after.clone());
        self.journal.push(LedgerChange::Updated { before, after });
        Ok(())
    }

    /// Marks a pending manual transaction as matched to a bank transaction.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the transaction does not exist
    /// - `InvalidTransition` if it is not a pending manual row
    /// - `DuplicateBankReference` if the bank id is referenced or dismissed
    pub fn convert(
        &mut self,
        id: TransactionId,
        bank_id: ProviderTransactionId,
    ) -> Result<(), LedgerError> {
        let pos = self.position(id).ok_or(LedgerError::NotFound(id))?;
        let before = self.rows[pos].clone();
        if !before.is_unreconciled() {
            return Err(LedgerError::InvalidTransition {
                id,
                reason: format!("status is {}", before.status.as_str()),
            });
        }
        if self.references.contains_key(&bank_id) || self.dismissed.contains(&bank_id) {
            return Err(LedgerError::DuplicateBankReference(bank_id));
        }

        let mut after = before.clone();
        after.status = ReconciliationStatus::Converted;
        after.linked_transaction_id = Some(bank_id);

        self.replace(pos, after.clone());
        self.journal.push(LedgerChange::Updated { before, after });
        Ok(())
    }

    // ========== Journal ==========

    /// Marks the current journal position.
    #[must_use]
    pub fn savepoint(&self) -> Savepoint {
        Savepoint(self.journal.len())
    }

    /// Undoes every change made since `savepoint`.
    pub fn rollback_to(&mut self, savepoint: Savepoint) {
        if savepoint.0 >= self.journal.len() {
            return;
        }
        let undone = self.journal.split_off(savepoint.0);
        self.undo(undone);
    }

    /// Takes the pending change journal, leaving it empty.
    pub fn take_changes(&mut self) -> Vec<LedgerChange> {
        std::mem::take(&mut self.journal)
    }

    /// Undoes a change set previously returned by [`Self::take_changes`].
    ///
    /// Must be called before any further mutation.
    pub fn revert(&mut self, changes: Vec<LedgerChange>) {
        self.undo(changes);
    }

    // ========== Internals ==========

    fn undo(&mut self, changes: Vec<LedgerChange>) {
        for change in changes.into_iter().rev() {
            match change {
                LedgerChange::Inserted(transaction) => {
                    if let Some(pos) = self.position(transaction.id) {
                        self.take_out(pos);
                    }
                }
                LedgerChange::Updated { before, .. } => {
                    if let Some(pos) = self.position(before.id) {
                        self.replace(pos, before);
                    }
                }
                LedgerChange::Removed(transaction) => {
                    self.place(transaction);
                }
                LedgerChange::AnchorChanged { before, .. } => {
                    self.account.anchor = before;
                }
                LedgerChange::BankReferenceDismissed(reference) => {
                    self.dismissed.remove(&reference);
                }
            }
        }
        self.recompute_from(0);
    }

    fn validate_shape(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        if transaction.account_id != self.account.id {
            return Err(LedgerError::InvalidTransaction(format!(
                "transaction {} belongs to account {}",
                transaction.id, transaction.account_id
            )));
        }
        if !transaction.has_consistent_state() {
            return Err(LedgerError::InvalidTransaction(format!(
                "transaction {} has status {} with source {}",
                transaction.id,
                transaction.status.as_str(),
                transaction.source.as_str()
            )));
        }
        if !within_limit(transaction.amount) {
            return Err(LedgerError::InvalidTransaction(format!(
                "amount {} exceeds the supported limit of {MAX_AMOUNT}",
                transaction.amount
            )));
        }
        if !self.account.currency.accepts(transaction.amount) {
            return Err(LedgerError::InvalidTransaction(format!(
                "amount {} is not representable in {}",
                transaction.amount, self.account.currency
            )));
        }
        Ok(())
    }

    fn validate_unique(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        if self.index.contains_key(&transaction.id) {
            return Err(LedgerError::DuplicateId(transaction.id));
        }
        if self.sequences.contains(&transaction.sequence) {
            return Err(LedgerError::InvalidTransaction(format!(
                "sequence {} is already used",
                transaction.sequence
            )));
        }
        if let Some(reference) = transaction.upstream_reference()
            && self.references.contains_key(reference)
        {
            return Err(LedgerError::DuplicateBankReference(reference.clone()));
        }
        Ok(())
    }

    fn check_anchor_amount(&self, amount: Decimal) -> Result<(), LedgerError> {
        if !within_limit(amount) {
            return Err(LedgerError::InvalidAnchor(format!(
                "balance {amount} exceeds the supported limit of {MAX_AMOUNT}"
            )));
        }
        if self.account.currency.accepts(amount) {
            Ok(())
        } else {
            Err(LedgerError::InvalidAnchor(format!(
                "amount {amount} is not representable in {}",
                self.account.currency
            )))
        }
    }

    fn position(&self, id: TransactionId) -> Option<usize> {
        let key = self.index.get(&id)?;
        self.rows.binary_search_by_key(key, Transaction::sort_key).ok()
    }

    fn pivot_index(&self) -> Option<usize> {
        self.account.anchor.after.and_then(|id| self.position(id))
    }

    fn row_at(&self, pos: usize, pivot: Option<usize>) -> LedgerRow {
        LedgerRow {
            transaction: self.rows[pos].clone(),
            running_balance: self.balances.get(pos).copied().flatten(),
            before_anchor: pivot.is_some_and(|p| pos < p),
        }
    }

    /// Inserts without validation, journaling, or recompute.
    fn place(&mut self, transaction: Transaction) -> usize {
        let key = transaction.sort_key();
        let pos = match self.rows.binary_search_by_key(&key, Transaction::sort_key) {
            Ok(pos) | Err(pos) => pos,
        };
        self.index.insert(transaction.id, key);
        self.sequences.insert(transaction.sequence);
        if let Some(reference) = transaction.upstream_reference() {
            self.references.insert(reference.clone(), transaction.id);
        }
        if transaction.sequence >= self.account.next_sequence {
            self.account.next_sequence = transaction.sequence + 1;
        }
        self.rows.insert(pos, transaction);
        self.balances.truncate(pos);
        pos
    }

    /// Removes without journaling or recompute.
    fn take_out(&mut self, pos: usize) -> Transaction {
        let transaction = self.rows.remove(pos);
        self.index.remove(&transaction.id);
        self.sequences.remove(&transaction.sequence);
        if let Some(reference) = transaction.upstream_reference() {
            self.references.remove(reference);
        }
        self.balances.truncate(pos);
        transaction
    }

    /// Swaps a row in place. Sort key and amount must not change.
    fn replace(&mut self, pos: usize, transaction: Transaction) {
        if let Some(reference) = self.rows[pos].upstream_reference() {
            self.references.remove(reference);
        }
        if let Some(reference) = transaction.upstream_reference() {
            self.references.insert(reference.clone(), transaction.id);
        }
        self.rows[pos] = transaction;
    }

    fn dismiss(&mut self, removed: &Transaction) {
        if let Some(reference) = removed.upstream_reference()
            && self.dismissed.insert(reference.clone())
        {
            self.journal
                .push(LedgerChange::BankReferenceDismissed(reference.clone()));
        }
    }

    fn set_anchor(&mut self, after: Anchor) {
        let before = std::mem::replace(&mut self.account.anchor, after);
        self.journal
            .push(LedgerChange::AnchorChanged { before, after });
    }

    /// Recomputes running balances for `start..`.
    ///
    /// Anchors and amounts are validated against `MAX_AMOUNT` before they
    /// enter the store, so these sums cannot leave `Decimal`'s range.
    fn recompute_from(&mut self, start: usize) {
        let pivot = self.pivot_index();
        let anchor = self.account.anchor.balance;
        let start = start.min(self.balances.len());
        self.balances.truncate(start);

        for pos in start..self.rows.len() {
            let value = match pivot {
                Some(p) if pos < p => None,
                Some(p) if pos == p => Some(anchor),
                _ => {
                    let base = pos
                        .checked_sub(1)
                        .and_then(|prev| self.balances[prev])
                        .unwrap_or(anchor);
                    Some(base + self.rows[pos].amount)
                }
            };
            self.balances.push(value);
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
