//! Async ledger service shared by the UI and sync collaborators.
//!
//! Each account has one exclusive section. A mutation takes the account
//! lock inside a spawned task, applies to the in-memory store, persists the
//! resulting change set and reverts the store if persistence fails. Because
//! the task owns the lock guard, dropping the caller's future never
//! interrupts a mutation half way.
//!
//! Loading and eviction happen under the same lock. A handle that was
//! evicted while a caller waited on it is marked as such, and the caller
//! retries against the current handle instead of writing to a stale store.

use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tally_shared::config::ReconciliationConfig;
use tally_shared::types::{AccountId, Currency, TransactionId};
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard};

use super::error::LedgerError;
use super::repository::LedgerRepository;
use super::store::LedgerStore;
use super::types::{
    Account, LedgerRow, NewTransaction, RebasePolicy, Transaction, TransactionEdit,
};
use crate::reconciliation::{self, BankTransaction, ReconciliationSummary};

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Unloaded,
    Ready(LedgerStore),
    Evicted,
}

type AccountHandle = Arc<Mutex<Slot>>;
type AccountMap = DashMap<AccountId, AccountHandle>;
type StoreGuard = OwnedMappedMutexGuard<Slot, LedgerStore>;

/// Ledger service over a repository.
pub struct LedgerService<R: LedgerRepository> {
    repo: Arc<R>,
    accounts: Arc<AccountMap>,
    config: ReconciliationConfig,
}

impl<R: LedgerRepository> LedgerService<R> {
    /// Create a new ledger service.
    #[must_use]
    pub fn new(repo: Arc<R>, config: ReconciliationConfig) -> Self {
        Self {
            repo,
            accounts: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Reconciliation settings used by [`Self::reconcile`].
    #[must_use]
    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Creates and persists an empty account.
    pub async fn open_account(
        &self,
        name: impl Into<String>,
        currency: Currency,
        starting_balance: Decimal,
        starting_date: NaiveDate,
    ) -> Result<Account, LedgerError> {
        if !currency.accepts(starting_balance) {
            return Err(LedgerError::InvalidAnchor(format!(
                "amount {starting_balance} is not representable in {currency}"
            )));
        }
        let account = Account::new(name, currency, starting_balance, starting_date);
        self.repo.create_account(&account).await?;
        self.accounts.insert(
            account.id,
            Arc::new(Mutex::new(Slot::Ready(LedgerStore::new(account.clone())))),
        );
        tracing::info!(account_id = %account.id, currency = %currency, "account opened");
        Ok(account)
    }

    /// Creates a pending manual transaction.
    pub async fn create_manual(
        &self,
        account_id: AccountId,
        input: NewTransaction,
    ) -> Result<Transaction, LedgerError> {
        self.mutate(account_id, "create_manual", move |store| {
            let sequence = store.allocate_sequence();
            let transaction = Transaction::manual(store.account().id, sequence, input);
            store.insert(transaction.clone())?;
            Ok(transaction)
        })
        .await
    }

    /// Inserts a fully formed transaction, for collaborators that assign ids.
    pub async fn insert(
        &self,
        account_id: AccountId,
        transaction: Transaction,
    ) -> Result<(), LedgerError> {
        self.mutate(account_id, "insert", move |store| store.insert(transaction))
            .await
    }

    /// Edits payee, category or notes.
    pub async fn edit(
        &self,
        account_id: AccountId,
        id: TransactionId,
        edit: TransactionEdit,
    ) -> Result<(), LedgerError> {
        self.mutate(account_id, "edit", move |store| store.edit(id, edit))
            .await
    }

    /// Deletes a transaction.
    pub async fn remove(
        &self,
        account_id: AccountId,
        id: TransactionId,
    ) -> Result<Transaction, LedgerError> {
        self.mutate(account_id, "remove", move |store| store.remove(id))
            .await
    }

    /// Replaces the anchor with a starting balance.
    pub async fn set_starting_balance(
        &self,
        account_id: AccountId,
        amount: Decimal,
        date: NaiveDate,
    ) -> Result<(), LedgerError> {
        self.mutate(account_id, "set_starting_balance", move |store| {
            store.set_starting_balance(amount, date)
        })
        .await
    }

    /// Makes `target` the new starting point of the running balances.
    ///
    /// The balance at `target` is reconstructed from `known_balance` (for
    /// example the bank-reported balance) or from the ledger's own current
    /// balance. Returns the reconstructed amount.
    pub async fn rebase(
        &self,
        account_id: AccountId,
        target: TransactionId,
        known_balance: Option<Decimal>,
        policy: RebasePolicy,
    ) -> Result<Decimal, LedgerError> {
        self.mutate(account_id, "rebase", move |store| {
            let amount = match known_balance {
                Some(known) => store.balance_at_with(known, target)?,
                None => store.balance_at(target)?,
            };
            store.reposition_anchor(amount, target)?;
            if policy == RebasePolicy::DeleteEarlier {
                let pruned = store.prune_before_anchor();
                tracing::debug!(pruned, "deleted history before new anchor");
            }
            Ok(amount)
        })
        .await
    }

    /// Applies one bank-sync batch as a single atomic unit.
    pub async fn reconcile(
        &self,
        account_id: AccountId,
        batch: Vec<BankTransaction>,
    ) -> Result<ReconciliationSummary, LedgerError> {
        let config = self.config;
        let batch_size = batch.len();
        let summary = self
            .mutate(account_id, "reconcile", move |store| {
                reconciliation::reconcile(store, batch, &config)
            })
            .await?;

        tracing::info!(
            account_id = %account_id,
            batch_size,
            converted = summary.converted,
            inserted = summary.inserted,
            skipped_duplicates = summary.skipped_duplicates,
            skipped_before_anchor = summary.skipped_before_anchor,
            rejected = summary.rejected,
            ambiguous = summary.ambiguous,
            "bank sync reconciled"
        );
        Ok(summary)
    }

    /// Balance immediately after `target`.
    pub async fn balance_at(
        &self,
        account_id: AccountId,
        target: TransactionId,
        known_balance: Option<Decimal>,
    ) -> Result<Decimal, LedgerError> {
        let store = self.lock(account_id).await?;
        match known_balance {
            Some(known) => store.balance_at_with(known, target),
            None => store.balance_at(target),
        }
    }

    /// Ordered rows with running balances.
    pub async fn list_ordered(&self, account_id: AccountId) -> Result<Vec<LedgerRow>, LedgerError> {
        let store = self.lock(account_id).await?;
        Ok(store.list_ordered())
    }

    /// Pending manual rows.
    pub async fn unreconciled(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let store = self.lock(account_id).await?;
        Ok(store.unreconciled())
    }

    /// The account with its current anchor.
    pub async fn account(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        let store = self.lock(account_id).await?;
        Ok(store.account().clone())
    }

    /// Drops the cached ledger; the next call reloads it from the repository.
    ///
    /// Waits for any in-flight mutation on the account to finish first.
    pub async fn evict(&self, account_id: AccountId) -> bool {
        let Some(handle) = self
            .accounts
            .get(&account_id)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return false;
        };
        let mut slot = handle.lock().await;
        let loaded = matches!(*slot, Slot::Ready(_));
        retire(&self.accounts, account_id, &handle, &mut slot);
        loaded
    }

    async fn lock(&self, account_id: AccountId) -> Result<StoreGuard, LedgerError> {
        acquire(self.repo.as_ref(), &self.accounts, account_id).await
    }

    async fn mutate<T, F>(
        &self,
        account_id: AccountId,
        operation: &'static str,
        op: F,
    ) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut LedgerStore) -> Result<T, LedgerError> + Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        let accounts = Arc::clone(&self.accounts);

        let task = tokio::spawn(async move {
            let mut store = acquire(repo.as_ref(), &accounts, account_id).await?;
            let savepoint = store.savepoint();
            let value = match op(&mut store) {
                Ok(value) => value,
                Err(err) => {
                    store.rollback_to(savepoint);
                    return Err(err);
                }
            };

            let changes = store.take_changes();
            if changes.is_empty() {
                return Ok(value);
            }
            let account = store.account().clone();
            if let Err(err) = repo.apply_changes(&account, &changes).await {
                tracing::warn!(
                    account_id = %account.id,
                    operation,
                    changes = changes.len(),
                    error = %err,
                    "persistence failed, reverting in-memory changes"
                );
                store.revert(changes);
                return Err(match err {
                    LedgerError::PersistenceFailure(_) => err,
                    other => LedgerError::PersistenceFailure(other.to_string()),
                });
            }
            Ok(value)
        });

        let result = match task.await {
            Ok(result) => result,
            Err(join_err) => {
                // The store may be half mutated; rebuild it from durable state.
                self.evict(account_id).await;
                Err(LedgerError::Internal(format!("ledger task failed: {join_err}")))
            }
        };
        if let Err(err) = &result {
            log_failure(account_id, operation, err);
        }
        result
    }
}

/// Locks the account's loaded store, loading it under the lock if needed.
async fn acquire<R: LedgerRepository>(
    repo: &R,
    accounts: &AccountMap,
    account_id: AccountId,
) -> Result<StoreGuard, LedgerError> {
    loop {
        let handle = Arc::clone(accounts.entry(account_id).or_default().value());
        let mut slot = Arc::clone(&handle).lock_owned().await;

        if matches!(*slot, Slot::Unloaded) {
            match load(repo, account_id).await {
                Ok(store) => *slot = Slot::Ready(store),
                Err(err) => {
                    retire(accounts, account_id, &handle, &mut slot);
                    return Err(err);
                }
            }
        }

        if let Ok(store) = OwnedMutexGuard::try_map(slot, |slot| match slot {
            Slot::Ready(store) => Some(store),
            Slot::Unloaded | Slot::Evicted => None,
        }) {
            return Ok(store);
        }
        // Evicted while we waited; the map now holds a newer handle.
    }
}

async fn load<R: LedgerRepository>(
    repo: &R,
    account_id: AccountId,
) -> Result<LedgerStore, LedgerError> {
    let snapshot = repo
        .load_account(account_id)
        .await?
        .ok_or(LedgerError::AccountNotFound(account_id))?;
    let rows = snapshot.transactions.len();
    let store = LedgerStore::from_snapshot(snapshot)?;
    tracing::debug!(account_id = %account_id, rows, "ledger loaded");
    Ok(store)
}

/// Marks `handle` dead and unmaps it. Must be called with its lock held.
fn retire(accounts: &AccountMap, account_id: AccountId, handle: &AccountHandle, slot: &mut Slot) {
    *slot = Slot::Evicted;
    accounts.remove_if(&account_id, |_, current| Arc::ptr_eq(current, handle));
}

fn log_failure(account_id: AccountId, operation: &'static str, err: &LedgerError) {
    if err.is_programming_error() {
        tracing::error!(
            account_id = %account_id,
            operation,
            code = err.error_code(),
            error = %err,
            "ledger call rejected"
        );
    } else {
        tracing::warn!(
            account_id = %account_id,
            operation,
            code = err.error_code(),
            retryable = err.is_retryable(),
            error = %err,
            "ledger operation failed"
        );
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
