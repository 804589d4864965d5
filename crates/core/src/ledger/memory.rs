//! In-memory repository with write-failure injection.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tally_shared::types::AccountId;

use super::error::LedgerError;
use super::repository::LedgerRepository;
use super::types::{Account, LedgerChange, LedgerSnapshot};

/// Applies a change set to a snapshot in place.
fn apply_to_snapshot(
    snapshot: &mut LedgerSnapshot,
    account: &Account,
    changes: &[LedgerChange],
) {
    snapshot.account = account.clone();
    for change in changes {
        match change {
            LedgerChange::Inserted(transaction) => snapshot.transactions.push(transaction.clone()),
            LedgerChange::Updated { after, .. } => {
                if let Some(slot) = snapshot.transactions.iter_mut().find(|t| t.id == after.id) {
                    *slot = after.clone();
                }
            }
            LedgerChange::Removed(transaction) => {
                snapshot.transactions.retain(|t| t.id != transaction.id);
            }
            // The account row already carries the final anchor.
            LedgerChange::AnchorChanged { .. } => {}
            LedgerChange::BankReferenceDismissed(reference) => {
                if !snapshot.dismissed.contains(reference) {
                    snapshot.dismissed.push(reference.clone());
                }
            }
        }
    }
}

/// Repository backed by a map of snapshots.
#[derive(Debug, Default)]
pub struct MemoryLedgerRepository {
    accounts: Mutex<HashMap<AccountId, LedgerSnapshot>>,
    failures: AtomicUsize,
    applied: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryLedgerRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every `apply_changes` call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next `count` calls to `apply_changes` fail.
    pub fn fail_next_applies(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of change sets persisted successfully.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    /// Returns the persisted state of an account.
    #[must_use]
    pub fn stored(&self, account_id: AccountId) -> Option<LedgerSnapshot> {
        self.accounts
            .lock()
            .ok()
            .and_then(|accounts| accounts.get(&account_id).cloned())
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn poisoned() -> LedgerError {
    LedgerError::PersistenceFailure("repository lock poisoned".to_string())
}

impl LedgerRepository for MemoryLedgerRepository {
    async fn create_account(&self, account: &Account) -> Result<(), LedgerError> {
        let mut accounts = self.accounts.lock().map_err(|_| poisoned())?;
        if accounts.contains_key(&account.id) {
            return Err(LedgerError::AccountExists(account.id));
        }
        accounts.insert(
            account.id,
            LedgerSnapshot {
                account: account.clone(),
                transactions: Vec::new(),
                dismissed: Vec::new(),
            },
        );
        Ok(())
    }

    async fn load_account(
        &self,
        account_id: AccountId,
    ) -> Result<Option<LedgerSnapshot>, LedgerError> {
        let accounts = self.accounts.lock().map_err(|_| poisoned())?;
        Ok(accounts.get(&account_id).cloned())
    }

    async fn apply_changes(
        &self,
        account: &Account,
        changes: &[LedgerChange],
    ) -> Result<(), LedgerError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.take_failure() {
            return Err(LedgerError::PersistenceFailure(
                "injected write failure".to_string(),
            ));
        }

        let mut accounts = self.accounts.lock().map_err(|_| poisoned())?;
        let snapshot = accounts
            .get_mut(&account.id)
            .ok_or(LedgerError::AccountNotFound(account.id))?;
        apply_to_snapshot(snapshot, account, changes);
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
