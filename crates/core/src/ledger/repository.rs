//! Persistence seam for ledger state.

use tally_shared::types::AccountId;

use super::error::LedgerError;
use super::types::{Account, LedgerChange, LedgerSnapshot};

/// Repository trait for durable ledger state.
///
/// This trait is implemented by the db crate to provide actual database operations.
pub trait LedgerRepository: Send + Sync + 'static {
    /// Persist a new, empty account.
    fn create_account(
        &self,
        account: &Account,
    ) -> impl std::future::Future<Output = Result<(), LedgerError>> + Send;

    /// Load an account with all of its transactions.
    fn load_account(
        &self,
        account_id: AccountId,
    ) -> impl std::future::Future<Output = Result<Option<LedgerSnapshot>, LedgerError>> + Send;

    /// Persist one change set atomically, together with the account row.
    fn apply_changes(
        &self,
        account: &Account,
        changes: &[LedgerChange],
    ) -> impl std::future::Future<Output = Result<(), LedgerError>> + Send;
}
