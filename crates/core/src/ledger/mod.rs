//! Per-account transaction ledger.
//!
//! This module implements the core ledger functionality:
//! - Domain types for transactions, accounts and anchors
//! - The ordered store with running balances and a change journal
//! - Balance reconstruction for re-basing history
//! - The persistence seam
//! - The async service that serializes mutations per account

pub mod error;
pub mod reconstruct;
pub mod repository;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod memory;
#[cfg(test)]
mod store_props;

pub use error::LedgerError;
pub use repository::LedgerRepository;
pub use service::LedgerService;
pub use store::{LedgerStore, Savepoint};
pub use types::{
    Account, Anchor, LedgerChange, LedgerRow, LedgerSnapshot, NewTransaction, RebasePolicy,
    ReconciliationStatus, Transaction, TransactionEdit, TransactionSource,
};
