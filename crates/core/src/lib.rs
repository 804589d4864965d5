//! Core ledger logic for Tally.
//!
//! This crate contains the transaction ledger and the bank-reconciliation
//! engine with ZERO database dependencies. Persistence is reached through
//! the [`ledger::LedgerRepository`] trait implemented by `tally-db`.
//!
//! # Modules
//!
//! - `ledger` - Ordered per-account ledger, running balances, reconstruction, service
//! - `reconciliation` - Normalization, matching and sync passes for bank feeds

pub mod ledger;
pub mod reconciliation;
