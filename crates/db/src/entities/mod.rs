//! `SeaORM` entities for the ledger schema.

pub mod accounts;
pub mod dismissed_bank_references;
pub mod ledger_transactions;
