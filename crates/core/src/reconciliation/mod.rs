//! Bank-feed reconciliation.
//!
//! - Normalization of untrusted provider rows
//! - Greedy one-to-one matching against pending manual rows
//! - The atomic sync pass that applies conversions and inserts

pub mod engine;
pub mod matcher;
pub mod normalize;
pub mod types;

#[cfg(test)]
mod engine_props;
#[cfg(test)]
mod matcher_props;

pub use engine::reconcile;
pub use matcher::match_transactions;
pub use types::{
    Ambiguity, BankTransaction, MatchPair, MatchResult, NormalizedBankTransaction, RejectReason,
    Rejection, ReconciliationSummary,
};
