//! Ledger error types.

use thiserror::Error;
use tally_shared::types::{AccountId, ProviderTransactionId, TransactionId};

/// Errors that can occur during ledger and reconciliation operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // ========== Store Errors ==========
    /// A transaction with this id already exists.
    #[error("Duplicate transaction id: {0}")]
    DuplicateId(TransactionId),

    /// Transaction not found.
    #[error("Transaction not found: {0}")]
    NotFound(TransactionId),

    /// The anchor cannot be placed where requested.
    #[error("Invalid anchor: {0}")]
    InvalidAnchor(String),

    /// The balance reconstruction target is not in the ledger.
    #[error("Reconstruction target not found: {0}")]
    TargetNotFound(TransactionId),

    /// Another row already references this upstream bank transaction.
    #[error("Bank transaction {0} is already referenced")]
    DuplicateBankReference(ProviderTransactionId),

    /// Transaction fields disagree with each other or with the account.
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// The requested status transition is not allowed.
    #[error("Invalid status transition for {id}: {reason}")]
    InvalidTransition {
        /// The transaction.
        id: TransactionId,
        /// Why the transition was refused.
        reason: String,
    },

    // ========== Reconciliation Errors ==========
    /// More than one manual candidate qualified and ambiguity is rejected.
    #[error("Ambiguous match for {} bank transaction(s)", .0.len())]
    MatchAmbiguous(Vec<ProviderTransactionId>),

    // ========== Account Errors ==========
    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Account already exists.
    #[error("Account already exists: {0}")]
    AccountExists(AccountId),

    // ========== Persistence Errors ==========
    /// Durable storage rejected the change set.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Returns the error code for collaborators.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateId(_) => "DUPLICATE_ID",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidAnchor(_) => "INVALID_ANCHOR",
            Self::TargetNotFound(_) => "TARGET_NOT_FOUND",
            Self::DuplicateBankReference(_) => "DUPLICATE_BANK_REFERENCE",
            Self::InvalidTransaction(_) => "INVALID_TRANSACTION",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::MatchAmbiguous(_) => "MATCH_AMBIGUOUS",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::AccountExists(_) => "ACCOUNT_EXISTS",
            Self::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if the user can retry the operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistenceFailure(_) | Self::InvalidAnchor(_))
    }

    /// Returns true if the error means a collaborator called the ledger wrongly.
    #[must_use]
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateId(_)
                | Self::NotFound(_)
                | Self::InvalidTransition { .. }
                | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let id = TransactionId::new();
        assert_eq!(LedgerError::DuplicateId(id).error_code(), "DUPLICATE_ID");
        assert_eq!(LedgerError::NotFound(id).error_code(), "NOT_FOUND");
        assert_eq!(LedgerError::TargetNotFound(id).error_code(), "TARGET_NOT_FOUND");
        assert_eq!(
            LedgerError::MatchAmbiguous(vec![]).error_code(),
            "MATCH_AMBIGUOUS"
        );
        assert_eq!(
            LedgerError::PersistenceFailure("disk full".into()).error_code(),
            "PERSISTENCE_FAILURE"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LedgerError::PersistenceFailure("locked".into()).is_retryable());
        assert!(LedgerError::InvalidAnchor("after first row".into()).is_retryable());
        assert!(!LedgerError::DuplicateId(TransactionId::new()).is_retryable());
        assert!(!LedgerError::NotFound(TransactionId::new()).is_retryable());
    }

    #[test]
    fn test_programming_errors() {
        assert!(LedgerError::DuplicateId(TransactionId::new()).is_programming_error());
        assert!(LedgerError::NotFound(TransactionId::new()).is_programming_error());
        assert!(!LedgerError::PersistenceFailure("x".into()).is_programming_error());
        assert!(!LedgerError::MatchAmbiguous(vec![]).is_programming_error());
    }

    #[test]
    fn test_error_display() {
        let pid = ProviderTransactionId::parse("bank-1").unwrap();
        assert_eq!(
            LedgerError::DuplicateBankReference(pid.clone()).to_string(),
            "Bank transaction bank-1 is already referenced"
        );
        assert_eq!(
            LedgerError::MatchAmbiguous(vec![pid]).to_string(),
            "Ambiguous match for 1 bank transaction(s)"
        );
    }
}
