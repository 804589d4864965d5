//! Ledger repository backed by SQLite.
//!
//! Implements the core `LedgerRepository` seam. Every change set is written
//! inside a single database transaction together with the account row, so a
//! sync pass is either fully durable or not durable at all.

use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};

use crate::entities::{accounts, dismissed_bank_references, ledger_transactions};
use tally_core::ledger::{
    Account, Anchor, LedgerChange, LedgerError, LedgerRepository, LedgerSnapshot, Transaction,
};
use tally_shared::types::{AccountId, Currency, ProviderTransactionId, TransactionId};

/// SQLite-backed ledger repository.
#[derive(Debug, Clone)]
pub struct SqlLedgerRepository {
    db: DatabaseConnection,
}

impl SqlLedgerRepository {
    /// Creates a new ledger repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl LedgerRepository for SqlLedgerRepository {
    async fn create_account(&self, account: &Account) -> Result<(), LedgerError> {
        let existing = accounts::Entity::find_by_id(account.id.into_inner())
            .one(&self.db)
            .await
            .map_err(db_err)?;
        if existing.is_some() {
            return Err(LedgerError::AccountExists(account.id));
        }

        let now = Utc::now();
        let model = accounts::ActiveModel {
            id: Set(account.id.into_inner()),
            name: Set(account.name.clone()),
            currency: Set(account.currency.to_string()),
            anchor_balance: Set(account.anchor.balance.to_string()),
            anchor_date: Set(account.anchor.date),
            anchor_after: Set(account.anchor.after.map(TransactionId::into_inner)),
            next_sequence: Set(to_db_sequence(account.next_sequence)?),
            created_at: Set(now),
            updated_at: Set(now),
        };
        accounts::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await
            .map_err(db_err)?;

        tracing::debug!(account_id = %account.id, "account row created");
        Ok(())
    }

    async fn load_account(
        &self,
        account_id: AccountId,
    ) -> Result<Option<LedgerSnapshot>, LedgerError> {
        let txn = self.db.begin().await.map_err(db_err)?;
        let id = account_id.into_inner();

        let Some(account) = accounts::Entity::find_by_id(id)
            .one(&txn)
            .await
            .map_err(db_err)?
        else {
            return Ok(None);
        };

        let transactions = ledger_transactions::Entity::find()
            .filter(ledger_transactions::Column::AccountId.eq(id))
            .order_by_asc(ledger_transactions::Column::Date)
            .order_by_asc(ledger_transactions::Column::Sequence)
            .all(&txn)
            .await
            .map_err(db_err)?;

        let dismissed = dismissed_bank_references::Entity::find()
            .filter(dismissed_bank_references::Column::AccountId.eq(id))
            .order_by_asc(dismissed_bank_references::Column::ProviderTransactionId)
            .all(&txn)
            .await
            .map_err(db_err)?;

        txn.commit().await.map_err(db_err)?;

        Ok(Some(LedgerSnapshot {
            account: account_to_domain(account)?,
            transactions: transactions
                .into_iter()
                .map(transaction_to_domain)
                .collect::<Result<_, _>>()?,
            dismissed: dismissed
                .into_iter()
                .map(|row| stored_reference(&row.provider_transaction_id))
                .collect::<Result<_, _>>()?,
        }))
    }

    async fn apply_changes(
        &self,
        account: &Account,
        changes: &[LedgerChange],
    ) -> Result<(), LedgerError> {
        let txn = self.db.begin().await.map_err(db_err)?;
        let now = Utc::now();

        let updated = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::AnchorBalance,
                Expr::value(account.anchor.balance.to_string()),
            )
            .col_expr(accounts::Column::AnchorDate, Expr::value(account.anchor.date))
            .col_expr(
                accounts::Column::AnchorAfter,
                Expr::value(account.anchor.after.map(TransactionId::into_inner)),
            )
            .col_expr(
                accounts::Column::NextSequence,
                Expr::value(to_db_sequence(account.next_sequence)?),
            )
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now))
            .filter(accounts::Column::Id.eq(account.id.into_inner()))
            .exec(&txn)
            .await
            .map_err(db_err)?;
        if updated.rows_affected == 0 {
            return Err(LedgerError::AccountNotFound(account.id));
        }

        for change in changes {
            apply_change(&txn, account.id, change).await?;
        }

        txn.commit().await.map_err(db_err)?;
        tracing::debug!(
            account_id = %account.id,
            changes = changes.len(),
            "change set committed"
        );
        Ok(())
    }
}

async fn apply_change(
    txn: &DatabaseTransaction,
    account_id: AccountId,
    change: &LedgerChange,
) -> Result<(), LedgerError> {
    match change {
        LedgerChange::Inserted(transaction) => {
            ledger_transactions::Entity::insert(transaction_to_model(transaction)?)
                .exec_without_returning(txn)
                .await
                .map_err(db_err)?;
        }
        LedgerChange::Updated { after, .. } => {
            let result = ledger_transactions::Entity::update_many()
                .col_expr(ledger_transactions::Column::Date, Expr::value(after.date))
                .col_expr(
                    ledger_transactions::Column::Sequence,
                    Expr::value(to_db_sequence(after.sequence)?),
                )
                .col_expr(
                    ledger_transactions::Column::Payee,
                    Expr::value(after.payee.clone()),
                )
                .col_expr(
                    ledger_transactions::Column::Amount,
                    Expr::value(after.amount.to_string()),
                )
                .col_expr(
                    ledger_transactions::Column::Source,
                    Expr::value(after.source.as_str()),
                )
                .col_expr(
                    ledger_transactions::Column::Status,
                    Expr::value(after.status.as_str()),
                )
                .col_expr(
                    ledger_transactions::Column::LinkedTransactionId,
                    Expr::value(reference_column(after.linked_transaction_id.as_ref())),
                )
                .col_expr(
                    ledger_transactions::Column::ProviderTransactionId,
                    Expr::value(reference_column(after.provider_transaction_id.as_ref())),
                )
                .col_expr(
                    ledger_transactions::Column::Category,
                    Expr::value(after.category.clone()),
                )
                .col_expr(
                    ledger_transactions::Column::Notes,
                    Expr::value(after.notes.clone()),
                )
                .col_expr(ledger_transactions::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(ledger_transactions::Column::Id.eq(after.id.into_inner()))
                .exec(txn)
                .await
                .map_err(db_err)?;
            if result.rows_affected == 0 {
                return Err(LedgerError::PersistenceFailure(format!(
                    "transaction {} is missing from storage",
                    after.id
                )));
            }
        }
        LedgerChange::Removed(transaction) => {
            ledger_transactions::Entity::delete_by_id(transaction.id.into_inner())
                .exec(txn)
                .await
                .map_err(db_err)?;
        }
        // Written with the account row.
        LedgerChange::AnchorChanged { .. } => {}
        LedgerChange::BankReferenceDismissed(reference) => {
            let model = dismissed_bank_references::ActiveModel {
                account_id: Set(account_id.into_inner()),
                provider_transaction_id: Set(reference.as_str().to_string()),
                dismissed_at: Set(Utc::now()),
            };
            dismissed_bank_references::Entity::insert(model)
                .on_conflict(
                    OnConflict::columns([
                        dismissed_bank_references::Column::AccountId,
                        dismissed_bank_references::Column::ProviderTransactionId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(txn)
                .await
                .map_err(db_err)?;
        }
    }
    Ok(())
}

// ========== Mapping ==========

fn db_err(err: DbErr) -> LedgerError {
    LedgerError::PersistenceFailure(err.to_string())
}

fn corrupt(what: impl std::fmt::Display) -> LedgerError {
    LedgerError::PersistenceFailure(format!("corrupt ledger row: {what}"))
}

fn to_db_sequence(sequence: u64) -> Result<i64, LedgerError> {
    i64::try_from(sequence).map_err(|_| corrupt(format!("sequence {sequence} out of range")))
}

fn from_db_sequence(sequence: i64) -> Result<u64, LedgerError> {
    u64::try_from(sequence).map_err(|_| corrupt(format!("negative sequence {sequence}")))
}

fn parse_amount(raw: &str) -> Result<Decimal, LedgerError> {
    Decimal::from_str(raw).map_err(|e| corrupt(format!("amount {raw:?}: {e}")))
}

fn stored_reference(raw: &str) -> Result<ProviderTransactionId, LedgerError> {
    ProviderTransactionId::parse(raw).ok_or_else(|| corrupt("blank provider transaction id"))
}

fn optional_reference(raw: Option<&str>) -> Result<Option<ProviderTransactionId>, LedgerError> {
    raw.map(stored_reference).transpose()
}

fn reference_column(reference: Option<&ProviderTransactionId>) -> Option<String> {
    reference.map(|r| r.as_str().to_string())
}

fn account_to_domain(model: accounts::Model) -> Result<Account, LedgerError> {
    Ok(Account {
        id: AccountId::from_uuid(model.id),
        name: model.name,
        currency: Currency::from_str(&model.currency).map_err(corrupt)?,
        anchor: Anchor {
            balance: parse_amount(&model.anchor_balance)?,
            date: model.anchor_date,
            after: model.anchor_after.map(TransactionId::from_uuid),
        },
        next_sequence: from_db_sequence(model.next_sequence)?,
    })
}

fn transaction_to_domain(model: ledger_transactions::Model) -> Result<Transaction, LedgerError> {
    Ok(Transaction {
        id: TransactionId::from_uuid(model.id),
        account_id: AccountId::from_uuid(model.account_id),
        date: model.date,
        sequence: from_db_sequence(model.sequence)?,
        payee: model.payee,
        amount: parse_amount(&model.amount)?,
        source: model.source.parse().map_err(corrupt)?,
        status: model.status.parse().map_err(corrupt)?,
        linked_transaction_id: optional_reference(model.linked_transaction_id.as_deref())?,
        provider_transaction_id: optional_reference(model.provider_transaction_id.as_deref())?,
        category: model.category,
        notes: model.notes,
    })
}

fn transaction_to_model(
    transaction: &Transaction,
) -> Result<ledger_transactions::ActiveModel, LedgerError> {
    let now = Utc::now();
    Ok(ledger_transactions::ActiveModel {
        id: Set(transaction.id.into_inner()),
        account_id: Set(transaction.account_id.into_inner()),
        date: Set(transaction.date),
        sequence: Set(to_db_sequence(transaction.sequence)?),
        payee: Set(transaction.payee.clone()),
        amount: Set(transaction.amount.to_string()),
        source: Set(transaction.source.as_str().to_string()),
        status: Set(transaction.status.as_str().to_string()),
        linked_transaction_id: Set(reference_column(transaction.linked_transaction_id.as_ref())),
        provider_transaction_id: Set(reference_column(
            transaction.provider_transaction_id.as_ref(),
        )),
        category: Set(transaction.category.clone()),
        notes: Set(transaction.notes.clone()),
        created_at: Set(now),
        updated_at: Set(now),
    })
}
