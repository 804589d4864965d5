//! Ledger schema.
//!
//! Creates accounts, their transactions and the dismissed bank references.
//! Amounts are TEXT holding canonical decimal strings, so values round-trip
//! exactly and column affinity never coerces them to floating point.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        for statement in LEDGER_SCHEMA {
            db.execute_unprepared(statement).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP TABLE IF EXISTS dismissed_bank_references;")
            .await?;
        db.execute_unprepared("DROP TABLE IF EXISTS ledger_transactions;")
            .await?;
        db.execute_unprepared("DROP TABLE IF EXISTS accounts;")
            .await?;
        Ok(())
    }
}

const LEDGER_SCHEMA: [&str; 7] = [
    r"
CREATE TABLE accounts (
    id BLOB PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    currency TEXT NOT NULL,
    anchor_balance TEXT NOT NULL,
    anchor_date TEXT NOT NULL,
    anchor_after BLOB,
    next_sequence INTEGER NOT NULL CHECK (next_sequence >= 1),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);",
    r"
CREATE TABLE ledger_transactions (
    id BLOB PRIMARY KEY NOT NULL,
    account_id BLOB NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    date TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    payee TEXT NOT NULL,
    amount TEXT NOT NULL,
    source TEXT NOT NULL CHECK (source IN ('manual', 'bank')),
    status TEXT NOT NULL CHECK (status IN ('pending', 'converted', 'bank_confirmed')),
    linked_transaction_id TEXT,
    provider_transaction_id TEXT,
    category TEXT,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CONSTRAINT chk_status_links CHECK (
        (status = 'pending' AND source = 'manual'
            AND linked_transaction_id IS NULL AND provider_transaction_id IS NULL)
        OR (status = 'converted' AND source = 'manual'
            AND linked_transaction_id IS NOT NULL AND provider_transaction_id IS NULL)
        OR (status = 'bank_confirmed' AND source = 'bank'
            AND provider_transaction_id IS NOT NULL AND linked_transaction_id IS NULL)
    )
);",
    // Sequence is the tiebreaker of the total order
    r"
CREATE UNIQUE INDEX idx_ledger_transactions_sequence
    ON ledger_transactions(account_id, sequence);",
    r"
CREATE UNIQUE INDEX idx_ledger_transactions_provider
    ON ledger_transactions(account_id, provider_transaction_id)
    WHERE provider_transaction_id IS NOT NULL;",
    r"
CREATE UNIQUE INDEX idx_ledger_transactions_linked
    ON ledger_transactions(account_id, linked_transaction_id)
    WHERE linked_transaction_id IS NOT NULL;",
    r"
CREATE INDEX idx_ledger_transactions_order
    ON ledger_transactions(account_id, date, sequence);",
    r"
CREATE TABLE dismissed_bank_references (
    account_id BLOB NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    provider_transaction_id TEXT NOT NULL,
    dismissed_at TEXT NOT NULL,
    PRIMARY KEY (account_id, provider_transaction_id)
);",
];
