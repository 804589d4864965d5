//! Command-line driver for a tally ledger database.
//!
//! Usage:
//!   tally open <name> <currency> <balance> <yyyy-mm-dd>
//!   tally sync <account-id> <batch.json>
//!   tally ledger <account-id>
//!   tally pending <account-id>
//!
//! `sync` reads a JSON array of bank-feed transactions and prints the
//! reconciliation summary. Replaying the same file is a no-op.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm_migration::MigratorTrait;
use tracing::info;

use tally_core::ledger::LedgerService;
use tally_core::reconciliation::BankTransaction;
use tally_db::{Migrator, SqlLedgerRepository, connect_with};
use tally_shared::AppConfig;
use tally_shared::telemetry;
use tally_shared::types::{AccountId, Currency};

const USAGE: &str = "usage: tally <open|sync|ledger|pending> ...";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    telemetry::init(&config.logging);

    let db = connect_with(&config.database).await?;
    Migrator::up(&db, None).await?;
    info!("Connected to database");

    let service = LedgerService::new(
        Arc::new(SqlLedgerRepository::new(db)),
        config.reconciliation,
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        bail!(USAGE);
    };

    match (command.as_str(), rest) {
        ("open", [name, currency, balance, date]) => {
            let currency = Currency::from_str(currency).map_err(anyhow::Error::msg)?;
            let balance = Decimal::from_str(balance).context("Invalid starting balance")?;
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").context("Invalid date")?;
            let account = service.open_account(name, currency, balance, date).await?;
            println!("{}", serde_json::to_string_pretty(&account)?);
        }
        ("sync", [account, path]) => {
            let account = parse_account(account)?;
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read batch file {path}"))?;
            let batch: Vec<BankTransaction> =
                serde_json::from_str(&raw).context("Batch file is not a list of bank transactions")?;
            let summary = service.reconcile(account, batch).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        ("ledger", [account]) => {
            let rows = service.list_ordered(parse_account(account)?).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        ("pending", [account]) => {
            let rows = service.unreconciled(parse_account(account)?).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => bail!(USAGE),
    }

    Ok(())
}

fn parse_account(raw: &str) -> anyhow::Result<AccountId> {
    AccountId::from_str(raw).with_context(|| format!("Invalid account id: {raw}"))
}
