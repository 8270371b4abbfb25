//! Database seeder for Plasma development and testing.
//!
//! Registers the two demo accounts and credits their opening deposits.
//! Accounts that already exist are left alone.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use anyhow::Context;
use plasma_core::PlasmaContext;
use plasma_core::ledger::{Deposit, LedgerError};
use plasma_core::operator::{LoggingSubmitter, Operator};
use plasma_core::settlement::MemoryHotConfig;
use plasma_db::migration::{Migrator, MigratorTrait};
use plasma_db::{PgLedgerStore, connect};
use plasma_shared::AppConfig;

/// Demo accounts: username, password, address, opening deposit.
const DEMO_ACCOUNTS: [(&str, &str, &str, i64); 2] = [
    ("user0", "pass0", "0x0", 100),
    ("user1", "pass1", "0x1", 200),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let database = config
        .database
        .context("PLASMA__DATABASE__URL must be set to seed a database")?;

    println!("Connecting to database...");
    let db = connect(&database)
        .await
        .context("Failed to connect to database")?;
    Migrator::up(&db, None)
        .await
        .context("Failed to apply migrations")?;

    // The seeder never schedules settlement, so the hot config is not touched
    let context = PlasmaContext::new(
        Arc::new(PgLedgerStore::new(db)),
        Arc::new(MemoryHotConfig::unconfigured()),
    );
    let operator = context.operator(Arc::new(LoggingSubmitter));

    println!("Seeding demo accounts...");
    for (username, password, address, deposit) in DEMO_ACCOUNTS {
        seed_account(&operator, username, password, address, deposit).await?;
    }

    println!("Seeding complete!");
    Ok(())
}

async fn seed_account(
    operator: &Operator,
    username: &str,
    password: &str,
    address: &str,
    deposit: i64,
) -> anyhow::Result<()> {
    let account = match operator.register_account(username, password, address).await {
        Ok(account) => account,
        Err(LedgerError::UsernameTaken(_) | LedgerError::AddressTaken(_)) => {
            println!("  {username} already exists, skipping...");
            return Ok(());
        }
        Err(e) => return Err(e).context(format!("Failed to register {username}")),
    };

    operator
        .record_deposit(Deposit {
            account_id: account.id,
            value: deposit,
        })
        .await
        .with_context(|| format!("Failed to credit {username}"))?;
    println!("  {username} ({address}) created with balance {deposit}");
    Ok(())
}
