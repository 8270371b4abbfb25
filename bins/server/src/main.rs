//! Plasma operator
//!
//! Main entry point: opens the ledger store, starts the four settlement loops
//! and runs until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plasma_core::PlasmaContext;
use plasma_core::operator::LoggingSubmitter;
use plasma_core::settlement::SettlementIntervals;
use plasma_db::migration::{Migrator, MigratorTrait};
use plasma_db::{HotConfigRepository, PgLedgerStore, connect};
use plasma_shared::{AppConfig, DatabaseConfig, SettlementConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plasma=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let context = match &config.database {
        Some(database) => postgres_context(database, &config.settlement).await?,
        None => {
            warn!("No database configured, ledger state will not survive a restart");
            PlasmaContext::in_memory(&config.settlement)
        }
    };

    let operator = context.operator(Arc::new(LoggingSubmitter));
    let scheduler = context
        .scheduler(operator, config.settlement.fallback_period())
        .start();
    info!("Settlement scheduler started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    if !scheduler
        .shutdown(config.settlement.shutdown_grace())
        .await
    {
        warn!("Some settlement loops were still running a batch at shutdown");
    }
    info!("Plasma operator stopped");

    Ok(())
}

/// Connects, applies pending migrations and seeds the hot configuration.
async fn postgres_context(
    database: &DatabaseConfig,
    settlement: &SettlementConfig,
) -> anyhow::Result<PlasmaContext> {
    let db = connect(database)
        .await
        .context("Failed to connect to database")?;
    info!("Connected to database");

    Migrator::up(&db, None)
        .await
        .context("Failed to apply migrations")?;

    let hot_config = HotConfigRepository::new(db.clone());
    if !hot_config
        .init_if_absent(SettlementIntervals::from_config(settlement))
        .await?
    {
        info!("Using stored hot config");
    }

    Ok(PlasmaContext::new(
        Arc::new(PgLedgerStore::new(db)),
        Arc::new(hot_config),
    ))
}
