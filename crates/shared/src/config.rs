//! Application configuration management.

use std::time::Duration;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Database configuration. When absent the operator runs on the in-memory store.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// Settlement schedule configuration.
    #[serde(default)]
    pub settlement: SettlementConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Settlement schedule configuration.
///
/// The four periods only seed the hot configuration the first time it is
/// initialized; afterwards the stored hot configuration wins.
#[derive(Debug, Clone, Deserialize)]
pub struct SettlementConfig {
    /// Seconds between deposit settlement cycles.
    #[serde(default = "default_period_secs")]
    pub deposit_period_secs: u64,
    /// Seconds between transfer settlement cycles.
    #[serde(default = "default_period_secs")]
    pub transfer_period_secs: u64,
    /// Seconds between onchain withdrawal settlement cycles.
    #[serde(default = "default_period_secs")]
    pub onchain_withdrawal_period_secs: u64,
    /// Seconds between offchain withdrawal settlement cycles.
    #[serde(default = "default_period_secs")]
    pub offchain_withdrawal_period_secs: u64,
    /// Period used when the hot configuration is unreadable or zero.
    #[serde(default = "default_period_secs")]
    pub fallback_period_secs: u64,
    /// How long shutdown waits for the settlement loops to exit.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_period_secs() -> u64 {
    10
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            deposit_period_secs: default_period_secs(),
            transfer_period_secs: default_period_secs(),
            onchain_withdrawal_period_secs: default_period_secs(),
            offchain_withdrawal_period_secs: default_period_secs(),
            fallback_period_secs: default_period_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl SettlementConfig {
    /// Fallback period as a [`Duration`], never shorter than one second.
    #[must_use]
    pub fn fallback_period(&self) -> Duration {
        Duration::from_secs(self.fallback_period_secs.max(1))
    }

    /// Shutdown grace period as a [`Duration`].
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// Sources, later ones winning: `config/default`, `config/{RUN_MODE}`,
    /// then `PLASMA__*` environment variables
    /// (e.g. `PLASMA__SETTLEMENT__DEPOSIT_PERIOD_SECS=30`).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("PLASMA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
