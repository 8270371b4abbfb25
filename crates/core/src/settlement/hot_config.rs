//! Runtime-mutable settlement periods.
//!
//! Readers may see either the old or the new value of a period that is being
//! updated; nothing reads the four periods as one snapshot.

use std::time::Duration;

use async_trait::async_trait;
use plasma_shared::SettlementConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::ledger::{LedgerError, LedgerResult, OperationKind};

/// The four settlement periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementIntervals {
    /// Deposit settlement period.
    pub deposit: Duration,
    /// Transfer settlement period.
    pub transfer: Duration,
    /// Onchain withdrawal settlement period.
    pub onchain_withdrawal: Duration,
    /// Offchain withdrawal settlement period.
    pub offchain_withdrawal: Duration,
}

impl SettlementIntervals {
    /// Same period for every category.
    #[must_use]
    pub const fn uniform(period: Duration) -> Self {
        Self {
            deposit: period,
            transfer: period,
            onchain_withdrawal: period,
            offchain_withdrawal: period,
        }
    }

    /// Seed periods from the process configuration.
    #[must_use]
    pub const fn from_config(config: &SettlementConfig) -> Self {
        Self {
            deposit: Duration::from_secs(config.deposit_period_secs),
            transfer: Duration::from_secs(config.transfer_period_secs),
            onchain_withdrawal: Duration::from_secs(config.onchain_withdrawal_period_secs),
            offchain_withdrawal: Duration::from_secs(config.offchain_withdrawal_period_secs),
        }
    }

    /// Period of one category.
    #[must_use]
    pub const fn get(&self, kind: OperationKind) -> Duration {
        match kind {
            OperationKind::Deposit => self.deposit,
            OperationKind::Transfer => self.transfer,
            OperationKind::OnchainWithdrawal => self.onchain_withdrawal,
            OperationKind::OffchainWithdrawal => self.offchain_withdrawal,
        }
    }

    /// Replaces the period of one category.
    pub fn set(&mut self, kind: OperationKind, period: Duration) {
        match kind {
            OperationKind::Deposit => self.deposit = period,
            OperationKind::Transfer => self.transfer = period,
            OperationKind::OnchainWithdrawal => self.onchain_withdrawal = period,
            OperationKind::OffchainWithdrawal => self.offchain_withdrawal = period,
        }
    }
}

/// Source of the current settlement periods.
#[async_trait]
pub trait HotConfigSource: Send + Sync {
    /// Current period of one category.
    async fn period(&self, kind: OperationKind) -> LedgerResult<Duration>;

    /// Current deposit settlement period.
    async fn deposit_period(&self) -> LedgerResult<Duration> {
        self.period(OperationKind::Deposit).await
    }

    /// Current transfer settlement period.
    async fn transfer_period(&self) -> LedgerResult<Duration> {
        self.period(OperationKind::Transfer).await
    }

    /// Current onchain withdrawal settlement period.
    async fn onchain_withdrawal_period(&self) -> LedgerResult<Duration> {
        self.period(OperationKind::OnchainWithdrawal).await
    }

    /// Current offchain withdrawal settlement period.
    async fn offchain_withdrawal_period(&self) -> LedgerResult<Duration> {
        self.period(OperationKind::OffchainWithdrawal).await
    }
}

/// Hot configuration held in process memory.
#[derive(Debug, Default)]
pub struct MemoryHotConfig {
    intervals: RwLock<Option<SettlementIntervals>>,
}

impl MemoryHotConfig {
    /// Hot configuration initialized with `intervals`.
    #[must_use]
    pub fn new(intervals: SettlementIntervals) -> Self {
        Self {
            intervals: RwLock::new(Some(intervals)),
        }
    }

    /// Hot configuration that has not been initialized yet.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self::default()
    }

    /// Stores `intervals` unless already initialized. Returns whether it did.
    pub async fn init_if_absent(&self, intervals: SettlementIntervals) -> bool {
        let mut current = self.intervals.write().await;
        if current.is_some() {
            return false;
        }
        *current = Some(intervals);
        true
    }

    /// Changes one period.
    ///
    /// # Errors
    ///
    /// `ConfigUnavailable` if the configuration was never initialized.
    pub async fn update(&self, kind: OperationKind, period: Duration) -> LedgerResult<()> {
        let mut current = self.intervals.write().await;
        let intervals = current.as_mut().ok_or_else(not_initialized)?;
        intervals.set(kind, period);
        Ok(())
    }
}

fn not_initialized() -> LedgerError {
    LedgerError::ConfigUnavailable("hot config has not been initialized".to_string())
}

#[async_trait]
impl HotConfigSource for MemoryHotConfig {
    async fn period(&self, kind: OperationKind) -> LedgerResult<Duration> {
        self.intervals
            .read()
            .await
            .map(|intervals| intervals.get(kind))
            .ok_or_else(not_initialized)
    }
}
