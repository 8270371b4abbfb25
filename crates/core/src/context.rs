//! Wiring of the long-lived services.
//!
//! Everything the operator and the scheduler share is reached through a
//! [`PlasmaContext`] built once at startup; there is no process-global state.

use std::sync::Arc;
use std::time::Duration;

use plasma_shared::SettlementConfig;

use crate::ledger::{AccountLedger, LedgerStore, MemoryLedgerStore};
use crate::operator::{OnchainSubmitter, Operator};
use crate::settlement::{HotConfigSource, MemoryHotConfig, SettlementIntervals, SettlementScheduler};

/// Shared handles to the store, the ledger and the hot configuration.
#[derive(Clone)]
pub struct PlasmaContext {
    store: Arc<dyn LedgerStore>,
    ledger: Arc<AccountLedger>,
    hot_config: Arc<dyn HotConfigSource>,
}

impl PlasmaContext {
    /// Builds a context over the given store and hot configuration.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, hot_config: Arc<dyn HotConfigSource>) -> Self {
        let ledger = Arc::new(AccountLedger::new(Arc::clone(&store)));
        Self {
            store,
            ledger,
            hot_config,
        }
    }

    /// A context backed entirely by process memory, with periods seeded from
    /// `settlement`.
    #[must_use]
    pub fn in_memory(settlement: &SettlementConfig) -> Self {
        Self::new(
            Arc::new(MemoryLedgerStore::new()),
            Arc::new(MemoryHotConfig::new(SettlementIntervals::from_config(
                settlement,
            ))),
        )
    }

    /// The ledger store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// The account ledger. All operators built from this context share it.
    #[must_use]
    pub fn ledger(&self) -> &Arc<AccountLedger> {
        &self.ledger
    }

    /// The hot configuration.
    #[must_use]
    pub fn hot_config(&self) -> &Arc<dyn HotConfigSource> {
        &self.hot_config
    }

    /// An operator over this context's ledger.
    #[must_use]
    pub fn operator(&self, submitter: Arc<dyn OnchainSubmitter>) -> Arc<Operator> {
        Arc::new(Operator::new(Arc::clone(&self.ledger), submitter))
    }

    /// A scheduler driving `operator`'s batch hooks.
    #[must_use]
    pub fn scheduler(&self, operator: Arc<Operator>, fallback: Duration) -> SettlementScheduler {
        SettlementScheduler::new(Arc::clone(&self.hot_config), operator, fallback)
    }
}
