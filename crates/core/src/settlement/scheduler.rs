//! Periodic settlement loops, one per operation category.
//!
//! Each loop re-reads its period from the hot configuration at the start of
//! every cycle, then waits for either the period or cancellation. A hook that
//! is already running is never interrupted; cancellation is only observed
//! between cycles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::hot_config::HotConfigSource;
use crate::ledger::{LedgerResult, OperationKind, SettlementBatch};

/// Shortest wait a loop will ever use.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Batch work invoked by the settlement loops.
#[async_trait]
pub trait SettlementHooks: Send + Sync {
    /// Settles every pending operation of `kind`.
    async fn execute(&self, kind: OperationKind) -> LedgerResult<Option<SettlementBatch>>;
}

/// A single settlement loop.
#[derive(Clone)]
pub struct SettlementLoop {
    kind: OperationKind,
    hot_config: Arc<dyn HotConfigSource>,
    hooks: Arc<dyn SettlementHooks>,
    fallback: Duration,
}

impl SettlementLoop {
    /// Creates a loop for `kind`. A zero `fallback` is raised to 1 ms.
    #[must_use]
    pub fn new(
        kind: OperationKind,
        hot_config: Arc<dyn HotConfigSource>,
        hooks: Arc<dyn SettlementHooks>,
        fallback: Duration,
    ) -> Self {
        Self {
            kind,
            hot_config,
            hooks,
            fallback: fallback.max(MIN_PERIOD),
        }
    }

    /// Category this loop settles.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Period for the next cycle.
    ///
    /// Falls back to the configured fallback when the hot configuration
    /// cannot be read or reports a zero period.
    pub async fn current_period(&self) -> Duration {
        let kind = self.kind;
        match self.hot_config.period(kind).await {
            Ok(period) if !period.is_zero() => period,
            Ok(_) => {
                warn!(%kind, fallback = ?self.fallback, "Settlement period is zero, using fallback");
                self.fallback
            }
            Err(e) => {
                warn!(%kind, error = %e, fallback = ?self.fallback, "Settlement period unavailable, using fallback");
                self.fallback
            }
        }
    }

    /// Runs until `token` is cancelled. Returns the number of cycles run.
    pub async fn run(self, token: CancellationToken) -> u64 {
        let kind = self.kind;
        info!(%kind, "Settlement loop started");

        let mut cycles = 0u64;
        loop {
            let period = self.current_period().await;
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = tokio::time::sleep(period) => {}
            }

            cycles += 1;
            match self.hooks.execute(kind).await {
                Ok(Some(batch)) => debug!(
                    %kind,
                    batch = %batch.number,
                    operations = batch.len(),
                    "Settlement cycle finished"
                ),
                Ok(None) => debug!(%kind, "Settlement cycle idle"),
                Err(e) => error!(%kind, error = %e, "Settlement cycle failed"),
            }
        }

        info!(%kind, cycles, "Settlement loop stopped");
        cycles
    }
}

/// Starts and owns the settlement loops.
pub struct SettlementScheduler {
    hot_config: Arc<dyn HotConfigSource>,
    hooks: Arc<dyn SettlementHooks>,
    fallback: Duration,
}

impl SettlementScheduler {
    /// Creates a scheduler. Nothing runs until [`Self::start`].
    #[must_use]
    pub fn new(
        hot_config: Arc<dyn HotConfigSource>,
        hooks: Arc<dyn SettlementHooks>,
        fallback: Duration,
    ) -> Self {
        Self {
            hot_config,
            hooks,
            fallback,
        }
    }

    /// Builds the loop for one category without spawning it.
    #[must_use]
    pub fn settlement_loop(&self, kind: OperationKind) -> SettlementLoop {
        SettlementLoop::new(
            kind,
            Arc::clone(&self.hot_config),
            Arc::clone(&self.hooks),
            self.fallback,
        )
    }

    /// Spawns one loop per category on the current tokio runtime.
    #[must_use]
    pub fn start(&self) -> SchedulerHandle {
        self.start_kinds(&OperationKind::ALL)
    }

    /// Spawns loops for the given categories only.
    #[must_use]
    pub fn start_kinds(&self, kinds: &[OperationKind]) -> SchedulerHandle {
        let token = CancellationToken::new();
        let tasks = kinds
            .iter()
            .map(|&kind| {
                let settlement_loop = self.settlement_loop(kind);
                (kind, tokio::spawn(settlement_loop.run(token.child_token())))
            })
            .collect();
        SchedulerHandle { token, tasks }
    }
}

/// Handle to running settlement loops.
pub struct SchedulerHandle {
    token: CancellationToken,
    tasks: Vec<(OperationKind, JoinHandle<u64>)>,
}

impl SchedulerHandle {
    /// Whether any loop is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|(_, task)| !task.is_finished())
    }

    /// Cancels every loop and waits up to `grace` for them to exit.
    ///
    /// Loops still running at the deadline, typically inside a slow hook,
    /// are detached rather than aborted: the batch in progress completes and
    /// the loop exits at its next cancellation check. Returns `true` if every
    /// loop exited within `grace`.
    pub async fn shutdown(self, grace: Duration) -> bool {
        self.token.cancel();
        let deadline = Instant::now() + grace;

        let mut clean = true;
        for (kind, mut task) in self.tasks {
            // dropping the handle on timeout detaches the task
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(cycles)) => debug!(%kind, cycles, "Settlement loop joined"),
                Ok(Err(e)) => {
                    clean = false;
                    error!(%kind, error = %e, "Settlement loop terminated abnormally");
                }
                Err(_) => {
                    clean = false;
                    warn!(
                        %kind,
                        ?grace,
                        "Settlement loop exceeded shutdown grace, leaving batch to finish"
                    );
                }
            }
        }
        clean
    }
}
