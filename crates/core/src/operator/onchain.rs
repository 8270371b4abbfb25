//! Hand-off of onchain withdrawals to the chain side.

use async_trait::async_trait;
use tracing::info;

use crate::ledger::{LedgerResult, Operation, OperationRecord};

/// Receives onchain withdrawals before they are marked settled.
///
/// The same records may be offered again if marking them settled fails
/// afterwards, so implementations deduplicate by `OperationRecord::id`.
#[async_trait]
pub trait OnchainSubmitter: Send + Sync {
    /// Submits one batch of pending onchain withdrawals.
    async fn submit(&self, records: &[OperationRecord]) -> LedgerResult<()>;
}

/// Submitter that only logs each payout.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSubmitter;

#[async_trait]
impl OnchainSubmitter for LoggingSubmitter {
    async fn submit(&self, records: &[OperationRecord]) -> LedgerResult<()> {
        for record in records {
            if let Operation::OnchainWithdrawal(w) = &record.operation {
                info!(
                    operation_id = %record.id,
                    account_id = %w.account_id,
                    address = %w.address,
                    value = w.value,
                    "Onchain payout"
                );
            }
        }
        Ok(())
    }
}
