//! Hot configuration repository.
//!
//! The settlement periods live in a single `hot_config` row so operators can
//! change them while the server runs. Every read goes to the database; the
//! scheduler reads once per cycle.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use plasma_core::ledger::{LedgerError, LedgerResult, OperationKind};
use plasma_core::settlement::{HotConfigSource, SettlementIntervals};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use tracing::info;

use crate::entities::hot_config;

const ROW_ID: i32 = 1;

/// Hot configuration stored in PostgreSQL.
#[derive(Debug, Clone)]
pub struct HotConfigRepository {
    db: DatabaseConnection,
}

/// Stored periods are whole milliseconds. A non-zero period shorter than
/// that is kept at 1 ms rather than rounded down to zero.
fn to_millis(period: Duration) -> i64 {
    if period.is_zero() {
        return 0;
    }
    i64::try_from(period.as_millis()).unwrap_or(i64::MAX).max(1)
}

/// Negative values cannot pass the table's check constraint; treat them as
/// zero so the scheduler falls back.
fn from_millis(millis: i64) -> Duration {
    Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}

fn into_intervals(model: &hot_config::Model) -> SettlementIntervals {
    SettlementIntervals {
        deposit: from_millis(model.deposit_period_ms),
        transfer: from_millis(model.transfer_period_ms),
        onchain_withdrawal: from_millis(model.onchain_withdrawal_period_ms),
        offchain_withdrawal: from_millis(model.offchain_withdrawal_period_ms),
    }
}

const fn period_column(kind: OperationKind) -> hot_config::Column {
    match kind {
        OperationKind::Deposit => hot_config::Column::DepositPeriodMs,
        OperationKind::Transfer => hot_config::Column::TransferPeriodMs,
        OperationKind::OnchainWithdrawal => hot_config::Column::OnchainWithdrawalPeriodMs,
        OperationKind::OffchainWithdrawal => hot_config::Column::OffchainWithdrawalPeriodMs,
    }
}

impl HotConfigRepository {
    /// Creates a new hot configuration repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Stores `intervals` unless the row already exists. Returns whether it
    /// was inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn init_if_absent(&self, intervals: SettlementIntervals) -> Result<bool, DbErr> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let row = hot_config::ActiveModel {
            id: Set(ROW_ID),
            deposit_period_ms: Set(to_millis(intervals.deposit)),
            transfer_period_ms: Set(to_millis(intervals.transfer)),
            onchain_withdrawal_period_ms: Set(to_millis(intervals.onchain_withdrawal)),
            offchain_withdrawal_period_ms: Set(to_millis(intervals.offchain_withdrawal)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = hot_config::Entity::insert(row)
            .on_conflict(
                OnConflict::column(hot_config::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        if inserted > 0 {
            info!(?intervals, "Hot config initialized");
        }
        Ok(inserted > 0)
    }

    /// Current periods, or `None` if the row was never initialized.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn load(&self) -> Result<Option<SettlementIntervals>, DbErr> {
        Ok(hot_config::Entity::find_by_id(ROW_ID)
            .one(&self.db)
            .await?
            .as_ref()
            .map(into_intervals))
    }

    /// Changes one period. Returns `false` if the row does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn update(&self, kind: OperationKind, period: Duration) -> Result<bool, DbErr> {
        let result = hot_config::Entity::update_many()
            .col_expr(period_column(kind), Expr::value(to_millis(period)))
            .col_expr(
                hot_config::Column::UpdatedAt,
                Expr::value(DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(hot_config::Column::Id.eq(ROW_ID))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            info!(%kind, ?period, "Settlement period updated");
        }
        Ok(result.rows_affected > 0)
    }
}

#[async_trait]
impl HotConfigSource for HotConfigRepository {
    async fn period(&self, kind: OperationKind) -> LedgerResult<Duration> {
        self.load()
            .await
            .map_err(|e| LedgerError::StorageFailure(e.to_string()))?
            .map(|intervals| intervals.get(kind))
            .ok_or_else(|| {
                LedgerError::ConfigUnavailable("hot_config row has not been initialized".into())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millisecond_conversion() {
        assert_eq!(to_millis(Duration::from_millis(2_500)), 2_500);
        assert_eq!(to_millis(Duration::ZERO), 0);
        assert_eq!(to_millis(Duration::from_micros(300)), 1);
        assert_eq!(from_millis(30_000), Duration::from_secs(30));
        assert_eq!(from_millis(-5), Duration::ZERO);
    }

    #[test]
    fn test_subsecond_period_survives_storage() {
        let period = Duration::from_millis(100);
        assert_eq!(from_millis(to_millis(period)), period);

        let intervals = SettlementIntervals::uniform(period);
        let now: DateTimeWithTimeZone = Utc::now().into();
        let model = hot_config::Model {
            id: ROW_ID,
            deposit_period_ms: to_millis(intervals.deposit),
            transfer_period_ms: to_millis(intervals.transfer),
            onchain_withdrawal_period_ms: to_millis(intervals.onchain_withdrawal),
            offchain_withdrawal_period_ms: to_millis(intervals.offchain_withdrawal),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(into_intervals(&model), intervals);
    }

    #[test]
    fn test_row_to_intervals() {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let model = hot_config::Model {
            id: ROW_ID,
            deposit_period_ms: 1_000,
            transfer_period_ms: 2_000,
            onchain_withdrawal_period_ms: 3_000,
            offchain_withdrawal_period_ms: 4_500,
            created_at: now,
            updated_at: now,
        };
        let intervals = into_intervals(&model);
        assert_eq!(intervals.get(OperationKind::Transfer), Duration::from_secs(2));
        assert_eq!(
            intervals.get(OperationKind::OffchainWithdrawal),
            Duration::from_millis(4_500)
        );
    }
}
