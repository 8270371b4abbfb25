//! PostgreSQL implementation of the ledger store.
//!
//! Balance changes are conditional row updates (`balance + delta >= 0`)
//! executed inside one database transaction, so a refused delta rolls back
//! every delta before it. Updates are issued in ascending account id order to
//! keep lock acquisition consistent across concurrent transactions.

use async_trait::async_trait;
use chrono::Utc;
use plasma_core::ledger::{
    Account, BalanceDelta, Deposit, LedgerStore, NewAccount, NewOperation, OffchainWithdrawal,
    OnchainWithdrawal, Operation, OperationKind, OperationRecord, SettlementBatch, StoreError,
    StoreResult, Transfer, UniqueField,
};
use plasma_shared::types::{AccountId, BatchNumber, OperationId};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use tracing::debug;

use crate::entities::{accounts, ledger_operations};

/// Ledger store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    db: DatabaseConnection,
}

impl PgLedgerStore {
    /// Creates a new ledger store.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn backend(err: DbErr) -> StoreError {
    StoreError::backend(err.to_string())
}

fn into_account(model: accounts::Model) -> Account {
    Account {
        id: AccountId::new(model.id),
        address: model.address,
        username: model.username,
        password_hash: model.password_hash,
        balance: model.balance,
        created_at: model.created_at.into(),
    }
}

/// Advisory lock key guarding batch numbering for one category.
const fn batch_lock_key(kind: OperationKind) -> i64 {
    const NAMESPACE: i64 = 0x504C_4153_4D41_0000;
    NAMESPACE
        + match kind {
            OperationKind::Deposit => 1,
            OperationKind::Transfer => 2,
            OperationKind::OnchainWithdrawal => 3,
            OperationKind::OffchainWithdrawal => 4,
        }
}

fn corrupt(id: i64, column: &str) -> StoreError {
    StoreError::backend(format!("ledger operation {id} is missing {column}"))
}

fn into_record(model: ledger_operations::Model) -> StoreResult<OperationRecord> {
    let id = model.id;
    let kind: OperationKind = model.kind.parse().map_err(StoreError::backend)?;
    let account_id = AccountId::new(model.account_id);

    let operation = match kind {
        OperationKind::Deposit => Operation::Deposit(Deposit {
            account_id,
            value: model.value,
        }),
        OperationKind::Transfer => Operation::Transfer(Transfer {
            from_address: model.from_address.ok_or_else(|| corrupt(id, "from_address"))?,
            to_address: model.to_address.ok_or_else(|| corrupt(id, "to_address"))?,
            value: model.value,
            nonce: model.nonce.ok_or_else(|| corrupt(id, "nonce"))?,
            signature: model.signature.ok_or_else(|| corrupt(id, "signature"))?,
        }),
        OperationKind::OnchainWithdrawal => Operation::OnchainWithdrawal(OnchainWithdrawal {
            account_id,
            value: model.value,
            address: model.address.ok_or_else(|| corrupt(id, "address"))?,
        }),
        OperationKind::OffchainWithdrawal => Operation::OffchainWithdrawal(OffchainWithdrawal {
            value: model.value,
            address: model.address.ok_or_else(|| corrupt(id, "address"))?,
            nonce: model.nonce.ok_or_else(|| corrupt(id, "nonce"))?,
            signature: model.signature.ok_or_else(|| corrupt(id, "signature"))?,
        }),
    };

    Ok(OperationRecord {
        id: OperationId::new(id),
        account_id,
        operation,
        batch: model.batch_number.map(BatchNumber::new),
        created_at: model.created_at.into(),
        settled_at: model.settled_at.map(Into::into),
    })
}

fn operation_model(
    operation: NewOperation,
    now: DateTimeWithTimeZone,
) -> ledger_operations::ActiveModel {
    let mut model = ledger_operations::ActiveModel {
        account_id: Set(operation.account_id.into_inner()),
        kind: Set(operation.operation.kind().as_str().to_string()),
        value: Set(operation.operation.value()),
        from_address: Set(None),
        to_address: Set(None),
        address: Set(None),
        nonce: Set(None),
        signature: Set(None),
        batch_number: Set(None),
        settled_at: Set(None),
        created_at: Set(now),
        ..Default::default()
    };

    match operation.operation {
        Operation::Deposit(_) => {}
        Operation::Transfer(t) => {
            model.from_address = Set(Some(t.from_address));
            model.to_address = Set(Some(t.to_address));
            model.nonce = Set(Some(t.nonce));
            model.signature = Set(Some(t.signature));
        }
        Operation::OnchainWithdrawal(w) => {
            model.address = Set(Some(w.address));
        }
        Operation::OffchainWithdrawal(w) => {
            model.address = Set(Some(w.address));
            model.nonce = Set(Some(w.nonce));
            model.signature = Set(Some(w.signature));
        }
    }
    model
}

/// Maps a failed account insert, telling the two unique constraints apart.
fn insert_error(err: DbErr, address: String, username: Option<String>) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) if msg.contains("username") => {
            StoreError::Duplicate {
                field: UniqueField::Username,
                value: username.unwrap_or_default(),
            }
        }
        Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::Duplicate {
            field: UniqueField::Address,
            value: address,
        },
        _ => backend(err),
    }
}

/// Applies every delta on `conn`, failing on the first one that is refused.
/// The caller owns the transaction and rolls back on error.
async fn apply_deltas<C: ConnectionTrait>(conn: &C, deltas: &[BalanceDelta]) -> StoreResult<()> {
    let now: DateTimeWithTimeZone = Utc::now().into();

    let mut ordered = deltas.to_vec();
    // stable: deltas on the same account keep their relative order
    ordered.sort_by_key(|d| d.account_id);

    for d in ordered {
        let id = d.account_id.into_inner();
        let result = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::Balance,
                Expr::col(accounts::Column::Balance).add(d.delta),
            )
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now))
            .filter(accounts::Column::Id.eq(id))
            .filter(Expr::expr(Expr::col(accounts::Column::Balance).add(d.delta)).gte(0))
            .exec(conn)
            .await
            .map_err(backend)?;

        if result.rows_affected == 0 {
            let current = accounts::Entity::find_by_id(id)
                .one(conn)
                .await
                .map_err(backend)?;
            return Err(match current {
                None => StoreError::AccountNotFound(d.account_id),
                Some(account) => StoreError::Overdraft {
                    account_id: d.account_id,
                    available: account.balance,
                    requested: -d.delta,
                },
            });
        }
    }
    Ok(())
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert_account(&self, account: NewAccount) -> StoreResult<Account> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let address = account.address.clone();
        let username = account.username.clone();

        let model = accounts::ActiveModel {
            address: Set(account.address),
            username: Set(account.username),
            password_hash: Set(account.password_hash),
            balance: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        model
            .insert(&self.db)
            .await
            .map(into_account)
            .map_err(|e| insert_error(e, address, username))
    }

    async fn account_by_id(&self, id: AccountId) -> StoreResult<Option<Account>> {
        accounts::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map(|found| found.map(into_account))
            .map_err(backend)
    }

    async fn account_by_address(&self, address: &str) -> StoreResult<Option<Account>> {
        accounts::Entity::find()
            .filter(accounts::Column::Address.eq(address))
            .one(&self.db)
            .await
            .map(|found| found.map(into_account))
            .map_err(backend)
    }

    async fn account_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        accounts::Entity::find()
            .filter(accounts::Column::Username.eq(username))
            .one(&self.db)
            .await
            .map(|found| found.map(into_account))
            .map_err(backend)
    }

    async fn adjust_balances(&self, deltas: &[BalanceDelta]) -> StoreResult<()> {
        let txn = self.db.begin().await.map_err(backend)?;
        apply_deltas(&txn, deltas).await?;
        txn.commit().await.map_err(backend)
    }

    async fn post_operation(
        &self,
        deltas: &[BalanceDelta],
        operation: NewOperation,
    ) -> StoreResult<OperationRecord> {
        let owner = operation.account_id;
        let txn = self.db.begin().await.map_err(backend)?;

        if accounts::Entity::find_by_id(owner.into_inner())
            .one(&txn)
            .await
            .map_err(backend)?
            .is_none()
        {
            return Err(StoreError::AccountNotFound(owner));
        }
        apply_deltas(&txn, deltas).await?;

        let model = operation_model(operation, Utc::now().into())
            .insert(&txn)
            .await
            .map_err(backend)?;
        txn.commit().await.map_err(backend)?;

        into_record(model)
    }

    async fn operations_for_account(
        &self,
        account_id: AccountId,
    ) -> StoreResult<Vec<OperationRecord>> {
        ledger_operations::Entity::find()
            .filter(ledger_operations::Column::AccountId.eq(account_id.into_inner()))
            .order_by_asc(ledger_operations::Column::Id)
            .all(&self.db)
            .await
            .map_err(backend)?
            .into_iter()
            .map(into_record)
            .collect()
    }

    async fn pending_operations(&self, kind: OperationKind) -> StoreResult<Vec<OperationRecord>> {
        ledger_operations::Entity::find()
            .filter(ledger_operations::Column::Kind.eq(kind.as_str()))
            .filter(ledger_operations::Column::BatchNumber.is_null())
            .order_by_asc(ledger_operations::Column::Id)
            .all(&self.db)
            .await
            .map_err(backend)?
            .into_iter()
            .map(into_record)
            .collect()
    }

    async fn settle_operations(
        &self,
        kind: OperationKind,
        ids: &[OperationId],
    ) -> StoreResult<Option<SettlementBatch>> {
        if ids.is_empty() {
            return Ok(None);
        }
        let raw_ids: Vec<i64> = ids.iter().map(|id| id.into_inner()).collect();
        let txn = self.db.begin().await.map_err(backend)?;

        // held until commit; one batch number allocation per kind at a time
        txn.execute_unprepared(&format!(
            "SELECT pg_advisory_xact_lock({})",
            batch_lock_key(kind)
        ))
        .await
        .map_err(backend)?;

        // FOR UPDATE: a concurrent settle of the same rows waits, then sees
        // them settled and skips them
        let rows = ledger_operations::Entity::find()
            .filter(ledger_operations::Column::Id.is_in(raw_ids))
            .filter(ledger_operations::Column::Kind.eq(kind.as_str()))
            .filter(ledger_operations::Column::BatchNumber.is_null())
            .order_by_asc(ledger_operations::Column::Id)
            .lock_exclusive()
            .all(&txn)
            .await
            .map_err(backend)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let last: Option<i64> = ledger_operations::Entity::find()
            .filter(ledger_operations::Column::Kind.eq(kind.as_str()))
            .select_only()
            .column_as(ledger_operations::Column::BatchNumber.max(), "max_batch")
            .into_tuple::<Option<i64>>()
            .one(&txn)
            .await
            .map_err(backend)?
            .flatten();
        let number = last.map_or(BatchNumber::FIRST, |n| BatchNumber::new(n).next());

        let settled_at: DateTimeWithTimeZone = Utc::now().into();
        let locked: Vec<i64> = rows.iter().map(|r| r.id).collect();
        ledger_operations::Entity::update_many()
            .col_expr(
                ledger_operations::Column::BatchNumber,
                Expr::value(number.into_inner()),
            )
            .col_expr(ledger_operations::Column::SettledAt, Expr::value(settled_at))
            .filter(ledger_operations::Column::Id.is_in(locked))
            .exec(&txn)
            .await
            .map_err(backend)?;
        txn.commit().await.map_err(backend)?;

        debug!(%kind, batch = %number, operations = rows.len(), "Batch persisted");

        let operations = rows
            .into_iter()
            .map(|mut row| {
                row.batch_number = Some(number.into_inner());
                row.settled_at = Some(settled_at);
                into_record(row)
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Some(SettlementBatch {
            kind,
            number,
            operations,
            settled_at: settled_at.into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_batch_lock_keys_are_distinct_per_kind() {
        let kinds = [
            OperationKind::Deposit,
            OperationKind::Transfer,
            OperationKind::OnchainWithdrawal,
            OperationKind::OffchainWithdrawal,
        ];
        let keys: HashSet<i64> = kinds.into_iter().map(batch_lock_key).collect();
        assert_eq!(keys.len(), kinds.len());
    }

    fn row(kind: &str) -> ledger_operations::Model {
        ledger_operations::Model {
            id: 7,
            account_id: 3,
            kind: kind.to_string(),
            value: 25,
            from_address: Some("0xA".into()),
            to_address: Some("0xB".into()),
            address: Some("0xC".into()),
            nonce: Some(1),
            signature: Some("0xsig".into()),
            batch_number: None,
            settled_at: None,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_row_to_record() {
        let record = into_record(row("onchain_withdrawal")).unwrap();
        assert_eq!(record.id, OperationId::new(7));
        assert_eq!(
            record.operation,
            Operation::OnchainWithdrawal(OnchainWithdrawal {
                account_id: AccountId::new(3),
                value: 25,
                address: "0xC".into(),
            })
        );
        assert!(!record.is_settled());
    }

    #[test]
    fn test_incomplete_transfer_row_is_rejected() {
        let mut model = row("transfer");
        model.to_address = None;
        assert!(matches!(into_record(model), Err(StoreError::Backend(msg)) if msg.contains("to_address")));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(into_record(row("refund")).is_err());
    }

    #[test]
    fn test_operation_model_sets_kind_columns() {
        let model = operation_model(
            NewOperation {
                account_id: AccountId::new(3),
                operation: Operation::OffchainWithdrawal(OffchainWithdrawal {
                    value: 5,
                    address: "0xdead".into(),
                    nonce: 2,
                    signature: "0xsig".into(),
                }),
            },
            Utc::now().into(),
        );
        assert_eq!(model.kind, Set("offchain_withdrawal".to_string()));
        assert_eq!(model.address, Set(Some("0xdead".to_string())));
        assert_eq!(model.from_address, Set(None));
    }
}
