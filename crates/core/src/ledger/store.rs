//! The ledger store capability.
//!
//! The core never talks to a database directly. Everything it persists goes
//! through [`LedgerStore`], which has an in-memory implementation in
//! [`super::memory`] and a PostgreSQL implementation in `plasma-db`.

use std::fmt;

use async_trait::async_trait;
use plasma_shared::types::{AccountId, OperationId};
use thiserror::Error;

use super::account::{Account, BalanceDelta, NewAccount};
use super::operation::{NewOperation, OperationKind, OperationRecord, SettlementBatch};

/// Result type alias using `StoreError`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Unique account attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    /// `Account::username`.
    Username,
    /// `Account::address`.
    Address,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Username => f.write_str("username"),
            Self::Address => f.write_str("address"),
        }
    }
}

/// Errors reported by a ledger store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Account does not exist.
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// A delta would make a balance negative. Nothing was applied.
    #[error("account {account_id} cannot cover {requested} (balance {available})")]
    Overdraft {
        /// Account that would go negative.
        account_id: AccountId,
        /// Its balance.
        available: i64,
        /// Value that was requested.
        requested: i64,
    },

    /// A unique attribute is already in use.
    #[error("duplicate {field}: {value}")]
    Duplicate {
        /// Which attribute.
        field: UniqueField,
        /// Offending value.
        value: String,
    },

    /// Backend failure (connection, query, corrupt row).
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    /// Create a backend error.
    #[must_use]
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Durable storage for accounts and operation history.
///
/// Implementations must make `adjust_balances` and `post_operation` atomic:
/// either every delta (and the record) is applied, or none is. A delta that
/// would leave a balance below zero fails the whole call with
/// [`StoreError::Overdraft`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Creates an account with a zero balance.
    async fn insert_account(&self, account: NewAccount) -> StoreResult<Account>;

    /// Finds an account by id.
    async fn account_by_id(&self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Finds an account by address.
    async fn account_by_address(&self, address: &str) -> StoreResult<Option<Account>>;

    /// Finds an account by username.
    async fn account_by_username(&self, username: &str) -> StoreResult<Option<Account>>;

    /// Checks if a username is already registered.
    async fn username_exists(&self, username: &str) -> StoreResult<bool> {
        Ok(self.account_by_username(username).await?.is_some())
    }

    /// Applies all deltas atomically.
    async fn adjust_balances(&self, deltas: &[BalanceDelta]) -> StoreResult<()>;

    /// Applies all deltas and persists the operation in one atomic step.
    async fn post_operation(
        &self,
        deltas: &[BalanceDelta],
        operation: NewOperation,
    ) -> StoreResult<OperationRecord>;

    /// Operations belonging to an account, in id order.
    async fn operations_for_account(
        &self,
        account_id: AccountId,
    ) -> StoreResult<Vec<OperationRecord>>;

    /// Applied but not yet settled operations of one category, in id order.
    async fn pending_operations(&self, kind: OperationKind) -> StoreResult<Vec<OperationRecord>>;

    /// Marks the given pending operations as settled under the category's next
    /// batch number.
    ///
    /// Ids that are unknown, of another category or already settled are
    /// skipped. Returns `None` when nothing was left to settle, in which case
    /// no batch number is consumed.
    async fn settle_operations(
        &self,
        kind: OperationKind,
        ids: &[OperationId],
    ) -> StoreResult<Option<SettlementBatch>>;
}
