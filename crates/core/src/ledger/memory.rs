//! In-memory ledger store.
//!
//! Every call takes the store-wide lock once, which makes each call atomic.
//! Used by tests and by the server when no database is configured.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use plasma_shared::types::{AccountId, BatchNumber, OperationId};
use tokio::sync::RwLock;

use super::account::{Account, BalanceDelta, NewAccount};
use super::operation::{NewOperation, OperationKind, OperationRecord, SettlementBatch};
use super::store::{LedgerStore, StoreError, StoreResult, UniqueField};

/// Ledger store kept entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    addresses: HashMap<String, AccountId>,
    usernames: HashMap<String, AccountId>,
    operations: BTreeMap<OperationId, OperationRecord>,
    last_batch: HashMap<OperationKind, BatchNumber>,
}

impl MemoryState {
    /// Validates every delta against a scratch copy, then commits.
    fn apply(&mut self, deltas: &[BalanceDelta]) -> StoreResult<()> {
        let mut scratch: BTreeMap<AccountId, i64> = BTreeMap::new();

        for d in deltas {
            let current = match scratch.get(&d.account_id) {
                Some(balance) => *balance,
                None => {
                    self.accounts
                        .get(&d.account_id)
                        .ok_or(StoreError::AccountNotFound(d.account_id))?
                        .balance
                }
            };
            let next = current
                .checked_add(d.delta)
                .ok_or_else(|| StoreError::backend("balance overflow"))?;
            if next < 0 {
                return Err(StoreError::Overdraft {
                    account_id: d.account_id,
                    available: current,
                    requested: -d.delta,
                });
            }
            scratch.insert(d.account_id, next);
        }

        for (id, balance) in scratch {
            if let Some(account) = self.accounts.get_mut(&id) {
                account.balance = balance;
            }
        }
        Ok(())
    }

    fn next_operation_id(&self) -> OperationId {
        self.operations
            .last_key_value()
            .map_or(OperationId::new(1), |(id, _)| OperationId::new(id.0 + 1))
    }
}

impl MemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all balances.
    pub async fn total_balance(&self) -> i64 {
        self.state.read().await.accounts.values().map(|a| a.balance).sum()
    }

    /// Number of accounts.
    pub async fn account_count(&self) -> usize {
        self.state.read().await.accounts.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert_account(&self, account: NewAccount) -> StoreResult<Account> {
        let mut state = self.state.write().await;

        if let Some(username) = &account.username {
            if state.usernames.contains_key(username) {
                return Err(StoreError::Duplicate {
                    field: UniqueField::Username,
                    value: username.clone(),
                });
            }
        }
        if state.addresses.contains_key(&account.address) {
            return Err(StoreError::Duplicate {
                field: UniqueField::Address,
                value: account.address,
            });
        }

        let id = state
            .accounts
            .last_key_value()
            .map_or(AccountId::new(1), |(id, _)| AccountId::new(id.0 + 1));
        let created = Account {
            id,
            address: account.address,
            username: account.username,
            password_hash: account.password_hash,
            balance: 0,
            created_at: Utc::now(),
        };

        state.addresses.insert(created.address.clone(), id);
        if let Some(username) = &created.username {
            state.usernames.insert(username.clone(), id);
        }
        state.accounts.insert(id, created.clone());
        Ok(created)
    }

    async fn account_by_id(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn account_by_address(&self, address: &str) -> StoreResult<Option<Account>> {
        let state = self.state.read().await;
        Ok(state
            .addresses
            .get(address)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn account_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        let state = self.state.read().await;
        Ok(state
            .usernames
            .get(username)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn adjust_balances(&self, deltas: &[BalanceDelta]) -> StoreResult<()> {
        self.state.write().await.apply(deltas)
    }

    async fn post_operation(
        &self,
        deltas: &[BalanceDelta],
        operation: NewOperation,
    ) -> StoreResult<OperationRecord> {
        let mut state = self.state.write().await;

        if !state.accounts.contains_key(&operation.account_id) {
            return Err(StoreError::AccountNotFound(operation.account_id));
        }
        state.apply(deltas)?;

        let record = OperationRecord {
            id: state.next_operation_id(),
            account_id: operation.account_id,
            operation: operation.operation,
            batch: None,
            created_at: Utc::now(),
            settled_at: None,
        };
        state.operations.insert(record.id, record.clone());
        Ok(record)
    }

    async fn operations_for_account(
        &self,
        account_id: AccountId,
    ) -> StoreResult<Vec<OperationRecord>> {
        Ok(self
            .state
            .read()
            .await
            .operations
            .values()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn pending_operations(&self, kind: OperationKind) -> StoreResult<Vec<OperationRecord>> {
        Ok(self
            .state
            .read()
            .await
            .operations
            .values()
            .filter(|r| r.kind() == kind && !r.is_settled())
            .cloned()
            .collect())
    }

    async fn settle_operations(
        &self,
        kind: OperationKind,
        ids: &[OperationId],
    ) -> StoreResult<Option<SettlementBatch>> {
        let mut state = self.state.write().await;

        let mut settleable: Vec<OperationId> = ids
            .iter()
            .copied()
            .filter(|id| {
                state
                    .operations
                    .get(id)
                    .is_some_and(|r| r.kind() == kind && !r.is_settled())
            })
            .collect();
        settleable.sort_unstable();
        settleable.dedup();

        if settleable.is_empty() {
            return Ok(None);
        }

        let number = state
            .last_batch
            .get(&kind)
            .map_or(BatchNumber::FIRST, |last| last.next());
        state.last_batch.insert(kind, number);

        let settled_at = Utc::now();
        let mut operations = Vec::with_capacity(settleable.len());
        for id in settleable {
            if let Some(record) = state.operations.get_mut(&id) {
                record.batch = Some(number);
                record.settled_at = Some(settled_at);
                operations.push(record.clone());
            }
        }

        Ok(Some(SettlementBatch {
            kind,
            number,
            operations,
            settled_at,
        }))
    }
}
