//! Account ledger: balance invariants over a [`LedgerStore`].
//!
//! Every mutation takes the async mutex of each account it touches, in
//! ascending [`AccountId`] order, for the whole read-check-write. Two calls
//! touching the same account are therefore totally ordered, and two calls
//! touching the same pair of accounts cannot deadlock. The store then applies
//! the full delta set in one atomic step.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use plasma_shared::types::AccountId;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::account::{Account, BalanceDelta};
use super::error::{LedgerError, LedgerResult};
use super::operation::{NewOperation, OperationRecord};
use super::store::LedgerStore;

/// Authoritative balances with atomic debit and credit.
pub struct AccountLedger {
    store: Arc<dyn LedgerStore>,
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl AccountLedger {
    /// Creates a ledger over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Looks up an account by id.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAccount` if no account has this id.
    pub async fn lookup_by_id(&self, id: AccountId) -> LedgerResult<Account> {
        self.store
            .account_by_id(id)
            .await?
            .ok_or_else(|| LedgerError::unknown_id(id))
    }

    /// Looks up an account by address.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAccount` if no account has this address.
    pub async fn lookup_by_address(&self, address: &str) -> LedgerResult<Account> {
        self.store
            .account_by_address(address)
            .await?
            .ok_or_else(|| LedgerError::unknown_address(address))
    }

    /// Decreases a balance by `value`. Returns the new balance.
    ///
    /// # Errors
    ///
    /// `InvalidValue` for a negative value, `UnknownAccount`, or
    /// `InsufficientFunds` if the balance is below `value`.
    pub async fn debit(&self, id: AccountId, value: i64) -> LedgerResult<i64> {
        ensure_non_negative(value)?;
        let deltas = [BalanceDelta::debit(id, value)];
        let _guards = self.lock_accounts(&deltas).await;

        let balances = self.check(&deltas).await?;
        self.store.adjust_balances(&deltas).await?;
        Ok(balances[0])
    }

    /// Increases a balance by `value`. Returns the new balance.
    ///
    /// # Errors
    ///
    /// `InvalidValue` for a negative value or `UnknownAccount`.
    pub async fn credit(&self, id: AccountId, value: i64) -> LedgerResult<i64> {
        ensure_non_negative(value)?;
        let deltas = [BalanceDelta::credit(id, value)];
        let _guards = self.lock_accounts(&deltas).await;

        let balances = self.check(&deltas).await?;
        self.store.adjust_balances(&deltas).await?;
        Ok(balances[0])
    }

    /// Applies `deltas` and persists `operation` as a single unit.
    ///
    /// Deltas are checked in the given order against running balances, so a
    /// transfer listed as `[debit(from), credit(to)]` is refused when `from`
    /// cannot cover it even if `from == to`.
    ///
    /// # Errors
    ///
    /// `UnknownAccount` or `InsufficientFunds`, in which case nothing is
    /// applied or recorded; `StorageFailure` from the store.
    pub async fn post(
        &self,
        deltas: &[BalanceDelta],
        operation: NewOperation,
    ) -> LedgerResult<OperationRecord> {
        let _guards = self.lock_accounts(deltas).await;

        self.check(deltas).await?;
        let record = self.store.post_operation(deltas, operation).await?;
        debug!(
            operation_id = %record.id,
            kind = %record.kind(),
            account_id = %record.account_id,
            "Operation applied"
        );
        Ok(record)
    }

    /// Running balances after each delta, failing on the first one that
    /// would go negative. Must be called with the accounts locked.
    async fn check(&self, deltas: &[BalanceDelta]) -> LedgerResult<Vec<i64>> {
        let mut running: Vec<(AccountId, i64)> = Vec::with_capacity(deltas.len());
        let mut after = Vec::with_capacity(deltas.len());

        for d in deltas {
            let current = match running.iter().find(|(id, _)| *id == d.account_id) {
                Some((_, balance)) => *balance,
                None => self.lookup_by_id(d.account_id).await?.balance,
            };
            let next = current
                .checked_add(d.delta)
                .ok_or_else(|| LedgerError::InvalidValue(d.delta))?;
            if next < 0 {
                return Err(LedgerError::InsufficientFunds {
                    account_id: d.account_id,
                    available: current,
                    requested: -d.delta,
                });
            }
            match running.iter_mut().find(|(id, _)| *id == d.account_id) {
                Some(entry) => entry.1 = next,
                None => running.push((d.account_id, next)),
            }
            after.push(next);
        }
        Ok(after)
    }

    /// Locks every account named in `deltas`, lowest id first.
    async fn lock_accounts(&self, deltas: &[BalanceDelta]) -> Vec<OwnedMutexGuard<()>> {
        let ids: BTreeSet<AccountId> = deltas.iter().map(|d| d.account_id).collect();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            let lock = self.locks.entry(id).or_default().clone();
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}

fn ensure_non_negative(value: i64) -> LedgerResult<()> {
    if value < 0 {
        return Err(LedgerError::InvalidValue(value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::account::NewAccount;
    use crate::ledger::memory::MemoryLedgerStore;
    use crate::ledger::operation::{Operation, Transfer};

    async fn ledger_with(balances: &[(&str, i64)]) -> (AccountLedger, Vec<AccountId>) {
        let store = Arc::new(MemoryLedgerStore::new());
        let ledger = AccountLedger::new(store.clone());
        let mut ids = Vec::new();
        for (address, balance) in balances {
            let account = store
                .insert_account(NewAccount::with_address(*address))
                .await
                .unwrap();
            ledger.credit(account.id, *balance).await.unwrap();
            ids.push(account.id);
        }
        (ledger, ids)
    }

    fn transfer_op(from: AccountId, value: i64) -> NewOperation {
        NewOperation {
            account_id: from,
            operation: Operation::Transfer(Transfer {
                from_address: "0xA".into(),
                to_address: "0xB".into(),
                value,
                nonce: 0,
                signature: "0x0".into(),
            }),
        }
    }

    #[tokio::test]
    async fn test_debit_and_credit() {
        let (ledger, ids) = ledger_with(&[("0xA", 100)]).await;
        assert_eq!(ledger.debit(ids[0], 30).await.unwrap(), 70);
        assert_eq!(ledger.credit(ids[0], 5).await.unwrap(), 75);
        assert_eq!(ledger.lookup_by_address("0xA").await.unwrap().balance, 75);
    }

    #[tokio::test]
    async fn test_debit_beyond_balance_fails() {
        let (ledger, ids) = ledger_with(&[("0xA", 10)]).await;
        let err = ledger.debit(ids[0], 11).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds {
                available: 10,
                requested: 11,
                ..
            }
        ));
        assert_eq!(ledger.lookup_by_id(ids[0]).await.unwrap().balance, 10);
    }

    #[tokio::test]
    async fn test_negative_values_rejected() {
        let (ledger, ids) = ledger_with(&[("0xA", 10)]).await;
        assert!(matches!(
            ledger.debit(ids[0], -1).await,
            Err(LedgerError::InvalidValue(-1))
        ));
        assert!(matches!(
            ledger.credit(ids[0], -1).await,
            Err(LedgerError::InvalidValue(-1))
        ));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let (ledger, _) = ledger_with(&[]).await;
        assert!(matches!(
            ledger.credit(AccountId::new(7), 1).await,
            Err(LedgerError::UnknownAccount(_))
        ));
        assert!(matches!(
            ledger.lookup_by_address("0xnope").await,
            Err(LedgerError::UnknownAccount(_))
        ));
    }

    #[tokio::test]
    async fn test_post_moves_value_between_accounts() {
        let (ledger, ids) = ledger_with(&[("0xA", 100), ("0xB", 0)]).await;
        let deltas = [BalanceDelta::debit(ids[0], 40), BalanceDelta::credit(ids[1], 40)];

        let record = ledger.post(&deltas, transfer_op(ids[0], 40)).await.unwrap();

        assert_eq!(record.account_id, ids[0]);
        assert!(!record.is_settled());
        assert_eq!(ledger.lookup_by_id(ids[0]).await.unwrap().balance, 60);
        assert_eq!(ledger.lookup_by_id(ids[1]).await.unwrap().balance, 40);
    }

    #[tokio::test]
    async fn test_self_transfer_still_needs_cover() {
        let (ledger, ids) = ledger_with(&[("0xA", 10)]).await;
        let deltas = [BalanceDelta::debit(ids[0], 20), BalanceDelta::credit(ids[0], 20)];

        let err = ledger.post(&deltas, transfer_op(ids[0], 20)).await.unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert!(ledger
            .store()
            .operations_for_account(ids[0])
            .await
            .unwrap()
            .is_empty());
    }
}
