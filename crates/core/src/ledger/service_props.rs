//! Property-based tests for AccountLedger.
//!
//! - Conservation: posting transfers never changes the sum of balances
//! - Non-negativity: no sequence of debits drives a balance below zero
//! - Failure atomicity: a refused post leaves every balance untouched

use std::sync::Arc;

use proptest::prelude::*;

use super::account::{BalanceDelta, NewAccount};
use super::error::LedgerError;
use super::memory::MemoryLedgerStore;
use super::operation::{NewOperation, Operation, Transfer};
use super::service::AccountLedger;
use super::store::LedgerStore;
use plasma_shared::types::AccountId;

const ACCOUNTS: usize = 3;

/// Strategy to generate initial balances (0 to 1,000).
fn initial_balances() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..1_000, ACCOUNTS)
}

/// Strategy to generate a transfer between two of the test accounts.
fn transfer_step() -> impl Strategy<Value = (usize, usize, i64)> {
    (0..ACCOUNTS, 0..ACCOUNTS, 1i64..600)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn setup(balances: &[i64]) -> (Arc<MemoryLedgerStore>, AccountLedger, Vec<AccountId>) {
    let store = Arc::new(MemoryLedgerStore::new());
    let ledger = AccountLedger::new(store.clone());
    let mut ids = Vec::new();
    for (i, balance) in balances.iter().enumerate() {
        let account = store
            .insert_account(NewAccount::with_address(format!("0x{i}")))
            .await
            .unwrap();
        ledger.credit(account.id, *balance).await.unwrap();
        ids.push(account.id);
    }
    (store, ledger, ids)
}

fn transfer(from: AccountId, value: i64) -> NewOperation {
    NewOperation {
        account_id: from,
        operation: Operation::Transfer(Transfer {
            from_address: String::new(),
            to_address: String::new(),
            value,
            nonce: 0,
            signature: String::new(),
        }),
    }
}

async fn balances(ledger: &AccountLedger, ids: &[AccountId]) -> Vec<i64> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        out.push(ledger.lookup_by_id(*id).await.unwrap().balance);
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// *For any* sequence of transfers, the total stays constant and every
    /// balance stays non-negative.
    #[test]
    fn prop_transfers_conserve_total(
        initial in initial_balances(),
        steps in prop::collection::vec(transfer_step(), 1..40),
    ) {
        runtime().block_on(async {
            let (store, ledger, ids) = setup(&initial).await;
            let total: i64 = initial.iter().sum();

            for (from, to, value) in steps {
                let deltas = [
                    BalanceDelta::debit(ids[from], value),
                    BalanceDelta::credit(ids[to], value),
                ];
                let before = balances(&ledger, &ids).await;
                match ledger.post(&deltas, transfer(ids[from], value)).await {
                    Ok(_) => {}
                    Err(LedgerError::InsufficientFunds { .. }) => {
                        prop_assert_eq!(balances(&ledger, &ids).await, before);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {other}"),
                }
                prop_assert_eq!(store.total_balance().await, total);
                for balance in balances(&ledger, &ids).await {
                    prop_assert!(balance >= 0);
                }
            }
            Ok(())
        })?;
    }

    /// *For any* debit, success implies the balance covered it exactly.
    #[test]
    fn prop_debit_never_overdraws(
        balance in 0i64..1_000,
        value in 0i64..2_000,
    ) {
        runtime().block_on(async {
            let (_, ledger, ids) = setup(&[balance]).await;
            match ledger.debit(ids[0], value).await {
                Ok(after) => {
                    prop_assert!(value <= balance);
                    prop_assert_eq!(after, balance - value);
                }
                Err(LedgerError::InsufficientFunds { available, requested, .. }) => {
                    prop_assert!(value > balance);
                    prop_assert_eq!(available, balance);
                    prop_assert_eq!(requested, value);
                }
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
            Ok(())
        })?;
    }
}
