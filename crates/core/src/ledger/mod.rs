//! Account ledger.
//!
//! This module implements the balance-keeping core:
//! - Accounts, balance deltas and operation records
//! - The `LedgerStore` capability and its in-memory implementation
//! - `AccountLedger`, which serializes mutations per account
//! - Error types for ledger operations

pub mod account;
pub mod error;
pub mod memory;
pub mod operation;
pub mod service;
pub mod store;

#[cfg(test)]
mod service_props;

pub use account::{Account, BalanceDelta, NewAccount};
pub use error::{LedgerError, LedgerResult};
pub use memory::MemoryLedgerStore;
pub use operation::{
    AccountHistory, Deposit, NewOperation, OffchainWithdrawal, OnchainWithdrawal, Operation,
    OperationKind, OperationRecord, SettlementBatch, Transfer,
};
pub use service::AccountLedger;
pub use store::{LedgerStore, StoreError, StoreResult, UniqueField};
