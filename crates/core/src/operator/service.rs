//! Operator service.

use std::sync::Arc;

use async_trait::async_trait;
use plasma_shared::types::AccountId;
use tracing::{debug, info, warn};

use crate::auth::{PasswordError, ensure_password_present, hash_password, verify_password};
use crate::ledger::{
    Account, AccountHistory, AccountLedger, BalanceDelta, Deposit, LedgerError, LedgerResult,
    NewAccount, NewOperation, OffchainWithdrawal, OnchainWithdrawal, Operation, OperationKind,
    OperationRecord, SettlementBatch, Transfer,
};
use crate::settlement::SettlementHooks;

use super::onchain::OnchainSubmitter;

/// Validates submissions, applies them to the ledger and settles them in
/// batches.
pub struct Operator {
    ledger: Arc<AccountLedger>,
    submitter: Arc<dyn OnchainSubmitter>,
}

impl Operator {
    /// Creates an operator over a ledger and an onchain submitter.
    #[must_use]
    pub fn new(ledger: Arc<AccountLedger>, submitter: Arc<dyn OnchainSubmitter>) -> Self {
        Self { ledger, submitter }
    }

    /// The ledger this operator applies to.
    #[must_use]
    pub fn ledger(&self) -> &Arc<AccountLedger> {
        &self.ledger
    }

    /// Registers a new account with a zero balance.
    ///
    /// # Arguments
    /// * `username` - Login name, unique across accounts
    /// * `password` - Clear-text password, hashed before storage
    /// * `address` - External address, unique across accounts
    ///
    /// # Errors
    ///
    /// `EmptyPassword`, `UsernameTaken` or `AddressTaken`. A concurrent
    /// registration that wins the race is reported the same way, since the
    /// store enforces both unique attributes.
    pub async fn register_account(
        &self,
        username: &str,
        password: &str,
        address: &str,
    ) -> LedgerResult<Account> {
        ensure_password_present(password)?;

        let store = self.ledger.store();
        if store.username_exists(username).await? {
            return Err(LedgerError::UsernameTaken(username.to_string()));
        }
        if store.account_by_address(address).await?.is_some() {
            return Err(LedgerError::AddressTaken(address.to_string()));
        }

        let account = store
            .insert_account(NewAccount {
                address: address.to_string(),
                username: Some(username.to_string()),
                password_hash: Some(hash_password(password)?),
            })
            .await?;

        info!(account_id = %account.id, username, address, "Account registered");
        Ok(account)
    }

    /// Checks a username and password pair.
    ///
    /// Unknown usernames and accounts without a usable password hash simply
    /// fail to authenticate.
    ///
    /// # Errors
    ///
    /// `StorageFailure`, or `Internal` if verification itself breaks.
    pub async fn authenticate(&self, username: &str, password: &str) -> LedgerResult<bool> {
        let Some(account) = self.ledger.store().account_by_username(username).await? else {
            return Ok(false);
        };
        let Some(hash) = account.password_hash.as_deref() else {
            return Ok(false);
        };

        match verify_password(password, hash) {
            Ok(valid) => Ok(valid),
            Err(PasswordError::InvalidHash) => {
                warn!(account_id = %account.id, "Stored password hash is malformed");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Moves value between two accounts.
    ///
    /// The debit, the credit and the record are applied as one unit. The
    /// record belongs to the source account.
    ///
    /// # Errors
    ///
    /// `InvalidValue` unless the value is positive, `UnknownAccount` for either
    /// address, `InsufficientFunds` if the source cannot cover the value. On
    /// any error no balance changes and nothing is recorded.
    pub async fn submit_transfer(&self, transfer: Transfer) -> LedgerResult<OperationRecord> {
        ensure_positive(transfer.value)?;
        let from = self.ledger.lookup_by_address(&transfer.from_address).await?;
        let to = self.ledger.lookup_by_address(&transfer.to_address).await?;

        let deltas = [
            BalanceDelta::debit(from.id, transfer.value),
            BalanceDelta::credit(to.id, transfer.value),
        ];
        self.ledger
            .post(
                &deltas,
                NewOperation {
                    account_id: from.id,
                    operation: Operation::Transfer(transfer),
                },
            )
            .await
    }

    /// Debits `from_address` and records an offchain withdrawal pending
    /// settlement.
    ///
    /// # Errors
    ///
    /// `InvalidValue`, `UnknownAccount` or `InsufficientFunds`.
    pub async fn submit_offchain_withdrawal(
        &self,
        from_address: &str,
        withdrawal: OffchainWithdrawal,
    ) -> LedgerResult<OperationRecord> {
        ensure_positive(withdrawal.value)?;
        let from = self.ledger.lookup_by_address(from_address).await?;

        self.ledger
            .post(
                &[BalanceDelta::debit(from.id, withdrawal.value)],
                NewOperation {
                    account_id: from.id,
                    operation: Operation::OffchainWithdrawal(withdrawal),
                },
            )
            .await
    }

    /// Credits a deposit observed on chain.
    ///
    /// # Errors
    ///
    /// `InvalidValue` or `UnknownAccount`.
    pub async fn record_deposit(&self, deposit: Deposit) -> LedgerResult<OperationRecord> {
        ensure_positive(deposit.value)?;
        let account_id = deposit.account_id;

        self.ledger
            .post(
                &[BalanceDelta::credit(account_id, deposit.value)],
                NewOperation {
                    account_id,
                    operation: Operation::Deposit(deposit),
                },
            )
            .await
    }

    /// Debits an onchain withdrawal at submission; the payout itself happens
    /// when its batch is settled.
    ///
    /// # Errors
    ///
    /// `InvalidValue`, `UnknownAccount` or `InsufficientFunds`.
    pub async fn record_onchain_withdrawal(
        &self,
        withdrawal: OnchainWithdrawal,
    ) -> LedgerResult<OperationRecord> {
        ensure_positive(withdrawal.value)?;
        let account_id = withdrawal.account_id;

        self.ledger
            .post(
                &[BalanceDelta::debit(account_id, withdrawal.value)],
                NewOperation {
                    account_id,
                    operation: Operation::OnchainWithdrawal(withdrawal),
                },
            )
            .await
    }

    /// Looks up an account by address.
    ///
    /// # Errors
    ///
    /// `UnknownAccount` if no account has this address.
    pub async fn account(&self, address: &str) -> LedgerResult<Account> {
        self.ledger.lookup_by_address(address).await
    }

    /// Every operation recorded for an account, grouped by category.
    ///
    /// # Errors
    ///
    /// `UnknownAccount` or `StorageFailure`.
    pub async fn history(&self, account_id: AccountId) -> LedgerResult<AccountHistory> {
        self.ledger.lookup_by_id(account_id).await?;
        let records = self
            .ledger
            .store()
            .operations_for_account(account_id)
            .await?;
        Ok(AccountHistory::from_records(records))
    }

    /// Settles pending deposits.
    ///
    /// # Errors
    ///
    /// `StorageFailure`.
    pub async fn execute_deposits(&self) -> LedgerResult<Option<SettlementBatch>> {
        self.settle(OperationKind::Deposit).await
    }

    /// Settles pending transfers.
    ///
    /// # Errors
    ///
    /// `StorageFailure`.
    pub async fn execute_transfers(&self) -> LedgerResult<Option<SettlementBatch>> {
        self.settle(OperationKind::Transfer).await
    }

    /// Hands pending onchain withdrawals to the submitter, then settles them.
    ///
    /// # Errors
    ///
    /// Whatever the submitter reports, in which case nothing is settled, or
    /// `StorageFailure`.
    pub async fn execute_onchain_withdrawals(&self) -> LedgerResult<Option<SettlementBatch>> {
        self.settle(OperationKind::OnchainWithdrawal).await
    }

    /// Settles pending offchain withdrawals.
    ///
    /// # Errors
    ///
    /// `StorageFailure`.
    pub async fn execute_offchain_withdrawals(&self) -> LedgerResult<Option<SettlementBatch>> {
        self.settle(OperationKind::OffchainWithdrawal).await
    }

    async fn settle(&self, kind: OperationKind) -> LedgerResult<Option<SettlementBatch>> {
        let store = self.ledger.store();
        let pending = store.pending_operations(kind).await?;
        if pending.is_empty() {
            debug!(%kind, "Nothing to settle");
            return Ok(None);
        }

        if kind == OperationKind::OnchainWithdrawal {
            self.submitter.submit(&pending).await?;
        }

        let ids: Vec<_> = pending.iter().map(|r| r.id).collect();
        let batch = store.settle_operations(kind, &ids).await?;
        if let Some(batch) = &batch {
            info!(
                %kind,
                batch = %batch.number,
                operations = batch.len(),
                total_value = batch.total_value(),
                "Settlement batch sealed"
            );
        }
        Ok(batch)
    }
}

#[async_trait]
impl SettlementHooks for Operator {
    async fn execute(&self, kind: OperationKind) -> LedgerResult<Option<SettlementBatch>> {
        match kind {
            OperationKind::Deposit => self.execute_deposits().await,
            OperationKind::Transfer => self.execute_transfers().await,
            OperationKind::OnchainWithdrawal => self.execute_onchain_withdrawals().await,
            OperationKind::OffchainWithdrawal => self.execute_offchain_withdrawals().await,
        }
    }
}

fn ensure_positive(value: i64) -> LedgerResult<()> {
    if value <= 0 {
        return Err(LedgerError::InvalidValue(value));
    }
    Ok(())
}
