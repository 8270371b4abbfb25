//! Operations recorded by the ledger and their settlement state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use plasma_shared::types::{AccountId, BatchNumber, OperationId};
use serde::{Deserialize, Serialize};

/// The four settlement categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Value entering the ledger from the chain.
    Deposit,
    /// Value moving between two ledger accounts.
    Transfer,
    /// Value leaving the ledger through an on-chain payout.
    OnchainWithdrawal,
    /// Value leaving the ledger, settled without chain interaction.
    OffchainWithdrawal,
}

impl OperationKind {
    /// All categories, in scheduler start order.
    pub const ALL: [Self; 4] = [
        Self::Deposit,
        Self::Transfer,
        Self::OnchainWithdrawal,
        Self::OffchainWithdrawal,
    ];

    /// Stable storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Transfer => "transfer",
            Self::OnchainWithdrawal => "onchain_withdrawal",
            Self::OffchainWithdrawal => "offchain_withdrawal",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown operation kind '{s}'"))
    }
}

/// Value entering the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Credited account.
    pub account_id: AccountId,
    /// Deposited value.
    pub value: i64,
}

/// Intra-ledger value movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Source address.
    pub from_address: String,
    /// Destination address.
    pub to_address: String,
    /// Transferred value.
    pub value: i64,
    /// Client nonce.
    pub nonce: i64,
    /// Opaque signature, not verified by the operator.
    pub signature: String,
}

/// Withdrawal paid out by an on-chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnchainWithdrawal {
    /// Debited account.
    pub account_id: AccountId,
    /// Withdrawn value.
    pub value: i64,
    /// Destination address on chain.
    pub address: String,
}

/// Withdrawal debited immediately and settled off chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffchainWithdrawal {
    /// Withdrawn value.
    pub value: i64,
    /// Destination address.
    pub address: String,
    /// Client nonce.
    pub nonce: i64,
    /// Opaque signature, not verified by the operator.
    pub signature: String,
}

/// Payload of a recorded operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// See [`Deposit`].
    Deposit(Deposit),
    /// See [`Transfer`].
    Transfer(Transfer),
    /// See [`OnchainWithdrawal`].
    OnchainWithdrawal(OnchainWithdrawal),
    /// See [`OffchainWithdrawal`].
    OffchainWithdrawal(OffchainWithdrawal),
}

impl Operation {
    /// Settlement category of this operation.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Deposit(_) => OperationKind::Deposit,
            Self::Transfer(_) => OperationKind::Transfer,
            Self::OnchainWithdrawal(_) => OperationKind::OnchainWithdrawal,
            Self::OffchainWithdrawal(_) => OperationKind::OffchainWithdrawal,
        }
    }

    /// Value moved by this operation.
    #[must_use]
    pub const fn value(&self) -> i64 {
        match self {
            Self::Deposit(d) => d.value,
            Self::Transfer(t) => t.value,
            Self::OnchainWithdrawal(w) => w.value,
            Self::OffchainWithdrawal(w) => w.value,
        }
    }
}

/// An operation ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperation {
    /// Account the operation belongs to (the source for transfers).
    pub account_id: AccountId,
    /// Payload.
    pub operation: Operation,
}

/// A persisted operation.
///
/// `batch` is `None` while the operation is applied but not yet settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Record identity.
    pub id: OperationId,
    /// Owning account.
    pub account_id: AccountId,
    /// Payload.
    pub operation: Operation,
    /// Settlement batch, once settled.
    pub batch: Option<BatchNumber>,
    /// When the operation was applied.
    pub created_at: DateTime<Utc>,
    /// When the operation was settled.
    pub settled_at: Option<DateTime<Utc>>,
}

impl OperationRecord {
    /// Settlement category of this record.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    /// Whether this record has been included in a batch.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.batch.is_some()
    }
}

/// A group of operations of one category settled together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementBatch {
    /// Category.
    pub kind: OperationKind,
    /// Batch number within the category.
    pub number: BatchNumber,
    /// Operations included, in id order.
    pub operations: Vec<OperationRecord>,
    /// When the batch was sealed.
    pub settled_at: DateTime<Utc>,
}

impl SettlementBatch {
    /// Number of operations in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Sum of the values of all operations in the batch.
    #[must_use]
    pub fn total_value(&self) -> i64 {
        self.operations.iter().map(|r| r.operation.value()).sum()
    }
}

/// Every recorded operation of one account, grouped by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountHistory {
    /// Deposits credited to the account.
    pub deposits: Vec<OperationRecord>,
    /// Transfers sent from the account.
    pub transfers: Vec<OperationRecord>,
    /// Onchain withdrawals.
    pub onchain_withdrawals: Vec<OperationRecord>,
    /// Offchain withdrawals.
    pub offchain_withdrawals: Vec<OperationRecord>,
}

impl AccountHistory {
    /// Groups records by category, keeping their order.
    #[must_use]
    pub fn from_records(records: Vec<OperationRecord>) -> Self {
        let mut history = Self::default();
        for record in records {
            match record.kind() {
                OperationKind::Deposit => history.deposits.push(record),
                OperationKind::Transfer => history.transfers.push(record),
                OperationKind::OnchainWithdrawal => history.onchain_withdrawals.push(record),
                OperationKind::OffchainWithdrawal => history.offchain_withdrawals.push(record),
            }
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_storage_name() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
        assert!("withdrawal".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_operation_serializes_with_kind_tag() {
        let op = Operation::Deposit(Deposit {
            account_id: AccountId::new(1),
            value: 100,
        });
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["kind"], "deposit");
        assert_eq!(json["value"], 100);
    }

    #[test]
    fn test_history_groups_by_kind() {
        let record = |id: i64, operation: Operation| OperationRecord {
            id: OperationId::new(id),
            account_id: AccountId::new(1),
            operation,
            batch: None,
            created_at: Utc::now(),
            settled_at: None,
        };
        let history = AccountHistory::from_records(vec![
            record(
                1,
                Operation::Deposit(Deposit {
                    account_id: AccountId::new(1),
                    value: 10,
                }),
            ),
            record(
                2,
                Operation::OffchainWithdrawal(OffchainWithdrawal {
                    value: 4,
                    address: "0xdead".into(),
                    nonce: 0,
                    signature: "0x0".into(),
                }),
            ),
        ]);
        assert_eq!(history.deposits.len(), 1);
        assert_eq!(history.offchain_withdrawals.len(), 1);
        assert!(history.transfers.is_empty());
    }
}
