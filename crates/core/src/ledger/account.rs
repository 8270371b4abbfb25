//! Ledger accounts.

use chrono::{DateTime, Utc};
use plasma_shared::types::AccountId;
use serde::{Deserialize, Serialize};

/// An account held by the operator.
///
/// Balances only change through [`super::AccountLedger`]; an account is never
/// deleted once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Identity assigned by the store.
    pub id: AccountId,
    /// External (on-chain) address, unique across accounts.
    pub address: String,
    /// Login name, unique when present.
    pub username: Option<String>,
    /// Argon2id PHC string of the password.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// Current balance, never negative.
    pub balance: i64,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

/// Input for creating an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    /// External address.
    pub address: String,
    /// Login name.
    pub username: Option<String>,
    /// Password hash.
    pub password_hash: Option<String>,
}

impl NewAccount {
    /// An account without login credentials.
    #[must_use]
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            username: None,
            password_hash: None,
        }
    }
}

/// A signed change to one account's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDelta {
    /// Account to adjust.
    pub account_id: AccountId,
    /// Signed amount added to the balance.
    pub delta: i64,
}

impl BalanceDelta {
    /// Increase `account_id` by `value`.
    #[must_use]
    pub const fn credit(account_id: AccountId, value: i64) -> Self {
        Self {
            account_id,
            delta: value,
        }
    }

    /// Decrease `account_id` by `value`.
    #[must_use]
    pub const fn debit(account_id: AccountId, value: i64) -> Self {
        Self {
            account_id,
            delta: -value,
        }
    }
}
