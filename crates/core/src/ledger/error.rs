//! Ledger error types for validation, store and configuration failures.
//!
//! Validation errors are returned to the submitting caller and never leave a
//! trace in the ledger. Storage and configuration errors are surfaced as-is;
//! the core does not retry them.

use plasma_shared::types::AccountId;
use thiserror::Error;

use super::store::{StoreError, UniqueField};

/// Result type alias using `LedgerError`.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur during ledger and operator operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Registration Errors ==========
    /// Password is empty after trimming whitespace.
    #[error("The password can't be empty")]
    EmptyPassword,

    /// Username is already registered.
    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),

    /// Address already belongs to another account.
    #[error("Address '{0}' is already registered")]
    AddressTaken(String),

    // ========== Account Errors ==========
    /// No account matches the given id or address.
    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    /// Balance does not cover the requested debit.
    #[error("Insufficient funds on account {account_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// The account that would be overdrawn.
        account_id: AccountId,
        /// Balance at the time of the check.
        available: i64,
        /// Value that was requested.
        requested: i64,
    },

    /// Operation value is outside the accepted range.
    #[error("Invalid value: {0}")]
    InvalidValue(i64),

    // ========== Infrastructure Errors ==========
    /// The ledger store failed.
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Hot configuration could not be read.
    #[error("Configuration unavailable: {0}")]
    ConfigUnavailable(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Builds an `UnknownAccount` error for an account id.
    #[must_use]
    pub fn unknown_id(id: AccountId) -> Self {
        Self::UnknownAccount(format!("#{id}"))
    }

    /// Builds an `UnknownAccount` error for an address.
    #[must_use]
    pub fn unknown_address(address: &str) -> Self {
        Self::UnknownAccount(address.to_string())
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyPassword => "EMPTY_PASSWORD",
            Self::UsernameTaken(_) => "USERNAME_TAKEN",
            Self::AddressTaken(_) => "ADDRESS_TAKEN",
            Self::UnknownAccount(_) => "UNKNOWN_ACCOUNT",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::InvalidValue(_) => "INVALID_VALUE",
            Self::StorageFailure(_) => "STORAGE_FAILURE",
            Self::ConfigUnavailable(_) => "CONFIG_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - validation errors
            Self::EmptyPassword | Self::InvalidValue(_) => 400,

            // 404 Not Found
            Self::UnknownAccount(_) => 404,

            // 409 Conflict - uniqueness violations
            Self::UsernameTaken(_) | Self::AddressTaken(_) => 409,

            // 422 Unprocessable - business rule
            Self::InsufficientFunds { .. } => 422,

            // 500 Internal Server Error
            Self::StorageFailure(_) | Self::Internal(_) => 500,

            // 503 Service Unavailable
            Self::ConfigUnavailable(_) => 503,
        }
    }

    /// Returns true for errors raised by validation, before anything was applied.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyPassword
                | Self::UsernameTaken(_)
                | Self::AddressTaken(_)
                | Self::UnknownAccount(_)
                | Self::InsufficientFunds { .. }
                | Self::InvalidValue(_)
        )
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => Self::unknown_id(id),
            StoreError::Overdraft {
                account_id,
                available,
                requested,
            } => Self::InsufficientFunds {
                account_id,
                available,
                requested,
            },
            StoreError::Duplicate {
                field: UniqueField::Username,
                value,
            } => Self::UsernameTaken(value),
            StoreError::Duplicate {
                field: UniqueField::Address,
                value,
            } => Self::AddressTaken(value),
            StoreError::Backend(msg) => Self::StorageFailure(msg),
        }
    }
}
