//! Account credentials.
//!
//! This module provides:
//! - Password hashing with Argon2id
//! - Password verification
//! - The blank-password rule applied at registration

mod password;

pub use password::{PasswordError, hash_password, verify_password};

use crate::ledger::LedgerError;

/// Rejects passwords that are empty after trimming whitespace.
///
/// # Errors
///
/// Returns `LedgerError::EmptyPassword` for a blank password.
pub fn ensure_password_present(password: &str) -> Result<(), LedgerError> {
    if password.trim().is_empty() {
        return Err(LedgerError::EmptyPassword);
    }
    Ok(())
}

impl From<PasswordError> for LedgerError {
    fn from(err: PasswordError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_passwords_rejected() {
        for blank in ["", " ", "\t\n  "] {
            assert!(matches!(
                ensure_password_present(blank),
                Err(LedgerError::EmptyPassword)
            ));
        }
        assert!(ensure_password_present(" pw ").is_ok());
    }
}
