//! Core logic for the Plasma operator.
//!
//! This crate contains the ledger, the operator and settlement scheduling with
//! ZERO web or database dependencies. Persistence is reached through the
//! [`ledger::LedgerStore`] capability.
//!
//! # Modules
//!
//! - `ledger` - Accounts, balances and operation records
//! - `auth` - Password hashing for registered accounts
//! - `operator` - Validation, submission and batch settlement
//! - `settlement` - Hot configuration and the periodic settlement loops
//! - `context` - Explicit wiring of the shared services

pub mod auth;
pub mod context;
pub mod ledger;
pub mod operator;
pub mod settlement;

pub use context::PlasmaContext;
