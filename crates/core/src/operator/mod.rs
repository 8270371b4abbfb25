//! The operator: the single entry point for everything that changes the ledger.
//!
//! Request-side calls validate, then apply through [`AccountLedger`]; the
//! batch hooks are only driven by the settlement scheduler.
//!
//! [`AccountLedger`]: crate::ledger::AccountLedger

mod onchain;
mod service;

pub use onchain::{LoggingSubmitter, OnchainSubmitter};
pub use service::Operator;
