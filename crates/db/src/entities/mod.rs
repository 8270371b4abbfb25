//! `SeaORM` entities.

pub mod accounts;
pub mod hot_config;
pub mod ledger_operations;
