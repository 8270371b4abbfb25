//! Repository abstractions for data access.
//!
//! Repositories implement the core's capability traits on top of `SeaORM`,
//! hiding the database from the rest of the application.

pub mod hot_config;
pub mod ledger;

pub use hot_config::HotConfigRepository;
pub use ledger::PgLedgerStore;
