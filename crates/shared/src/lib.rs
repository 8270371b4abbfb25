//! Shared configuration and typed identifiers for the Plasma operator.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for accounts, operations and settlement batches
//! - Configuration management

pub mod config;
pub mod types;

pub use config::{AppConfig, DatabaseConfig, SettlementConfig};
