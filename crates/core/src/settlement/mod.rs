//! Settlement scheduling.
//!
//! - `hot_config` - runtime-mutable settlement periods
//! - `scheduler` - the four periodic settlement loops

pub mod hot_config;
pub mod scheduler;

pub use hot_config::{HotConfigSource, MemoryHotConfig, SettlementIntervals};
pub use scheduler::{SchedulerHandle, SettlementHooks, SettlementLoop, SettlementScheduler};
