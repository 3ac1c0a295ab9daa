// src/core/bulk/mod.rs

//! Bulk Import/Export Pipeline and Operation Tiers.

pub mod dialect;
pub mod inserter;
pub mod sqlite_tuning;
pub mod tiers;
pub mod values;

pub use dialect::calculate_optimal_batch_size;
pub use inserter::{bulk_insert_api_keys, bulk_insert_api_keys_with_tx, bulk_insert_generic, NewApiKey};
pub use tiers::{ExecutionMode, OperationTier};
