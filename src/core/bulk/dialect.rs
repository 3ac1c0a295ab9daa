// src/core/bulk/dialect.rs

//! Per-dialect batch-size caps and the pure `CalculateOptimalBatchSize`
//! function.

use super::tiers::OperationTier;
use crate::config::Dialect;

/// The cap that applies for a given dialect/tier combination: a default cap
/// for sync tiers, and a larger tiered cap for the two async tiers — sqlite
/// distinguishes the two, mysql and postgres do not.
fn cap_for(dialect: Dialect, tier: OperationTier) -> u32 {
    match (dialect, tier) {
        (Dialect::Sqlite, OperationTier::Async) => 5_000,
        (Dialect::Sqlite, OperationTier::MassiveAsync) => 10_000,
        (Dialect::Sqlite, _) => 50,
        (Dialect::MySql, _) | (Dialect::Postgres, _) => 10_000,
    }
}

/// Postgres additionally hard-caps on bound placeholders (65535 per
/// statement); sqlite has no placeholder ceiling this low but is
/// effectively bounded by the ~1 MB statement-size constraint baked into
/// its `default_cap`.
const POSTGRES_MAX_PLACEHOLDERS: u32 = 65_535;

/// Computes the batch size (row count per statement) for a bulk insert of
/// `total_records` rows of `num_fields` columns averaging `avg_field_size`
/// bytes each. The base size is scaled by the record's estimated byte size,
/// then by the operation tier's multiplier, then capped by the dialect's
/// tiered ceiling and (for postgres) the placeholder limit.
pub fn calculate_optimal_batch_size(
    dialect: Dialect,
    avg_field_size: usize,
    num_fields: usize,
    total_records: usize,
) -> u32 {
    if total_records == 0 || num_fields == 0 {
        return 1;
    }

    let record_size = (avg_field_size.max(1) * num_fields) as u64;
    // Target roughly 1 MiB of estimated payload per batch before tiering or
    // dialect caps are applied.
    const TARGET_BATCH_BYTES: u64 = 1024 * 1024;
    let byte_budget_rows = (TARGET_BATCH_BYTES / record_size).max(1) as u32;

    let tier = OperationTier::for_count(total_records);
    let scaled = byte_budget_rows.saturating_mul(tier.batch_multiplier());
    let cap = cap_for(dialect, tier);

    let mut batch = scaled.min(cap).max(1);
    if dialect == Dialect::Postgres {
        let max_rows_by_placeholders = (POSTGRES_MAX_PLACEHOLDERS / num_fields as u32).max(1);
        batch = batch.min(max_rows_by_placeholders);
    }
    batch.min(total_records as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sqlite_never_exceeds_its_tiered_cap() {
        let batch = calculate_optimal_batch_size(Dialect::Sqlite, 64, 4, 500_000);
        assert!(batch <= 10_000);
    }

    #[test]
    fn postgres_never_exceeds_placeholder_limit() {
        let batch = calculate_optimal_batch_size(Dialect::Postgres, 8, 20, 1_000_000);
        assert!(batch as usize * 20 <= 65_535);
    }

    #[test]
    fn batch_size_never_exceeds_total_records() {
        assert_eq!(calculate_optimal_batch_size(Dialect::Sqlite, 16, 4, 10), 10);
    }

    proptest! {
        #[test]
        fn batch_size_is_always_at_least_one_and_bounded(
            avg_field_size in 1usize..4096,
            num_fields in 1usize..64,
            total_records in 1usize..200_000,
            dialect_idx in 0u8..3,
        ) {
            let dialect = match dialect_idx {
                0 => Dialect::Sqlite,
                1 => Dialect::MySql,
                _ => Dialect::Postgres,
            };
            let batch = calculate_optimal_batch_size(dialect, avg_field_size, num_fields, total_records);
            prop_assert!(batch >= 1);
            prop_assert!(batch as usize <= total_records);
        }
    }
}
