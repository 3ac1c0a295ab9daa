// src/core/db/schema.rs

//! Column-list constants for the persisted tables. Queries list columns
//! explicitly rather than `SELECT *`, so a data-access interface carries
//! an explicit column list instead of relying on reflection-driven selection.

pub const GROUPS_TABLE: &str = "groups";
pub const API_KEYS_TABLE: &str = "api_keys";
pub const GROUP_SUB_GROUPS_TABLE: &str = "group_sub_groups";
pub const REQUEST_LOGS_TABLE: &str = "request_logs";
pub const SYSTEM_SETTINGS_TABLE: &str = "system_settings";
pub const GROUP_HOURLY_STATS_TABLE: &str = "group_hourly_stats";
pub const DYNAMIC_WEIGHT_METRICS_TABLE: &str = "dynamic_weight_metrics";

/// The columns the group loader selects — never `*`, so a schema addition
/// doesn't silently change what's pulled into the cache.
pub const GROUP_LOAD_COLUMNS: &[&str] = &[
    "id",
    "name",
    "display_name",
    "group_type",
    "parent_group_id",
    "channel_type",
    "upstreams",
    "proxy_keys",
    "config",
    "header_rules",
    "path_redirects",
    "model_redirects",
    "validation_endpoint",
];

pub const SUB_GROUP_LOAD_COLUMNS: &[&str] = &["group_id", "sub_group_id", "weight", "enabled"];

pub const API_KEY_COLUMNS: &[&str] = &[
    "id",
    "group_id",
    "key_value",
    "key_hash",
    "status",
    "failure_count",
    "last_used_at",
];

pub const WEIGHT_METRICS_COLUMNS: &[&str] = &[
    "group_id",
    "source_model",
    "target_model",
    "requests_180d",
    "successes_180d",
    "failures_180d",
    "last_success_at",
    "last_failure_at",
];
