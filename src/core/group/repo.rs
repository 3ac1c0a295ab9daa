// src/core/group/repo.rs

//! Write-side persistence for the `groups` / `group_sub_groups` tables.
//! `GroupManager`/`loader` only ever read; creation, renaming, and
//! sub-group/child linkage mutation live here so `ImportExportService` and
//! `core::topology` share one place that knows the column list.

use crate::config::Dialect;
use crate::core::db::{DbPool, DbTx};
use crate::core::db::placeholder::placeholder;
use crate::core::db::schema::{GROUPS_TABLE, GROUP_SUB_GROUPS_TABLE};
use crate::core::errors::{AppError, AppResult};
use crate::core::model::{ChannelType, Group, GroupKind};
use sqlx::Row;

/// Everything needed to insert one `groups` row. Rule/config columns are
/// pre-serialized to JSON by the caller (same representation `loader`
/// parses back), keeping this module free of a second copy of the JSON
/// schema.
pub struct NewGroupRow<'a> {
    pub name: &'a str,
    pub display_name: Option<&'a str>,
    pub group_type: &'static str,
    pub parent_group_id: Option<i64>,
    pub channel_type: ChannelType,
    pub upstreams_json: String,
    pub proxy_keys_csv: String,
    pub config_json: String,
    pub header_rules_json: String,
    pub path_redirects_json: String,
    pub model_redirects_json: String,
    pub validation_endpoint: &'a str,
}

impl<'a> NewGroupRow<'a> {
    pub fn from_group(group: &'a Group) -> AppResult<Self> {
        let group_type = if group.kind.is_aggregate() { "aggregate" } else { "standard" };
        Ok(Self {
            name: &group.name,
            display_name: group.display_name.as_deref(),
            group_type,
            parent_group_id: group.kind.parent_group_id(),
            channel_type: group.channel_type,
            upstreams_json: serde_json::to_string(&group.upstreams).map_err(|e| AppError::internal(e.to_string()))?,
            proxy_keys_csv: group.proxy_keys.join(","),
            config_json: serde_json::to_string(&group.config).map_err(|e| AppError::internal(e.to_string()))?,
            header_rules_json: serde_json::to_string(&group.header_rules).map_err(|e| AppError::internal(e.to_string()))?,
            path_redirects_json: serde_json::to_string(&group.path_redirects).map_err(|e| AppError::internal(e.to_string()))?,
            model_redirects_json: serde_json::to_string(&group.model_redirects).map_err(|e| AppError::internal(e.to_string()))?,
            validation_endpoint: &group.validation_endpoint,
        })
    }
}

fn channel_type_str(ct: ChannelType) -> &'static str {
    match ct {
        ChannelType::OpenAi => "openai",
        ChannelType::Anthropic => "anthropic",
        ChannelType::Gemini => "gemini",
        ChannelType::Generic => "generic",
    }
}

/// Inserts one group row inside an already-open transaction, returning the
/// new row id.
pub async fn insert_group_tx(tx: &mut DbTx<'_>, dialect: Dialect, row: &NewGroupRow<'_>) -> AppResult<i64> {
    let sql = format!(
        "INSERT INTO {GROUPS_TABLE} \
         (name, display_name, group_type, parent_group_id, channel_type, upstreams, proxy_keys, config, \
          header_rules, path_redirects, model_redirects, validation_endpoint) \
         VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
        placeholder(dialect, 1),
        placeholder(dialect, 2),
        placeholder(dialect, 3),
        placeholder(dialect, 4),
        placeholder(dialect, 5),
        placeholder(dialect, 6),
        placeholder(dialect, 7),
        placeholder(dialect, 8),
        placeholder(dialect, 9),
        placeholder(dialect, 10),
        placeholder(dialect, 11),
        placeholder(dialect, 12),
    );
    sqlx::query(&sql)
        .bind(row.name)
        .bind(row.display_name)
        .bind(row.group_type)
        .bind(row.parent_group_id)
        .bind(channel_type_str(row.channel_type))
        .bind(&row.upstreams_json)
        .bind(&row.proxy_keys_csv)
        .bind(&row.config_json)
        .bind(&row.header_rules_json)
        .bind(&row.path_redirects_json)
        .bind(&row.model_redirects_json)
        .bind(row.validation_endpoint)
        .execute(&mut **tx)
        .await?;

    fetch_id_by_name_tx(tx, dialect, row.name)
        .await?
        .ok_or_else(|| AppError::internal("inserted group row vanished before id lookup"))
}

pub(crate) async fn fetch_id_by_name_tx(tx: &mut DbTx<'_>, dialect: Dialect, name: &str) -> AppResult<Option<i64>> {
    let sql = format!("SELECT id FROM {GROUPS_TABLE} WHERE name = {}", placeholder(dialect, 1));
    let row = sqlx::query(&sql).bind(name).fetch_optional(&mut **tx).await?;
    Ok(row.map(|r| r.try_get::<i64, _>("id")).transpose()?)
}

pub async fn fetch_id_by_name(pool: &DbPool, dialect: Dialect, name: &str) -> AppResult<Option<i64>> {
    let sql = format!("SELECT id FROM {GROUPS_TABLE} WHERE name = {}", placeholder(dialect, 1));
    let row = sqlx::query(&sql).bind(name).fetch_optional(pool).await?;
    Ok(row.map(|r| r.try_get::<i64, _>("id")).transpose()?)
}

/// Every existing group name, used by the import-time uniqueness-suffixing
/// loop.
pub async fn fetch_all_names(pool: &DbPool) -> AppResult<std::collections::HashSet<String>> {
    let rows = sqlx::query(&format!("SELECT name FROM {GROUPS_TABLE}")).fetch_all(pool).await?;
    Ok(rows.iter().filter_map(|r| r.try_get::<String, _>("name").ok()).collect())
}

/// A child group's id and name, used by parent-rename/proxy-key-rotation
/// rewrites.
pub struct ChildRef {
    pub id: i64,
    pub name: String,
}

pub async fn fetch_children(pool: &DbPool, dialect: Dialect, parent_id: i64) -> AppResult<Vec<ChildRef>> {
    let sql = format!(
        "SELECT id, name FROM {GROUPS_TABLE} WHERE parent_group_id = {}",
        placeholder(dialect, 1)
    );
    let rows = sqlx::query(&sql).bind(parent_id).fetch_all(pool).await?;
    rows.into_iter()
        .map(|r| {
            Ok(ChildRef {
                id: r.try_get("id").map_err(AppError::from)?,
                name: r.try_get("name").map_err(AppError::from)?,
            })
        })
        .collect()
}

/// Rewrites a single group's `upstreams` JSON column inside an open
/// transaction.
pub async fn update_upstreams_tx(
    tx: &mut DbTx<'_>,
    dialect: Dialect,
    group_id: i64,
    upstreams_json: &str,
) -> AppResult<()> {
    let sql = format!(
        "UPDATE {GROUPS_TABLE} SET upstreams = {} WHERE id = {}",
        placeholder(dialect, 1),
        placeholder(dialect, 2)
    );
    sqlx::query(&sql).bind(upstreams_json).bind(group_id).execute(&mut **tx).await?;
    Ok(())
}

/// Replaces a group's `proxy_keys` CSV column (used when a child's inbound
/// `sk-child-` credential is regenerated on import).
pub async fn update_proxy_keys_tx(
    tx: &mut DbTx<'_>,
    dialect: Dialect,
    group_id: i64,
    proxy_keys_csv: &str,
) -> AppResult<()> {
    let sql = format!(
        "UPDATE {GROUPS_TABLE} SET proxy_keys = {} WHERE id = {}",
        placeholder(dialect, 1),
        placeholder(dialect, 2)
    );
    sqlx::query(&sql).bind(proxy_keys_csv).bind(group_id).execute(&mut **tx).await?;
    Ok(())
}

/// Inserts one sub-group membership link.
pub async fn insert_sub_group_link_tx(
    tx: &mut DbTx<'_>,
    dialect: Dialect,
    group_id: i64,
    sub_group_id: i64,
    weight: u32,
    enabled: bool,
) -> AppResult<()> {
    let sql = format!(
        "INSERT INTO {GROUP_SUB_GROUPS_TABLE} (group_id, sub_group_id, weight, enabled) VALUES ({}, {}, {}, {})",
        placeholder(dialect, 1),
        placeholder(dialect, 2),
        placeholder(dialect, 3),
        placeholder(dialect, 4),
    );
    sqlx::query(&sql)
        .bind(group_id)
        .bind(sub_group_id)
        .bind(weight as i64)
        .bind(enabled)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Clears every sub-group link for `group_id`, used when the stats cache
/// membership changes.
pub async fn clear_sub_group_links_tx(tx: &mut DbTx<'_>, dialect: Dialect, group_id: i64) -> AppResult<()> {
    let sql = format!("DELETE FROM {GROUP_SUB_GROUPS_TABLE} WHERE group_id = {}", placeholder(dialect, 1));
    sqlx::query(&sql).bind(group_id).execute(&mut **tx).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{GroupConfig, GroupKind, Upstream};

    #[test]
    fn new_group_row_serializes_standard_group() {
        let group = Group {
            id: 0,
            name: "api-keys".into(),
            display_name: None,
            kind: GroupKind::Standard { parent_group_id: None },
            channel_type: ChannelType::OpenAi,
            upstreams: vec![Upstream { url: "https://api.openai.com".into(), weight: 1 }],
            proxy_keys: vec!["sk-a".into(), "sk-b".into()],
            config: GroupConfig::default(),
            header_rules: vec![],
            path_redirects: vec![],
            model_redirects: vec![],
            validation_endpoint: "/v1/models".into(),
        };
        let row = NewGroupRow::from_group(&group).unwrap();
        assert_eq!(row.group_type, "standard");
        assert_eq!(row.proxy_keys_csv, "sk-a,sk-b");
    }
}
