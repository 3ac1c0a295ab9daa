// src/core/group/loader.rs

//! One-shot DB read that builds a full `Vec<Group>` from the `groups` and
//! `group_sub_groups` tables.

use crate::core::db::DbPool;
use crate::core::db::schema::{GROUP_LOAD_COLUMNS, GROUPS_TABLE, GROUP_SUB_GROUPS_TABLE, SUB_GROUP_LOAD_COLUMNS};
use crate::core::errors::{AppError, AppResult};
use crate::core::model::group::parse_group_config_json;
use crate::core::model::rules::{HeaderRule, ModelRedirectRule, PathRedirect};
use crate::core::model::{ChannelType, Group, GroupKind, SubGroupLink, Upstream};
use sqlx::Row;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// A sub-group membership row as read directly from `group_sub_groups`,
/// before being matched up with its sub-group's denormalized name.
struct RawSubGroupLink {
    group_id: i64,
    sub_group_id: i64,
    weight: u32,
    enabled: bool,
}

async fn load_sub_group_links(pool: &DbPool, timeout: Duration) -> AppResult<Vec<RawSubGroupLink>> {
    let sql = format!(
        "SELECT {} FROM {GROUP_SUB_GROUPS_TABLE} WHERE weight > 0",
        SUB_GROUP_LOAD_COLUMNS.join(", ")
    );
    let rows = tokio::time::timeout(timeout, sqlx::query(&sql).fetch_all(pool))
        .await
        .map_err(|_| AppError::Transient("sub-group link query timed out".into()))??;

    Ok(rows
        .into_iter()
        .map(|row| RawSubGroupLink {
            group_id: row.try_get::<i64, _>("group_id").unwrap_or_default(),
            sub_group_id: row.try_get::<i64, _>("sub_group_id").unwrap_or_default(),
            weight: row.try_get::<i64, _>("weight").unwrap_or_default().max(0) as u32,
            enabled: row.try_get::<bool, _>("enabled").unwrap_or(true),
        })
        .collect())
}

/// Loads every group row and every positive-weight sub-group link
/// concurrently, then builds fully-resolved `Group` values (config merge,
/// rule parsing, V2 target pruning, aggregate sub-group annotation).
pub async fn load_all_groups(pool: &DbPool, timeout: Duration) -> AppResult<Vec<Group>> {
    let sql = format!(
        "SELECT {} FROM {GROUPS_TABLE}",
        GROUP_LOAD_COLUMNS.join(", ")
    );
    let groups_query = async {
        tokio::time::timeout(timeout, sqlx::query(&sql).fetch_all(pool))
            .await
            .map_err(|_| AppError::Transient("group query timed out".into()))?
            .map_err(AppError::from)
    };
    let (rows, sub_links) = futures::try_join!(groups_query, load_sub_group_links(pool, timeout))?;

    // Index raw rows by id so aggregate annotation can look up a sub-group's
    // name without a second DB round trip.
    let mut names_by_id: HashMap<i64, String> = HashMap::new();
    for row in &rows {
        let id: i64 = row.try_get("id").unwrap_or_default();
        let name: String = row.try_get("name").unwrap_or_default();
        names_by_id.insert(id, name);
    }

    let mut links_by_parent: HashMap<i64, Vec<RawSubGroupLink>> = HashMap::new();
    for link in sub_links {
        links_by_parent.entry(link.group_id).or_default().push(link);
    }

    let mut groups = Vec::with_capacity(rows.len());
    for row in rows {
        match build_group_from_row(&row, &names_by_id, &links_by_parent) {
            Ok(group) => groups.push(group),
            Err(e) => warn!("skipping group row that failed to build: {e}"),
        }
    }
    Ok(groups)
}

fn build_group_from_row(
    row: &sqlx::any::AnyRow,
    names_by_id: &HashMap<i64, String>,
    links_by_parent: &HashMap<i64, Vec<RawSubGroupLink>>,
) -> AppResult<Group> {
    let id: i64 = row.try_get("id").map_err(AppError::from)?;
    let name: String = row.try_get("name").map_err(AppError::from)?;
    let display_name: Option<String> = row.try_get("display_name").ok();
    let group_type: String = row.try_get("group_type").map_err(AppError::from)?;
    let parent_group_id: Option<i64> = row.try_get("parent_group_id").ok().flatten();
    let channel_type_raw: String = row.try_get("channel_type").map_err(AppError::from)?;
    let upstreams_json: String = row.try_get("upstreams").unwrap_or_else(|_| "[]".into());
    let proxy_keys_raw: String = row.try_get("proxy_keys").unwrap_or_default();
    let config_json: String = row.try_get("config").unwrap_or_default();
    let header_rules_json: String = row.try_get("header_rules").unwrap_or_else(|_| "[]".into());
    let path_redirects_json: String = row.try_get("path_redirects").unwrap_or_else(|_| "[]".into());
    let model_redirects_json: String = row.try_get("model_redirects").unwrap_or_else(|_| "[]".into());
    let validation_endpoint: String = row
        .try_get("validation_endpoint")
        .unwrap_or_else(|_| "/v1/models".into());

    let channel_type = parse_channel_type(&channel_type_raw)?;
    let upstreams: Vec<Upstream> =
        serde_json::from_str(&upstreams_json).map_err(|e| AppError::validation(format!("bad upstreams json: {e}")))?;
    let proxy_keys: Vec<String> = proxy_keys_raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let config = parse_group_config_json(&config_json)?;
    let header_rules: Vec<HeaderRule> = serde_json::from_str(&header_rules_json)
        .map_err(|e| AppError::validation(format!("bad header_rules json: {e}")))?;
    let path_redirects: Vec<PathRedirect> = serde_json::from_str(&path_redirects_json)
        .map_err(|e| AppError::validation(format!("bad path_redirects json: {e}")))?;
    let raw_model_redirects: Vec<ModelRedirectRule> = serde_json::from_str(&model_redirects_json)
        .map_err(|e| AppError::validation(format!("bad model_redirects json: {e}")))?;
    let model_redirects: Vec<ModelRedirectRule> = raw_model_redirects
        .into_iter()
        .filter_map(ModelRedirectRule::with_dead_targets_pruned)
        .collect();

    let kind = match group_type.as_str() {
        "aggregate" => {
            let sub_groups = links_by_parent
                .get(&id)
                .map(|links| {
                    links
                        .iter()
                        .filter_map(|link| {
                            names_by_id.get(&link.sub_group_id).map(|sub_name| SubGroupLink {
                                sub_group_id: link.sub_group_id,
                                weight: link.weight,
                                sub_group_name: sub_name.clone(),
                                enabled: link.enabled,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            GroupKind::Aggregate { sub_groups }
        }
        "standard" => GroupKind::Standard { parent_group_id },
        other => {
            return Err(AppError::validation(format!("unknown group_type '{other}'")));
        }
    };

    let group = Group {
        id,
        name,
        display_name,
        kind,
        channel_type,
        upstreams,
        proxy_keys,
        config,
        header_rules,
        path_redirects,
        model_redirects,
        validation_endpoint,
    };
    group.validate_standalone()?;
    Ok(group)
}

fn parse_channel_type(raw: &str) -> AppResult<ChannelType> {
    match raw {
        "openai" => Ok(ChannelType::OpenAi),
        "anthropic" => Ok(ChannelType::Anthropic),
        "gemini" => Ok(ChannelType::Gemini),
        "generic" => Ok(ChannelType::Generic),
        other => Err(AppError::validation(format!("unknown channel_type '{other}'"))),
    }
}
