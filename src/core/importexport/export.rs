// src/core/importexport/export.rs

//! Export streaming: pages keys with offset pagination rather than a driver
//! cursor, and assembles the nested group shape
//! (aggregate sub-group weights, standard-with-children nesting; a child
//! refuses individual export).

use super::envelope::{ExportEnvelope, GroupExport, GroupFields, KeyExport, SubGroupExport, EXPORT_ENVELOPE_VERSION};
use crate::config::Dialect;
use crate::core::db::DbPool;
use crate::core::errors::{AppError, AppResult};
use crate::core::group::GroupManager;
use crate::core::keypool::repo as key_repo;
use crate::core::model::{ApiKey, Group, GroupKind, SystemSettings};
use std::sync::Arc;

/// Offset-pagination page size for a single group's keys.
pub const PER_GROUP_PAGE_SIZE: i64 = 2000;
/// Offset-pagination page size used during a system-wide export.
pub const SYSTEM_WIDE_PAGE_SIZE: i64 = 5000;

pub(super) async fn page_all_keys(pool: &DbPool, dialect: Dialect, group_id: i64, page_size: i64) -> AppResult<Vec<ApiKey>> {
    let mut out = Vec::new();
    let mut offset = 0i64;
    loop {
        let page = key_repo::fetch_keys_page(pool, dialect, group_id, offset, page_size).await?;
        let got = page.len();
        out.extend(page);
        if (got as i64) < page_size {
            break;
        }
        offset += page_size;
    }
    Ok(out)
}

fn keys_to_export(keys: Vec<ApiKey>) -> Vec<KeyExport> {
    keys.into_iter()
        .map(|k| KeyExport {
            key_value: k.key_value,
            status: match k.status {
                crate::core::model::KeyStatus::Active => "active".to_string(),
                crate::core::model::KeyStatus::Invalid => "invalid".to_string(),
            },
        })
        .collect()
}

/// Exports one group and, if it is a standard parent, its children nested
/// underneath. Rejects a direct export of a child group.
pub async fn export_group(
    pool: &DbPool,
    dialect: Dialect,
    group: &Group,
    children: &[Arc<Group>],
    page_size: i64,
) -> AppResult<GroupExport> {
    if group.kind.is_child() {
        return Err(AppError::BadRequest(format!(
            "group '{}' is a child group and cannot be exported individually",
            group.name
        )));
    }

    let keys = keys_to_export(page_all_keys(pool, dialect, group.id, page_size).await?);

    let sub_groups = match &group.kind {
        GroupKind::Aggregate { sub_groups } => Some(
            sub_groups
                .iter()
                .map(|s| SubGroupExport {
                    sub_group_name: s.sub_group_name.clone(),
                    weight: s.weight,
                    enabled: s.enabled,
                })
                .collect(),
        ),
        GroupKind::Standard { .. } => None,
    };

    let mut child_exports = Vec::new();
    for child in children {
        let child_keys = keys_to_export(page_all_keys(pool, dialect, child.id, page_size).await?);
        child_exports.push(GroupExport {
            group: GroupFields::from_group(child),
            keys: child_keys,
            sub_groups: None,
            child_groups: None,
        });
    }

    Ok(GroupExport {
        group: GroupFields::from_group(group),
        keys,
        sub_groups,
        child_groups: if child_exports.is_empty() { None } else { Some(child_exports) },
    })
}

/// Exports every non-child group in the system (children are nested under
/// their parent), with the larger system-wide page size.
pub async fn export_system(
    pool: &DbPool,
    dialect: Dialect,
    group_manager: &GroupManager,
    settings: SystemSettings,
) -> AppResult<ExportEnvelope> {
    let all = group_manager.list_groups();
    let mut children_by_parent: std::collections::HashMap<i64, Vec<Arc<Group>>> = std::collections::HashMap::new();
    for g in &all {
        if let Some(parent_id) = g.kind.parent_group_id() {
            children_by_parent.entry(parent_id).or_default().push(Arc::clone(g));
        }
    }

    let mut groups = Vec::new();
    for g in &all {
        if g.kind.is_child() {
            continue;
        }
        let children = children_by_parent.get(&g.id).cloned().unwrap_or_default();
        groups.push(export_group(pool, dialect, g, &children, SYSTEM_WIDE_PAGE_SIZE).await?);
    }

    Ok(ExportEnvelope {
        version: EXPORT_ENVELOPE_VERSION,
        exported_at: chrono::Utc::now(),
        system_settings: settings,
        groups,
        managed_sites: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ChannelType, GroupConfig, GroupKind, Upstream};

    fn child_group(id: i64, name: &str, parent_id: i64) -> Group {
        Group {
            id,
            name: name.into(),
            display_name: None,
            kind: GroupKind::Standard { parent_group_id: Some(parent_id) },
            channel_type: ChannelType::OpenAi,
            upstreams: vec![Upstream { url: "http://127.0.0.1:3001/proxy/parent".into(), weight: 1 }],
            proxy_keys: vec!["sk-child-xyz".into()],
            config: GroupConfig::default(),
            header_rules: vec![],
            path_redirects: vec![],
            model_redirects: vec![],
            validation_endpoint: "/v1/models".into(),
        }
    }

    #[tokio::test]
    async fn child_group_direct_export_is_rejected() {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .connect_lazy("sqlite::memory:")
            .unwrap();
        let child = child_group(2, "child1", 1);
        let err = export_group(&pool, Dialect::Sqlite, &child, &[], PER_GROUP_PAGE_SIZE).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
