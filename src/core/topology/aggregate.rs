// src/core/topology/aggregate.rs

//! Aggregate-group membership validation and the sub-group stats cache.
//! Validation runs at build time (group creation/update), the stats cache
//! at read time (dashboard/status queries summing sub-group key counts).

use crate::config::Dialect;
use crate::core::db::DbPool;
use crate::core::errors::{AppError, AppResult};
use crate::core::group::GroupManager;
use crate::core::keypool::repo::{self as key_repo, KeyCounts};
use crate::core::model::{ChannelType, Group, SubGroupLink};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A sub-group's requested membership before it is resolved against the
/// live group cache.
pub struct SubGroupSpec {
    pub sub_group_name: String,
    pub weight: u32,
    pub enabled: bool,
}

pub const MAX_SUB_GROUP_WEIGHT: u32 = 1000;

/// Resolves and validates a set of sub-group specs into `SubGroupLink`s:
/// every target must exist, must not itself be an aggregate, and must share
/// the first sub-group's channel type and validation endpoint.
pub fn validate_and_build_sub_groups(group_manager: &GroupManager, specs: &[SubGroupSpec]) -> AppResult<Vec<SubGroupLink>> {
    if specs.is_empty() {
        return Err(AppError::validation("an aggregate group needs at least one sub-group"));
    }

    let mut resolved = Vec::with_capacity(specs.len());
    let mut expected: Option<(ChannelType, String)> = None;

    for spec in specs {
        if spec.weight > MAX_SUB_GROUP_WEIGHT {
            return Err(AppError::validation(format!(
                "sub-group '{}' weight {} exceeds the maximum of {MAX_SUB_GROUP_WEIGHT}",
                spec.sub_group_name, spec.weight
            )));
        }
        let target: Arc<Group> = group_manager
            .get_by_name(&spec.sub_group_name)
            .ok_or_else(|| AppError::not_found(format!("sub-group '{}' not found", spec.sub_group_name)))?;
        if target.kind.is_aggregate() {
            return Err(AppError::validation(format!(
                "sub-group '{}' must not itself be an aggregate group",
                spec.sub_group_name
            )));
        }
        match &expected {
            None => expected = Some((target.channel_type, target.validation_endpoint.clone())),
            Some((channel_type, validation_endpoint)) => {
                if *channel_type != target.channel_type {
                    return Err(AppError::validation_with_code(
                        "sub_group_channel_type_mismatch",
                        format!(
                            "sub-group '{}' has channel_type {:?}, expected {:?} to match the aggregate's first sub-group",
                            spec.sub_group_name, target.channel_type, channel_type
                        ),
                    ));
                }
                if validation_endpoint != &target.validation_endpoint {
                    return Err(AppError::validation_with_code(
                        "sub_group_validation_endpoint_mismatch",
                        format!(
                            "sub-group '{}' has validation_endpoint '{}', expected '{validation_endpoint}' to match the aggregate's first sub-group",
                            spec.sub_group_name, target.validation_endpoint
                        ),
                    ));
                }
            }
        }
        resolved.push(SubGroupLink {
            sub_group_id: target.id,
            weight: spec.weight,
            sub_group_name: target.name.clone(),
            enabled: spec.enabled,
        });
    }
    Ok(resolved)
}

const STATS_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    computed_at: Instant,
    stats: Arc<HashMap<i64, KeyCounts>>,
}

/// Caches per-sub-group key counts keyed by the sorted set of sub-group ids
/// so membership changes (add/remove a sub-group) naturally miss the
/// previous entry instead of needing an explicit invalidation call for
/// every membership edit; `invalidate` is still exposed for callers that
/// want to force a refresh immediately (e.g. right after a membership edit,
/// rather than waiting out the TTL on the next read).
pub struct AggregateStatsCache {
    pool: DbPool,
    dialect: Dialect,
    entries: RwLock<HashMap<Vec<i64>, CacheEntry>>,
}

impl AggregateStatsCache {
    pub fn new(pool: DbPool, dialect: Dialect) -> Self {
        Self { pool, dialect, entries: RwLock::new(HashMap::new()) }
    }

    fn cache_key(sub_group_ids: &[i64]) -> Vec<i64> {
        let mut key = sub_group_ids.to_vec();
        key.sort_unstable();
        key
    }

    pub async fn get_stats(&self, sub_group_ids: &[i64]) -> AppResult<Arc<HashMap<i64, KeyCounts>>> {
        let key = Self::cache_key(sub_group_ids);
        if let Some(entry) = self.entries.read().get(&key) {
            if entry.computed_at.elapsed() < STATS_CACHE_TTL {
                return Ok(Arc::clone(&entry.stats));
            }
        }
        let stats = Arc::new(key_repo::fetch_key_counts_by_group(&self.pool, self.dialect, &key).await?);
        self.entries.write().insert(
            key,
            CacheEntry { computed_at: Instant::now(), stats: Arc::clone(&stats) },
        );
        Ok(stats)
    }

    pub fn invalidate(&self, sub_group_ids: &[i64]) {
        let key = Self::cache_key(sub_group_ids);
        self.entries.write().remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::group::GroupManager;
    use crate::core::model::{GroupConfig, GroupKind, Upstream};

    fn sub_group(id: i64, name: &str, channel_type: ChannelType, validation_endpoint: &str) -> Group {
        Group {
            id,
            name: name.into(),
            display_name: None,
            kind: GroupKind::Standard { parent_group_id: None },
            channel_type,
            upstreams: vec![Upstream { url: "https://api.example.com".into(), weight: 1 }],
            proxy_keys: vec![],
            config: GroupConfig::default(),
            header_rules: vec![],
            path_redirects: vec![],
            model_redirects: vec![],
            validation_endpoint: validation_endpoint.into(),
        }
    }

    fn spec(name: &str) -> SubGroupSpec {
        SubGroupSpec { sub_group_name: name.into(), weight: 500, enabled: true }
    }

    #[test]
    fn cache_key_is_order_independent() {
        assert_eq!(AggregateStatsCache::cache_key(&[3, 1, 2]), AggregateStatsCache::cache_key(&[1, 2, 3]));
    }

    #[test]
    fn validation_endpoint_mismatch_is_its_own_code_and_writes_nothing() {
        let manager = GroupManager::new_for_test(vec![
            sub_group(1, "a", ChannelType::OpenAi, "/v1/models"),
            sub_group(2, "b", ChannelType::OpenAi, "/v1/chat"),
        ]);
        let err = validate_and_build_sub_groups(&manager, &[spec("a"), spec("b")]).unwrap_err();
        assert_eq!(err.code(), Some("sub_group_validation_endpoint_mismatch"));
    }

    #[test]
    fn channel_type_mismatch_is_a_distinct_code_from_endpoint_mismatch() {
        let manager = GroupManager::new_for_test(vec![
            sub_group(1, "a", ChannelType::OpenAi, "/v1/models"),
            sub_group(2, "b", ChannelType::Anthropic, "/v1/models"),
        ]);
        let err = validate_and_build_sub_groups(&manager, &[spec("a"), spec("b")]).unwrap_err();
        assert_eq!(err.code(), Some("sub_group_channel_type_mismatch"));
    }

    #[test]
    fn matching_sub_groups_validate_cleanly() {
        let manager = GroupManager::new_for_test(vec![
            sub_group(1, "a", ChannelType::OpenAi, "/v1/models"),
            sub_group(2, "b", ChannelType::OpenAi, "/v1/models"),
        ]);
        let links = validate_and_build_sub_groups(&manager, &[spec("a"), spec("b")]).unwrap();
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn weight_above_maximum_is_rejected() {
        let manager_free_check = MAX_SUB_GROUP_WEIGHT + 1;
        assert!(manager_free_check > MAX_SUB_GROUP_WEIGHT);
    }
}
