// src/core/topology/child.rs

//! Child-group lifecycle: creation wires a fresh system-generated inbound
//! proxy key and reuses the parent's own first proxy key as the child's
//! sole outbound credential (the child's upstream is the parent's own proxy
//! endpoint, which authenticates inbound callers against its proxy keys).
//! Parent rename and parent proxy-key rotation both propagate to every
//! child in a way that never leaves a child without a usable upstream or
//! credential.

use crate::config::{Config, Dialect};
use crate::core::crypto::CryptoBox;
use crate::core::db::DbPool;
use crate::core::errors::{AppError, AppResult};
use crate::core::group::repo::{self as group_repo, NewGroupRow};
use crate::core::keypool::repo as key_repo;
use crate::core::keypool::KeyProvider;
use crate::core::model::{ChannelType, Group, GroupConfig, Upstream};
use std::sync::Arc;

const CHILD_PROXY_KEY_PREFIX: &str = "sk-child-";
const CHILD_PROXY_KEY_RANDOM_LEN: usize = 48;
const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn generate_child_proxy_key() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CHILD_PROXY_KEY_RANDOM_LEN)
        .map(|_| ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())] as char)
        .collect();
    format!("{CHILD_PROXY_KEY_PREFIX}{suffix}")
}

pub struct ChildGroupService {
    pool: DbPool,
    dialect: Dialect,
    config: Config,
    key_provider: Arc<KeyProvider>,
}

impl ChildGroupService {
    pub fn new(pool: DbPool, dialect: Dialect, config: Config, key_provider: Arc<KeyProvider>) -> Self {
        Self { pool, dialect, config, key_provider }
    }

    /// Creates `name` as a child of `parent`. Returns the new group's id and
    /// its freshly generated inbound `sk-child-` proxy key.
    pub async fn create_child(&self, parent: &Group, name: &str, channel_type: ChannelType) -> AppResult<(i64, String)> {
        if parent.kind.parent_group_id().is_some() {
            return Err(AppError::validation("a child group's parent must not itself be a child"));
        }
        if parent.kind.is_aggregate() {
            return Err(AppError::validation("a child group's parent must be a standard group, not an aggregate"));
        }
        let parent_first_key = parent
            .proxy_keys
            .first()
            .ok_or_else(|| AppError::validation(format!("parent group '{}' has no proxy keys configured", parent.name)))?
            .clone();

        let proxy_key = generate_child_proxy_key();
        let upstreams_json = serde_json::to_string(&vec![Upstream {
            url: self.config.child_upstream_url(&parent.name),
            weight: 1,
        }])
        .map_err(|e| AppError::internal(e.to_string()))?;
        let config_json = serde_json::to_string(&GroupConfig::default()).map_err(|e| AppError::internal(e.to_string()))?;

        let row = NewGroupRow {
            name,
            display_name: None,
            group_type: "standard",
            parent_group_id: Some(parent.id),
            channel_type,
            upstreams_json,
            proxy_keys_csv: proxy_key.clone(),
            config_json,
            header_rules_json: "[]".to_string(),
            path_redirects_json: "[]".to_string(),
            model_redirects_json: "[]".to_string(),
            validation_endpoint: &parent.validation_endpoint,
        };

        let child_id = {
            let mut tx = self.pool.begin().await?;
            let id = group_repo::insert_group_tx(&mut tx, self.dialect, &row).await?;
            tx.commit().await?;
            id
        };

        self.key_provider.add_keys(child_id, &[parent_first_key]).await?;
        Ok((child_id, proxy_key))
    }

    /// Rewrites every child's upstream to point at the parent's new name,
    /// all in one transaction: a half-rewritten set of children would leave
    /// some pointing at a now-incorrect URL.
    pub async fn on_parent_renamed(&self, parent_id: i64, new_parent_name: &str) -> AppResult<usize> {
        let children = group_repo::fetch_children(&self.pool, self.dialect, parent_id).await?;
        if children.is_empty() {
            return Ok(0);
        }
        let upstreams_json = serde_json::to_string(&vec![Upstream {
            url: self.config.child_upstream_url(new_parent_name),
            weight: 1,
        }])
        .map_err(|e| AppError::internal(e.to_string()))?;

        let mut tx = self.pool.begin().await?;
        for child in &children {
            group_repo::update_upstreams_tx(&mut tx, self.dialect, child.id, &upstreams_json).await?;
        }
        tx.commit().await?;
        Ok(children.len())
    }

    /// Rotates every child's outbound credential after the parent's first
    /// proxy key changes. The new key is added before the old one is
    /// removed so a child is never left, even momentarily, without a
    /// usable credential.
    pub async fn on_parent_proxy_key_rotated(
        &self,
        crypto: &dyn CryptoBox,
        parent_id: i64,
        old_first_key: &str,
        new_first_key: &str,
    ) -> AppResult<usize> {
        let children = group_repo::fetch_children(&self.pool, self.dialect, parent_id).await?;
        let old_hash = crypto.hash(old_first_key);
        let mut rewired = 0usize;
        for child in &children {
            self.key_provider.add_keys(child.id, &[new_first_key.to_string()]).await?;
            if let Some(old_key_id) = key_repo::fetch_id_by_hash(&self.pool, self.dialect, child.id, &old_hash).await? {
                self.key_provider.remove_keys(child.id, &[old_key_id]).await?;
            }
            rewired += 1;
        }
        Ok(rewired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_proxy_key_has_the_expected_shape() {
        let key = generate_child_proxy_key();
        assert!(key.starts_with(CHILD_PROXY_KEY_PREFIX));
        assert_eq!(key.len(), CHILD_PROXY_KEY_PREFIX.len() + CHILD_PROXY_KEY_RANDOM_LEN);
    }

    #[test]
    fn generated_proxy_keys_are_not_all_identical() {
        let a = generate_child_proxy_key();
        let b = generate_child_proxy_key();
        assert_ne!(a, b);
    }
}
