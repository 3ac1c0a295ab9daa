// src/core/group/cache.rs

//! The immutable group-cache snapshot.

use crate::core::model::Group;
use indexmap::IndexMap;
use std::sync::Arc;

/// A point-in-time, fully-built view of every group. Both lookup maps
/// reference the same `Arc<Group>` objects, so a lookup by id and a lookup
/// by name for the same group are guaranteed to observe identical data.
/// `by_id` is an `IndexMap` so `all()` iterates in DB load order rather than
/// arbitrary hash order — callers that page or export "every group" get a
/// stable, reproducible ordering across reloads of the same snapshot.
#[derive(Debug, Default)]
pub struct GroupCache {
    by_id: IndexMap<i64, Arc<Group>>,
    by_name: IndexMap<String, Arc<Group>>,
}

impl GroupCache {
    pub fn build(groups: Vec<Group>) -> Self {
        let mut by_id = IndexMap::with_capacity(groups.len());
        let mut by_name = IndexMap::with_capacity(groups.len());
        for group in groups {
            let arc = Arc::new(group);
            by_id.insert(arc.id, Arc::clone(&arc));
            by_name.insert(arc.name.clone(), arc);
        }
        Self { by_id, by_name }
    }

    pub fn get_by_id(&self, id: i64) -> Option<Arc<Group>> {
        self.by_id.get(&id).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<Group>> {
        self.by_name.get(name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Group>> {
        self.by_id.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ChannelType, GroupConfig, GroupKind, Upstream};

    fn group(id: i64, name: &str) -> Group {
        Group {
            id,
            name: name.into(),
            display_name: None,
            kind: GroupKind::Standard {
                parent_group_id: None,
            },
            channel_type: ChannelType::OpenAi,
            upstreams: vec![Upstream {
                url: "https://api.openai.com".into(),
                weight: 1,
            }],
            proxy_keys: vec![],
            config: GroupConfig::default(),
            header_rules: vec![],
            path_redirects: vec![],
            model_redirects: vec![],
            validation_endpoint: "/v1/models".into(),
        }
    }

    #[test]
    fn by_id_and_by_name_point_at_the_same_object() {
        let cache = GroupCache::build(vec![group(1, "alpha")]);
        let by_id = cache.get_by_id(1).unwrap();
        let by_name = cache.get_by_name("alpha").unwrap();
        assert!(Arc::ptr_eq(&by_id, &by_name));
    }

    #[test]
    fn missing_lookups_return_none() {
        let cache = GroupCache::build(vec![group(1, "alpha")]);
        assert!(cache.get_by_id(99).is_none());
        assert!(cache.get_by_name("missing").is_none());
    }

    #[test]
    fn all_preserves_build_order() {
        let cache = GroupCache::build(vec![group(3, "c"), group(1, "a"), group(2, "b")]);
        let names: Vec<_> = cache.all().iter().map(|g| g.name.clone()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
