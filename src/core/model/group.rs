// src/core/model/group.rs

//! The `Group` aggregate and its supporting value types.

use crate::core::errors::AppError;
use crate::core::model::rules::{HeaderRule, ModelRedirectRule, PathRedirect};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Group names are slugs: lowercase ASCII letters, digits, `_` and `-`, at
/// most 100 characters.
static NAME_SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_-]{1,100}$").unwrap());

pub const MAX_GROUP_NAME_LEN: usize = 100;

/// One upstream endpoint with its selection weight. A group must carry at
/// least one entry with `weight > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    pub url: String,
    pub weight: u32,
}

/// Discriminates the upstream wire protocol a group speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChannelType {
    OpenAi,
    Anthropic,
    Gemini,
    Generic,
}

/// The enumerated, closed config schema. Represented as a struct
/// rather than a free-form map so unknown keys are a deserialization error
/// by construction (`deny_unknown_fields`), with system defaults applied by
/// `Default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GroupConfig {
    pub request_timeout_seconds: u32,
    pub connect_timeout_seconds: u32,
    pub idle_timeout_seconds: u32,
    pub max_retries: u32,
    pub blacklist_threshold: u32,
    pub cc_support: bool,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 90,
            max_retries: 3,
            blacklist_threshold: 3,
            cc_support: false,
        }
    }
}

impl GroupConfig {
    /// Merges a partial, user-supplied config over the system defaults. Any
    /// key present in `raw` that does not round-trip through `GroupConfig`'s
    /// known fields is rejected at the `serde` layer by the caller before
    /// this is ever reached (see `core::group::loader`).
    pub fn merged_with_defaults(partial: Option<GroupConfig>) -> Self {
        partial.unwrap_or_default()
    }
}

/// A sub-group membership link for an aggregate group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubGroupLink {
    pub sub_group_id: i64,
    pub weight: u32,
    /// Denormalized for fast read.
    pub sub_group_name: String,
    pub enabled: bool,
}

/// The three group kinds. Nesting depth is exactly one: a `Standard` group
/// may itself be a child (`parent_group_id.is_some()`), but a child's
/// children are never materialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupKind {
    Standard { parent_group_id: Option<i64> },
    Aggregate { sub_groups: Vec<SubGroupLink> },
}

impl GroupKind {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, GroupKind::Aggregate { .. })
    }

    pub fn is_child(&self) -> bool {
        matches!(self, GroupKind::Standard { parent_group_id: Some(_) })
    }

    pub fn parent_group_id(&self) -> Option<i64> {
        match self {
            GroupKind::Standard { parent_group_id } => *parent_group_id,
            GroupKind::Aggregate { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub display_name: Option<String>,
    pub kind: GroupKind,
    pub channel_type: ChannelType,
    pub upstreams: Vec<Upstream>,
    /// Inbound credentials accepted from clients (parsed from a
    /// comma-separated column into a set at build time).
    pub proxy_keys: Vec<String>,
    pub config: GroupConfig,
    pub header_rules: Vec<HeaderRule>,
    pub path_redirects: Vec<PathRedirect>,
    pub model_redirects: Vec<ModelRedirectRule>,
    /// Effective validation endpoint, used by aggregate membership checks
    ///. For most channel types this is a fixed well-known path;
    /// it is stored rather than recomputed so aggregate validation doesn't
    /// need channel-specific knowledge.
    pub validation_endpoint: String,
}

impl Group {
    /// Validates the subset of invariants that do not require cross-group
    /// context (name shape, at least one positive-weight upstream, proxy
    /// keys non-empty for a non-child group). Cross-group invariants
    /// (aggregate membership, child parent linkage) are validated by the
    /// owning service, which has access to sibling groups.
    pub fn validate_standalone(&self) -> Result<(), AppError> {
        if self.name.len() > MAX_GROUP_NAME_LEN || !NAME_SLUG_RE.is_match(&self.name) {
            return Err(AppError::validation(format!(
                "group name '{}' must be a lowercase slug of letters, digits, '_', '-', at most {MAX_GROUP_NAME_LEN} chars",
                self.name
            )));
        }
        if !self.upstreams.iter().any(|u| u.weight > 0) {
            return Err(AppError::validation(
                "group must have at least one upstream with weight > 0",
            ));
        }
        for upstream in &self.upstreams {
            if url::Url::parse(&upstream.url).is_err() {
                return Err(AppError::validation(format!(
                    "upstream url '{}' is not a well-formed URL",
                    upstream.url
                )));
            }
        }
        if let GroupKind::Standard {
            parent_group_id: Some(_),
        } = &self.kind
        {
            if !self.proxy_keys.iter().all(|k| k.starts_with("sk-child-")) {
                return Err(AppError::validation(
                    "child group proxy keys must be system-generated sk-child- keys",
                ));
            }
        }
        let mut seen_headers = std::collections::HashSet::new();
        for rule in &self.header_rules {
            if !seen_headers.insert(rule.name.to_ascii_lowercase()) {
                return Err(AppError::validation(format!(
                    "duplicate header rule for '{}' (case-insensitive)",
                    rule.name
                )));
            }
        }
        for redirect in &self.path_redirects {
            if redirect.from.is_empty() || redirect.to.is_empty() {
                return Err(AppError::validation(
                    "path redirects must have non-empty from/to",
                ));
            }
        }
        Ok(())
    }
}

/// Non-enumerated overrides a caller may supply; anything outside
/// `GroupConfig`'s known fields must fail deserialization rather than be
/// silently dropped. Exercised by `core::group::loader` when parsing the
/// persisted JSON config column.
pub fn parse_group_config_json(raw: &str) -> Result<GroupConfig, AppError> {
    if raw.trim().is_empty() {
        return Ok(GroupConfig::default());
    }
    let provided: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(raw).map_err(|e| AppError::validation(format!("invalid config json: {e}")))?;
    let value = serde_json::to_value(&provided).map_err(|e| AppError::internal(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| AppError::validation(format!("unknown config key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_group() -> Group {
        Group {
            id: 1,
            name: "api-keys".into(),
            display_name: None,
            kind: GroupKind::Standard {
                parent_group_id: None,
            },
            channel_type: ChannelType::OpenAi,
            upstreams: vec![Upstream {
                url: "https://api.openai.com".into(),
                weight: 1,
            }],
            proxy_keys: vec!["sk-abc".into()],
            config: GroupConfig::default(),
            header_rules: vec![],
            path_redirects: vec![],
            model_redirects: vec![],
            validation_endpoint: "/v1/models".into(),
        }
    }

    #[test]
    fn rejects_uppercase_or_overlong_names() {
        let mut g = base_group();
        g.name = "Api-Keys".into();
        assert!(g.validate_standalone().is_err());

        g.name = "a".repeat(101);
        assert!(g.validate_standalone().is_err());
    }

    #[test]
    fn requires_a_positive_weight_upstream() {
        let mut g = base_group();
        g.upstreams = vec![Upstream {
            url: "https://x".into(),
            weight: 0,
        }];
        assert!(g.validate_standalone().is_err());
    }

    #[test]
    fn rejects_malformed_upstream_urls() {
        let mut g = base_group();
        g.upstreams = vec![Upstream {
            url: "not a url".into(),
            weight: 1,
        }];
        assert!(g.validate_standalone().is_err());
    }

    #[test]
    fn rejects_duplicate_header_rules_case_insensitively() {
        let mut g = base_group();
        g.header_rules = vec![
            HeaderRule {
                name: "X-Foo".into(),
                value: "1".into(),
            },
            HeaderRule {
                name: "x-foo".into(),
                value: "2".into(),
            },
        ];
        assert!(g.validate_standalone().is_err());
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let err = parse_group_config_json(r#"{"max_retries": 5, "bogus_key": true}"#).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn known_config_keys_merge_over_defaults() {
        let cfg = parse_group_config_json(r#"{"max_retries": 5}"#).unwrap();
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.request_timeout_seconds, GroupConfig::default().request_timeout_seconds);
    }
}
