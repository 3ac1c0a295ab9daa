// src/core/model/rules.rs

//! Header rewrite, path redirect, and model-redirect rule types.

use serde::{Deserialize, Serialize};

/// An ordered header-injection rule. `name` comparisons elsewhere in the
/// system are case-insensitive, so uniqueness is enforced on the lowercased
/// name (see `Group::validate_standalone`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderRule {
    pub name: String,
    pub value: String,
}

/// An ordered path-rewrite rule; both sides must be non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRedirect {
    pub from: String,
    pub to: String,
}

/// One weighted candidate of a V2 model-redirect rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRedirectTarget {
    pub model: String,
    pub weight: u32,
    pub enabled: bool,
}

/// A model-redirect rule, in either its V1 (single deterministic target) or
/// V2 (weighted multi-target with redirect-only enforcement) form. Kept as a
/// tagged enum rather than a nullable-field discriminator, so {V1, V2} are
/// distinguished by the type system instead of by which fields happen to be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum ModelRedirectRule {
    V1 {
        source: String,
        target: String,
    },
    V2 {
        source: String,
        targets: Vec<ModelRedirectTarget>,
        /// When true, a request for `source` that resolves to no enabled
        /// target is rejected rather than passed through unmodified.
        strict: bool,
    },
}

impl ModelRedirectRule {
    pub fn source(&self) -> &str {
        match self {
            ModelRedirectRule::V1 { source, .. } => source,
            ModelRedirectRule::V2 { source, .. } => source,
        }
    }

    /// Drops targets that are disabled or carry zero weight. Returns `None`
    /// when the rule becomes empty, so the caller can warn and skip it.
    pub fn with_dead_targets_pruned(self) -> Option<Self> {
        match self {
            ModelRedirectRule::V1 { .. } => Some(self),
            ModelRedirectRule::V2 {
                source,
                targets,
                strict,
            } => {
                let live: Vec<_> = targets
                    .into_iter()
                    .filter(|t| t.enabled && t.weight > 0)
                    .collect();
                if live.is_empty() {
                    None
                } else {
                    Some(ModelRedirectRule::V2 {
                        source,
                        targets: live,
                        strict,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_rule_with_no_live_targets_is_dropped() {
        let rule = ModelRedirectRule::V2 {
            source: "gpt-4".into(),
            targets: vec![
                ModelRedirectTarget {
                    model: "gpt-4-a".into(),
                    weight: 0,
                    enabled: true,
                },
                ModelRedirectTarget {
                    model: "gpt-4-b".into(),
                    weight: 5,
                    enabled: false,
                },
            ],
            strict: false,
        };
        assert!(rule.with_dead_targets_pruned().is_none());
    }

    #[test]
    fn v2_rule_keeps_only_live_targets() {
        let rule = ModelRedirectRule::V2 {
            source: "gpt-4".into(),
            targets: vec![
                ModelRedirectTarget {
                    model: "gpt-4-a".into(),
                    weight: 1,
                    enabled: true,
                },
                ModelRedirectTarget {
                    model: "gpt-4-b".into(),
                    weight: 0,
                    enabled: true,
                },
            ],
            strict: false,
        };
        let pruned = rule.with_dead_targets_pruned().unwrap();
        match pruned {
            ModelRedirectRule::V2 { targets, .. } => assert_eq!(targets.len(), 1),
            _ => panic!("expected V2"),
        }
    }
}
