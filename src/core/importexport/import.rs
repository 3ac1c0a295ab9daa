// src/core/importexport/import.rs

//! Import side of the envelope round trip: creates groups with
//! automatically made-unique names, normalizes every imported key to
//! active/failure_count=0 regardless of its exported status, and recomputes
//! a nested child group's upstream against the newly created parent rather
//! than trusting the exported URL.

use super::envelope::{ExportEnvelope, GroupExport};
use super::reencrypt::reencrypt_and_dedup;
use crate::config::{Config, Dialect};
use crate::core::bulk::bulk_insert_api_keys_with_tx;
use crate::core::crypto::CryptoBox;
use crate::core::db::DbPool;
use crate::core::errors::{AppError, AppResult};
use crate::core::group::repo as group_repo;
use crate::core::group::repo::NewGroupRow;
use crate::core::model::ChannelType;
use std::collections::HashSet;

const NAME_SUFFIX_LEN: usize = 4;
const MAX_NAME_ATTEMPTS: u32 = 10;
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Default, Clone, Copy)]
pub struct ImportOutcome {
    pub groups_created: usize,
    pub keys_inserted: u64,
    pub keys_ignored: u64,
}

impl ImportOutcome {
    fn merge(&mut self, other: ImportOutcome) {
        self.groups_created += other.groups_created;
        self.keys_inserted += other.keys_inserted;
        self.keys_ignored += other.keys_ignored;
    }
}

fn random_suffix() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..NAME_SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

/// Picks a name not already in `existing`, truncating `base` to make room
/// for a suffix only when needed, and gives up after `MAX_NAME_ATTEMPTS`
/// collisions. `existing` is updated with the chosen name so a later call in
/// the same import sees it.
fn make_unique_name(existing: &mut HashSet<String>, base: &str) -> AppResult<(String, Option<String>)> {
    if !existing.contains(base) {
        existing.insert(base.to_string());
        return Ok((base.to_string(), None));
    }
    for _ in 0..MAX_NAME_ATTEMPTS {
        let suffix = random_suffix();
        let trimmed = if base.len() + suffix.len() > crate::core::model::group::MAX_GROUP_NAME_LEN {
            &base[..crate::core::model::group::MAX_GROUP_NAME_LEN - suffix.len()]
        } else {
            base
        };
        let candidate = format!("{trimmed}{suffix}");
        if !existing.contains(&candidate) {
            existing.insert(candidate.clone());
            return Ok((candidate, Some(suffix)));
        }
    }
    Err(AppError::Conflict(format!(
        "could not generate a unique name for '{base}' after {MAX_NAME_ATTEMPTS} attempts"
    )))
}

/// Applies the same suffix chosen for the group's name to its display name,
/// with the same no-separator join (spec §6 scenario 2: "display name
/// receives the same suffix").
fn suffixed_display_name(display_name: Option<&str>, suffix: Option<&str>) -> Option<String> {
    match (display_name, suffix) {
        (Some(name), Some(suffix)) => Some(format!("{name}{suffix}")),
        (Some(name), None) => Some(name.to_string()),
        (None, _) => None,
    }
}

fn channel_type_from_str(s: &str) -> ChannelType {
    match s {
        "anthropic" => ChannelType::Anthropic,
        "gemini" => ChannelType::Gemini,
        "generic" => ChannelType::Generic,
        _ => ChannelType::OpenAi,
    }
}

async fn import_one_group(
    tx: &mut crate::core::db::DbTx<'_>,
    dialect: Dialect,
    crypto: &dyn CryptoBox,
    existing_names: &mut HashSet<String>,
    export: &GroupExport,
    parent: Option<(i64, &str)>,
    config: &Config,
) -> AppResult<ImportOutcome> {
    let (final_name, suffix) = make_unique_name(existing_names, &export.group.name)?;
    let display_name = suffixed_display_name(export.group.display_name.as_deref(), suffix.as_deref());

    let upstreams_json = match parent {
        Some((_, parent_name)) => serde_json::to_string(&vec![crate::core::model::Upstream {
            url: config.child_upstream_url(parent_name),
            weight: 1,
        }])
        .map_err(|e| AppError::internal(e.to_string()))?,
        None => export.group.upstreams_json.clone(),
    };

    let group_type: &'static str = if export.sub_groups.is_some() { "aggregate" } else { "standard" };

    let row = NewGroupRow {
        name: &final_name,
        display_name: display_name.as_deref(),
        group_type,
        parent_group_id: parent.map(|(id, _)| id),
        channel_type: channel_type_from_str(&export.group.channel_type),
        upstreams_json,
        proxy_keys_csv: export.group.proxy_keys_csv.clone(),
        config_json: export.group.config_json.clone(),
        header_rules_json: export.group.header_rules_json.clone(),
        path_redirects_json: export.group.path_redirects_json.clone(),
        model_redirects_json: export.group.model_redirects_json.clone(),
        validation_endpoint: &export.group.validation_endpoint,
    };
    let group_id = group_repo::insert_group_tx(tx, dialect, &row).await?;

    if let Some(sub_groups) = &export.sub_groups {
        for link in sub_groups {
            if let Some(sub_id) = group_repo::fetch_id_by_name_tx(tx, dialect, &link.sub_group_name).await? {
                group_repo::insert_sub_group_link_tx(tx, dialect, group_id, sub_id, link.weight, link.enabled).await?;
            }
        }
    }

    let mut outcome = ImportOutcome { groups_created: 1, ..Default::default() };
    let mut existing_hashes = HashSet::new();
    let (fresh_keys, ignored) = reencrypt_and_dedup(crypto, group_id, &mut existing_hashes, &export.keys);
    outcome.keys_ignored += ignored;
    outcome.keys_inserted += bulk_insert_api_keys_with_tx(tx, dialect, &fresh_keys, None).await?;

    if let Some(children) = &export.child_groups {
        for child in children {
            if child.sub_groups.is_some() || child.child_groups.is_some() {
                return Err(AppError::BadRequest(
                    "a child group cannot itself carry sub-groups or further nested children".into(),
                ));
            }
            let child_outcome =
                Box::pin(import_one_group(tx, dialect, crypto, existing_names, child, Some((group_id, &final_name)), config))
                    .await?;
            outcome.merge(child_outcome);
        }
    }

    Ok(outcome)
}

/// Imports every group in `envelope`, each standalone top-level group and
/// its nested children in one transaction. A child group refuses standalone
/// import — it only ever appears nested under `child_groups` in the
/// envelope shape, so this is enforced structurally rather than checked.
pub async fn import_envelope(
    pool: &DbPool,
    dialect: Dialect,
    crypto: &dyn CryptoBox,
    config: &Config,
    envelope: &ExportEnvelope,
) -> AppResult<ImportOutcome> {
    let mut existing_names = group_repo::fetch_all_names(pool).await?;
    let mut total = ImportOutcome::default();
    for group_export in &envelope.groups {
        let mut tx = pool.begin().await?;
        let outcome = import_one_group(&mut tx, dialect, crypto, &mut existing_names, group_export, None, config).await?;
        tx.commit().await?;
        total.merge(outcome);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_name_passes_through_when_free() {
        let mut existing = HashSet::new();
        let (name, suffix) = make_unique_name(&mut existing, "payments").unwrap();
        assert_eq!(name, "payments");
        assert!(suffix.is_none());
    }

    #[test]
    fn unique_name_suffixes_on_collision() {
        let mut existing: HashSet<String> = ["payments".to_string()].into_iter().collect();
        let (name, suffix) = make_unique_name(&mut existing, "payments").unwrap();
        assert_ne!(name, "payments");
        assert!(name.starts_with("payments"));
        assert!(suffix.is_some());
        assert_eq!(name.len(), "payments".len() + NAME_SUFFIX_LEN);
    }

    #[test]
    fn unique_name_truncates_base_when_at_max_length() {
        let long_base = "a".repeat(crate::core::model::group::MAX_GROUP_NAME_LEN);
        let mut existing: HashSet<String> = [long_base.clone()].into_iter().collect();
        let (name, _) = make_unique_name(&mut existing, &long_base).unwrap();
        assert_eq!(name.len(), crate::core::model::group::MAX_GROUP_NAME_LEN);
    }

    #[test]
    fn display_name_receives_the_same_suffix_with_no_separator() {
        let suffix = "x7q2";
        let display = suffixed_display_name(Some("Payments API"), Some(suffix));
        assert_eq!(display, Some(format!("Payments API{suffix}")));
    }

    #[test]
    fn display_name_is_unchanged_when_the_name_did_not_collide() {
        assert_eq!(suffixed_display_name(Some("Payments API"), None), Some("Payments API".to_string()));
    }

    #[test]
    fn absent_display_name_stays_absent_regardless_of_suffix() {
        assert_eq!(suffixed_display_name(None, Some("x7q2")), None);
        assert_eq!(suffixed_display_name(None, None), None);
    }

    /// Scenario 2: a colliding group "api-keys" gets a name matching
    /// `^api-keys[A-Za-z0-9]{4}$`, and its display name carries the exact
    /// same 4-char token, joined the same way (no separator).
    #[test]
    fn name_and_display_name_suffixes_match_on_collision() {
        let mut existing: HashSet<String> = ["api-keys".to_string()].into_iter().collect();
        let (name, suffix) = make_unique_name(&mut existing, "api-keys").unwrap();
        let suffix = suffix.unwrap();
        assert_eq!(name, format!("api-keys{suffix}"));
        let display = suffixed_display_name(Some("API Keys"), Some(&suffix)).unwrap();
        assert_eq!(display, format!("API Keys{suffix}"));
    }
}
