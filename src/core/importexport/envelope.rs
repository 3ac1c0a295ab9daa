// src/core/importexport/envelope.rs

//! The versioned export/import wire format.

use crate::core::model::{Group, SystemSettings};
use serde::{Deserialize, Serialize};

pub const EXPORT_ENVELOPE_VERSION: u32 = 1;

/// One exported key: ciphertext plus status, never plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyExport {
    pub key_value: Vec<u8>,
    pub status: String,
}

/// A sub-group membership as carried in the export, by name rather than id
/// so it survives round-tripping into a fresh database with new ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubGroupExport {
    pub sub_group_name: String,
    pub weight: u32,
    pub enabled: bool,
}

/// A group plus its keys plus, depending on kind, its sub-group weights
/// (aggregate) or nested child-group exports (standard). Child groups
/// refuse individual export — only ever appear nested under `child_groups`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupExport {
    pub group: GroupFields,
    pub keys: Vec<KeyExport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_groups: Option<Vec<SubGroupExport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_groups: Option<Vec<GroupExport>>,
}

/// The group's own configuration, independent of database-assigned id or
/// parent linkage (parent linkage is expressed structurally via nesting
/// under `child_groups` instead).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupFields {
    pub name: String,
    pub display_name: Option<String>,
    pub channel_type: String,
    pub upstreams_json: String,
    pub proxy_keys_csv: String,
    pub config_json: String,
    pub header_rules_json: String,
    pub path_redirects_json: String,
    pub model_redirects_json: String,
    pub validation_endpoint: String,
}

impl GroupFields {
    pub fn from_group(group: &Group) -> Self {
        Self {
            name: group.name.clone(),
            display_name: group.display_name.clone(),
            channel_type: group.channel_type.to_string(),
            upstreams_json: serde_json::to_string(&group.upstreams).unwrap_or_else(|_| "[]".into()),
            proxy_keys_csv: group.proxy_keys.join(","),
            config_json: serde_json::to_string(&group.config).unwrap_or_default(),
            header_rules_json: serde_json::to_string(&group.header_rules).unwrap_or_else(|_| "[]".into()),
            path_redirects_json: serde_json::to_string(&group.path_redirects).unwrap_or_else(|_| "[]".into()),
            model_redirects_json: serde_json::to_string(&group.model_redirects).unwrap_or_else(|_| "[]".into()),
            validation_endpoint: group.validation_endpoint.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportEnvelope {
    pub version: u32,
    pub exported_at: chrono::DateTime<chrono::Utc>,
    pub system_settings: SystemSettings,
    pub groups: Vec<GroupExport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managed_sites: Option<serde_json::Value>,
}
