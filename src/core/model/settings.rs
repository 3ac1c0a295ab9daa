// src/core/model/settings.rs

//! `SystemSettings`: the small set of process-wide knobs persisted in the
//! `system_settings` table and carried verbatim in the export
//! envelope.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSettings {
    pub request_log_retention_days: u32,
    pub default_blacklist_threshold: u32,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            request_log_retention_days: 30,
            default_blacklist_threshold: 3,
        }
    }
}
