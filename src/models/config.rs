use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::env;
use crate::settings::DEFAULT_RETENTION_COUNT;

/// When a user accepted a given policy version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAcceptanceRecord {
    pub version: String,
    pub accepted_at_utc: DateTime<Utc>,
}

/// Persisted `launcher.json`, one per install root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LauncherConfigModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    pub version_root: String,
    pub versions: Vec<String>,
    pub executables: BTreeMap<String, String>,
    pub data_dir_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_count: Option<u32>,
    pub accepted_policies: BTreeMap<String, PolicyAcceptanceRecord>,
    /// Fields written by other tools or newer versions, kept verbatim.
    #[serde(flatten)]
    pub extension_data: Map<String, Value>,
}

impl Default for LauncherConfigModel {
    fn default() -> Self {
        Self {
            current_version: None,
            version_root: env::VERSION_ROOT.into(),
            versions: Vec::new(),
            executables: BTreeMap::new(),
            data_dir_name: env::DATA_DIR.into(),
            retention_count: None,
            accepted_policies: BTreeMap::new(),
            extension_data: Map::new(),
        }
    }
}

impl LauncherConfigModel {
    pub fn effective_retention(&self) -> u32 {
        self.retention_count.unwrap_or(DEFAULT_RETENTION_COUNT).max(1)
    }

    pub fn windows_executable(&self) -> &str {
        self.executables
            .get(env::WINDOWS_PLATFORM_KEY)
            .map(String::as_str)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(env::APP_EXECUTABLE)
    }

    pub fn current_version(&self) -> Option<&str> {
        self.current_version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Accepted version recorded for a policy slug, matched case-insensitively.
    pub fn accepted_policy_version(&self, slug: &str) -> Option<&str> {
        self.accepted_policies
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(slug))
            .map(|(_, record)| record.version.as_str())
    }
}

/// Persisted `bootloader.json` used by the alternate bootloader start path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BootloaderConfigModel {
    pub version_root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    pub versions: Vec<String>,
    pub executables: BTreeMap<String, String>,
    pub data_dir_name: String,
    #[serde(flatten)]
    pub extension_data: Map<String, Value>,
}

impl Default for BootloaderConfigModel {
    fn default() -> Self {
        Self {
            version_root: env::VERSION_ROOT.into(),
            current_version: None,
            versions: Vec::new(),
            executables: BTreeMap::new(),
            data_dir_name: env::DATA_DIR.into(),
            extension_data: Map::new(),
        }
    }
}

impl From<&BootloaderConfigModel> for LauncherConfigModel {
    fn from(boot: &BootloaderConfigModel) -> Self {
        Self {
            current_version: boot.current_version.clone(),
            version_root: boot.version_root.clone(),
            versions: boot.versions.clone(),
            executables: boot.executables.clone(),
            data_dir_name: boot.data_dir_name.clone(),
            ..Self::default()
        }
    }
}
