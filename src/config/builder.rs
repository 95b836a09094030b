use std::collections::{BTreeMap, HashSet};

use crate::env::{self, non_blank_or};
use crate::models::{BootloaderConfigModel, LauncherConfigModel, PolicyAcceptanceRecord};
use crate::settings::DEFAULT_RETENTION_COUNT;

/// Facts observed by an install or update pass, merged into the persisted config.
#[derive(Clone, Debug, Default)]
pub struct LauncherConfigUpdate {
    pub current_version: Option<String>,
    /// Versions that actually exist on disk. When present, the merged list is pruned to these.
    pub available_versions: Option<Vec<String>>,
    pub version_root: Option<String>,
    pub data_dir_name: Option<String>,
    pub executable_name: Option<String>,
    pub retention_count: Option<u32>,
    pub accepted_policies: BTreeMap<String, PolicyAcceptanceRecord>,
}

impl LauncherConfigUpdate {
    pub fn installed(version: impl Into<String>) -> Self {
        Self {
            current_version: Some(version.into()),
            ..Self::default()
        }
    }

    pub fn with_available(mut self, versions: Vec<String>) -> Self {
        self.available_versions = Some(versions);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct BootloaderConfigUpdate {
    pub current_version: Option<String>,
    pub available_versions: Vec<String>,
    pub version_root: Option<String>,
    pub data_dir_name: Option<String>,
    pub executable_name: Option<String>,
}

pub struct LauncherConfigBuilder;

impl LauncherConfigBuilder {
    /// Merge `update` into `existing` (or a fresh config). Never destructive: unknown
    /// fields, accepted policies and still-present versions survive.
    pub fn build_or_update(
        existing: Option<&LauncherConfigModel>,
        update: &LauncherConfigUpdate,
    ) -> LauncherConfigModel {
        let mut config = existing.cloned().unwrap_or_default();

        config.version_root = pick(update.version_root.as_deref(), &config.version_root, env::VERSION_ROOT);
        config.data_dir_name = pick(update.data_dir_name.as_deref(), &config.data_dir_name, env::DATA_DIR);
        let executable = pick(
            update.executable_name.as_deref(),
            config.windows_executable(),
            env::APP_EXECUTABLE,
        );
        config
            .executables
            .insert(env::WINDOWS_PLATFORM_KEY.to_owned(), executable);

        let current = non_blank(update.current_version.as_deref())
            .or_else(|| non_blank(config.current_version.as_deref()))
            .map(str::to_owned);

        let discovered = update.available_versions.as_deref().unwrap_or_default();
        let mut versions = merge_versions(&config.versions, discovered, current.as_deref());

        if let Some(available) = update.available_versions.as_deref() {
            let allowed: HashSet<String> = available
                .iter()
                .map(|v| v.trim().to_lowercase())
                .chain(current.iter().map(|v| v.to_lowercase()))
                .collect();
            versions.retain(|v| allowed.contains(&v.to_lowercase()));
        }

        config.versions = versions;
        config.current_version = current;

        let retention = update
            .retention_count
            .or(config.retention_count)
            .unwrap_or(DEFAULT_RETENTION_COUNT)
            .max(1);
        config.retention_count = Some(retention);

        config.accepted_policies = merge_policies(&config.accepted_policies, &update.accepted_policies);
        config
    }
}

pub struct BootloaderConfigBuilder;

impl BootloaderConfigBuilder {
    pub fn build_or_update(
        existing: Option<&BootloaderConfigModel>,
        update: &BootloaderConfigUpdate,
    ) -> BootloaderConfigModel {
        let mut config = existing.cloned().unwrap_or_default();

        config.version_root = pick(update.version_root.as_deref(), &config.version_root, env::VERSION_ROOT);
        config.data_dir_name = pick(update.data_dir_name.as_deref(), &config.data_dir_name, env::DATA_DIR);
        let existing_exe = config
            .executables
            .get(env::WINDOWS_PLATFORM_KEY)
            .cloned()
            .unwrap_or_default();
        let executable = pick(update.executable_name.as_deref(), &existing_exe, env::APP_EXECUTABLE);
        config
            .executables
            .insert(env::WINDOWS_PLATFORM_KEY.to_owned(), executable);

        let current = non_blank(update.current_version.as_deref())
            .or_else(|| non_blank(config.current_version.as_deref()))
            .map(str::to_owned);
        config.versions = merge_versions(&config.versions, &update.available_versions, current.as_deref());
        config.current_version = current;
        config
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn pick(supplied: Option<&str>, existing: &str, fallback: &str) -> String {
    match non_blank(supplied) {
        Some(value) => value.to_owned(),
        None => non_blank_or(existing, fallback).to_owned(),
    }
}

/// Existing order first, then discovered versions, then the current version; case-insensitive dedup.
fn merge_versions(existing: &[String], discovered: &[String], current: Option<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    let candidates = existing
        .iter()
        .map(String::as_str)
        .chain(discovered.iter().map(String::as_str))
        .chain(current);
    for candidate in candidates {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            merged.push(trimmed.to_owned());
        }
    }
    merged
}

fn merge_policies(
    existing: &BTreeMap<String, PolicyAcceptanceRecord>,
    incoming: &BTreeMap<String, PolicyAcceptanceRecord>,
) -> BTreeMap<String, PolicyAcceptanceRecord> {
    let mut merged = BTreeMap::new();
    for (slug, record) in existing.iter().chain(incoming.iter()) {
        let key = slug.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        merged.insert(key, record.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn record(version: &str) -> PolicyAcceptanceRecord {
        PolicyAcceptanceRecord {
            version: version.into(),
            accepted_at_utc: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn fresh_config_uses_defaults() {
        let config = LauncherConfigBuilder::build_or_update(None, &LauncherConfigUpdate::installed("1.0.0"));
        assert_eq!(config.version_root, "app");
        assert_eq!(config.data_dir_name, "data");
        assert_eq!(config.windows_executable(), "MixItUp.exe");
        assert_eq!(config.versions, strings(&["1.0.0"]));
        assert_eq!(config.current_version.as_deref(), Some("1.0.0"));
        assert_eq!(config.retention_count, Some(3));
    }

    #[test]
    fn installing_appends_new_version_last() {
        let existing = LauncherConfigModel {
            current_version: Some("1.2.3".into()),
            versions: strings(&["1.0.0", "1.2.3"]),
            ..Default::default()
        };
        let config =
            LauncherConfigBuilder::build_or_update(Some(&existing), &LauncherConfigUpdate::installed("4.5.6"));
        assert_eq!(config.current_version.as_deref(), Some("4.5.6"));
        assert_eq!(config.versions, strings(&["1.0.0", "1.2.3", "4.5.6"]));
    }

    #[test]
    fn deduplicates_case_insensitively_and_drops_blanks() {
        let existing = LauncherConfigModel {
            versions: strings(&["1.0.0-Beta", " ", "2.0.0"]),
            ..Default::default()
        };
        let update = LauncherConfigUpdate::installed("2.0.0")
            .with_available(strings(&["1.0.0-beta", "2.0.0", "", "3.0.0"]));
        let config = LauncherConfigBuilder::build_or_update(Some(&existing), &update);
        assert_eq!(config.versions, strings(&["1.0.0-Beta", "2.0.0", "3.0.0"]));
    }

    #[test]
    fn prunes_versions_missing_from_disk() {
        let existing = LauncherConfigModel {
            current_version: Some("1.0.0".into()),
            versions: strings(&["0.9.0", "1.0.0"]),
            ..Default::default()
        };
        let update = LauncherConfigUpdate::installed("1.1.0").with_available(strings(&["1.0.0"]));
        let config = LauncherConfigBuilder::build_or_update(Some(&existing), &update);
        assert_eq!(config.versions, strings(&["1.0.0", "1.1.0"]));
    }

    #[test]
    fn current_version_is_always_listed() {
        let existing = LauncherConfigModel {
            current_version: Some("5.0.0".into()),
            ..Default::default()
        };
        let update = LauncherConfigUpdate::default().with_available(strings(&["4.0.0"]));
        let config = LauncherConfigBuilder::build_or_update(Some(&existing), &update);
        assert_eq!(config.current_version.as_deref(), Some("5.0.0"));
        assert!(config.versions.iter().any(|v| v == "5.0.0"));
    }

    #[test]
    fn building_twice_is_idempotent() {
        let existing = LauncherConfigModel {
            current_version: Some("1.0.0".into()),
            versions: strings(&["1.0.0", "1.0.0", "0.5.0"]),
            accepted_policies: BTreeMap::from([("EULA".to_string(), record("1"))]),
            ..Default::default()
        };
        let mut update = LauncherConfigUpdate::installed("2.0.0")
            .with_available(strings(&["0.5.0", "1.0.0", "2.0.0"]));
        update.accepted_policies.insert("privacy".into(), record("7"));

        let once = LauncherConfigBuilder::build_or_update(Some(&existing), &update);
        let twice = LauncherConfigBuilder::build_or_update(Some(&once), &update);
        assert_eq!(once.versions, twice.versions);
        assert_eq!(once.accepted_policies, twice.accepted_policies);
    }

    #[test]
    fn retention_prefers_explicit_then_existing() {
        let existing = LauncherConfigModel {
            retention_count: Some(5),
            ..Default::default()
        };
        let config = LauncherConfigBuilder::build_or_update(Some(&existing), &LauncherConfigUpdate::default());
        assert_eq!(config.retention_count, Some(5));

        let update = LauncherConfigUpdate {
            retention_count: Some(0),
            ..Default::default()
        };
        let config = LauncherConfigBuilder::build_or_update(Some(&existing), &update);
        assert_eq!(config.retention_count, Some(1));
    }

    #[test]
    fn new_policy_records_win_and_keys_are_normalized() {
        let existing = LauncherConfigModel {
            accepted_policies: BTreeMap::from([
                ("EULA".to_string(), record("1")),
                ("privacy".to_string(), record("3")),
            ]),
            ..Default::default()
        };
        let update = LauncherConfigUpdate {
            accepted_policies: BTreeMap::from([("eula".to_string(), record("2"))]),
            ..Default::default()
        };
        let config = LauncherConfigBuilder::build_or_update(Some(&existing), &update);
        assert_eq!(config.accepted_policies.len(), 2);
        assert_eq!(config.accepted_policies["eula"].version, "2");
        assert_eq!(config.accepted_policies["privacy"].version, "3");
    }

    #[test]
    fn keeps_extension_data_and_custom_names() {
        let mut existing = LauncherConfigModel {
            version_root: "versions".into(),
            ..Default::default()
        };
        existing.extension_data.insert("channelOverride".into(), Value::from("preview"));
        let update = LauncherConfigUpdate {
            executable_name: Some("MixItUp.Next.exe".into()),
            data_dir_name: Some("  ".into()),
            ..LauncherConfigUpdate::installed("1.0.0")
        };
        let config = LauncherConfigBuilder::build_or_update(Some(&existing), &update);
        assert_eq!(config.version_root, "versions");
        assert_eq!(config.data_dir_name, "data");
        assert_eq!(config.windows_executable(), "MixItUp.Next.exe");
        assert_eq!(config.extension_data["channelOverride"], "preview");
    }

    #[test]
    fn bootloader_builder_merges_without_pruning() {
        let existing = BootloaderConfigModel {
            current_version: Some("1.0.0".into()),
            versions: strings(&["0.9.0", "1.0.0"]),
            ..Default::default()
        };
        let update = BootloaderConfigUpdate {
            current_version: Some("2.0.0".into()),
            available_versions: strings(&["1.0.0", "2.0.0"]),
            ..Default::default()
        };
        let config = BootloaderConfigBuilder::build_or_update(Some(&existing), &update);
        assert_eq!(config.versions, strings(&["0.9.0", "1.0.0", "2.0.0"]));
        assert_eq!(config.current_version.as_deref(), Some("2.0.0"));
        assert_eq!(config.executables["windows"], "MixItUp.exe");

        let again = BootloaderConfigBuilder::build_or_update(Some(&config), &update);
        assert_eq!(again, config);
    }
}
