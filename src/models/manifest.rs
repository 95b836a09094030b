use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

pub const ZIP_CONTENT_TYPE: &str = "application/zip";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManifestFile {
    pub name: String,
    pub url: String,
    pub size: Option<u64>,
    pub sha256: Option<String>,
    pub content_type: Option<String>,
    pub arch: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformEntry {
    pub platform: String,
    pub files: Vec<ManifestFile>,
}

/// Latest-release document served at `/apps/{product}/{platform}/{channel}/latest`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateManifest {
    pub schema_version: Option<u32>,
    pub product: String,
    pub channel: String,
    pub version: String,
    pub released_at: Option<DateTime<Utc>>,
    pub release_type: Option<String>,
    pub release_notes: Option<String>,
    pub platforms: Vec<PlatformEntry>,
}

impl UpdateManifest {
    pub fn platform(&self, platform: &str) -> Option<&PlatformEntry> {
        self.platforms
            .iter()
            .find(|entry| entry.platform.eq_ignore_ascii_case(platform))
    }
}

impl PlatformEntry {
    /// The downloadable artifact: a zip entry when present, otherwise the first file with a URL.
    pub fn select_download(&self) -> Option<&ManifestFile> {
        self.files
            .iter()
            .find(|file| {
                !file.url.trim().is_empty()
                    && file
                        .content_type
                        .as_deref()
                        .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(ZIP_CONTENT_TYPE))
            })
            .or_else(|| self.files.iter().find(|file| !file.url.trim().is_empty()))
    }
}

/// Resolved view of one downloadable package. Never persisted.
#[derive(Clone, Debug)]
pub struct UpdatePackageInfo {
    pub product: String,
    pub version: String,
    pub channel: String,
    pub platform: String,
    pub file_name: String,
    pub size: Option<u64>,
    pub sha256: Option<String>,
    pub content_type: Option<String>,
    pub arch: Option<String>,
    pub download_uri: Url,
    pub released_at: Option<DateTime<Utc>>,
    pub release_notes: Option<String>,
}
