use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyContent {
    pub path: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub sha256: Option<String>,
    pub url: Option<String>,
}

/// Document served at `/policies/{slug}/latest`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyManifest {
    pub schema_version: Option<u32>,
    pub policy: String,
    pub version: String,
    pub published_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<PolicyContent>,
}

/// A published policy with its resolved content location.
#[derive(Clone, Debug)]
pub struct PolicyInfo {
    pub slug: String,
    pub version: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub content: PolicyContent,
    pub content_uri: reqwest::Url,
}

/// Acceptance status of one policy for the current run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyDocumentState {
    pub requested_slug: String,
    pub resolved_slug: String,
    pub title: String,
    pub version: String,
    pub markdown: String,
    pub accepted: bool,
}
