use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

use crate::error::{DistributionError, Result};
use crate::models::{PolicyInfo, PolicyManifest, UpdateManifest, UpdatePackageInfo};
use crate::settings::{Channel, DEFAULT_FILES_BASE};
use crate::util::{cancel_requested, progress_percent};

const USER_AGENT: &str = concat!("MixItUp-Distribution/", env!("CARGO_PKG_VERSION"));

/// Receives download progress in percent (0-100). Not called while the total size is unknown.
pub type ProgressCallback<'a> = Option<&'a mut (dyn FnMut(f32) + Send)>;

/// HTTP boundary for manifests, policies and package downloads.
#[derive(Clone, Debug)]
pub struct DistributionClient {
    client: Client,
    files_base: String,
    manifest_timeout: Duration,
}

impl Default for DistributionClient {
    fn default() -> Self {
        Self::new(DEFAULT_FILES_BASE)
    }
}

impl DistributionClient {
    pub fn new(files_base: &str) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|err| {
                warn!("distribution client: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        let trimmed = files_base.trim().trim_end_matches('/');
        let files_base = if trimmed.is_empty() {
            DEFAULT_FILES_BASE.to_owned()
        } else {
            trimmed.to_owned()
        };
        Self {
            client,
            files_base,
            manifest_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_manifest_timeout(mut self, timeout: Duration) -> Self {
        self.manifest_timeout = timeout;
        self
    }

    pub fn files_base(&self) -> &str {
        &self.files_base
    }

    /// `{filesBase}/apps/{slug}/{platform}/{channel}/latest`
    pub fn build_manifest_url(&self, product_slug: &str, platform: &str, channel: Channel) -> String {
        format!(
            "{}/apps/{}/{}/{}/latest",
            self.files_base,
            product_slug.trim(),
            platform.trim(),
            channel.as_str()
        )
    }

    pub fn build_policy_manifest_url(&self, policy_slug: &str) -> String {
        format!("{}/policies/{}/latest", self.files_base, policy_slug.trim())
    }

    pub fn build_policy_content_url(&self, policy_slug: &str, version: &str) -> String {
        format!(
            "{}/policies/{}/version/{}/content",
            self.files_base,
            policy_slug.trim(),
            version.trim()
        )
    }

    /// Resolve a manifest file location: absolute URLs pass through, anything else is
    /// taken relative to the files base. Returns `None` if neither resolves.
    pub fn build_download_uri(&self, location: &str) -> Option<Url> {
        let location = location.trim();
        if location.is_empty() {
            return None;
        }
        if let Ok(absolute) = Url::parse(location)
            && matches!(absolute.scheme(), "http" | "https")
        {
            return Some(absolute);
        }
        let base = Url::parse(&format!("{}/", self.files_base)).ok()?;
        base.join(location.trim_start_matches('/')).ok()
    }

    /// Fetch the latest manifest for a product and resolve its downloadable artifact.
    pub async fn get_latest_package(
        &self,
        product_slug: &str,
        platform: &str,
        channel: Channel,
    ) -> Result<UpdatePackageInfo> {
        let endpoint = self.build_manifest_url(product_slug, platform, channel);
        info!("distribution client: resolving manifest {endpoint}");
        let manifest: UpdateManifest = self.get_json(&endpoint).await?;

        let version = manifest.version.trim();
        if version.is_empty() {
            return Err(DistributionError::transport(&endpoint, None, "manifest does not declare a version"));
        }
        let entry = manifest.platform(platform).ok_or_else(|| {
            DistributionError::transport(&endpoint, None, format!("manifest has no entry for platform '{platform}'"))
        })?;
        let file = entry.select_download().ok_or_else(|| {
            DistributionError::transport(&endpoint, None, format!("no downloadable file for platform '{platform}'"))
        })?;
        let download_uri = self.build_download_uri(&file.url).ok_or_else(|| {
            DistributionError::transport(&endpoint, None, format!("unable to resolve download URL '{}'", file.url))
        })?;

        debug!(
            "distribution client: {} {} -> {} ({:?} bytes)",
            product_slug, version, download_uri, file.size
        );
        Ok(UpdatePackageInfo {
            product: if manifest.product.trim().is_empty() {
                product_slug.to_owned()
            } else {
                manifest.product.clone()
            },
            version: version.to_owned(),
            channel: if manifest.channel.trim().is_empty() {
                channel.as_str().to_owned()
            } else {
                manifest.channel.clone()
            },
            platform: entry.platform.clone(),
            file_name: file.name.clone(),
            size: file.size,
            sha256: file
                .sha256
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_ascii_lowercase),
            content_type: file.content_type.clone(),
            arch: file.arch.clone(),
            download_uri,
            released_at: manifest.released_at,
            release_notes: manifest.release_notes.clone(),
        })
    }

    /// Stream a package into memory.
    pub async fn download_package(
        &self,
        uri: &Url,
        timeout: Duration,
        mut progress: ProgressCallback<'_>,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<Vec<u8>> {
        let endpoint = uri.to_string();
        let download = self.stream_body(uri, &mut progress, &cancel);
        match tokio::time::timeout(timeout, download).await {
            Ok(result) => result,
            Err(_) => Err(DistributionError::transport(
                endpoint,
                None,
                format!("download timed out after {}s", timeout.as_secs()),
            )),
        }
    }

    async fn stream_body(
        &self,
        uri: &Url,
        progress: &mut ProgressCallback<'_>,
        cancel: &Option<Arc<AtomicBool>>,
    ) -> Result<Vec<u8>> {
        let endpoint = uri.to_string();
        if cancel_requested(cancel) {
            return Err(DistributionError::Cancelled);
        }
        let response = self
            .client
            .get(uri.clone())
            .send()
            .await
            .map_err(|e| DistributionError::transport(&endpoint, None, format!("download request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DistributionError::transport(
                &endpoint,
                Some(status.as_u16()),
                "download returned an error status",
            ));
        }

        let total = response.content_length();
        let mut buffer = Vec::with_capacity(total.unwrap_or(0).min(512 * 1024 * 1024) as usize);
        let mut stream = response.bytes_stream();
        let mut last_reported = -1.0f32;
        report(progress, progress_percent(0, total), &mut last_reported);

        while let Some(chunk) = stream.next().await {
            if cancel_requested(cancel) {
                warn!("distribution client: download of {endpoint} cancelled");
                return Err(DistributionError::Cancelled);
            }
            let chunk = chunk.map_err(|e| DistributionError::transport(&endpoint, None, format!("stream error: {e}")))?;
            buffer.extend_from_slice(&chunk);
            report(progress, progress_percent(buffer.len() as u64, total), &mut last_reported);
        }

        if let Some(total) = total
            && (buffer.len() as u64) < total
        {
            return Err(DistributionError::transport(
                &endpoint,
                None,
                format!("download incomplete: received {} of {} bytes", buffer.len(), total),
            ));
        }
        info!("distribution client: downloaded {} bytes from {endpoint}", buffer.len());
        Ok(buffer)
    }

    /// Fetch the latest published version of a policy document.
    pub async fn get_latest_policy(&self, policy_slug: &str) -> Result<PolicyInfo> {
        let endpoint = self.build_policy_manifest_url(policy_slug);
        let manifest: PolicyManifest = self.get_json(&endpoint).await?;
        let version = manifest.version.trim();
        if version.is_empty() {
            return Err(DistributionError::transport(&endpoint, None, "policy manifest does not declare a version"));
        }
        let slug = if manifest.policy.trim().is_empty() {
            policy_slug.trim().to_owned()
        } else {
            manifest.policy.trim().to_owned()
        };
        let content = manifest.content.clone().unwrap_or_default();
        let content_uri = content
            .url
            .as_deref()
            .and_then(|url| self.build_download_uri(url))
            .or_else(|| Url::parse(&self.build_policy_content_url(&slug, version)).ok())
            .ok_or_else(|| DistributionError::transport(&endpoint, None, "policy content location is not resolvable"))?;

        Ok(PolicyInfo {
            title: manifest
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| slug.clone()),
            slug,
            version: version.to_owned(),
            description: manifest.description.clone(),
            published_at: manifest.published_at,
            content,
            content_uri,
        })
    }

    /// Download the markdown body of a specific policy version.
    pub async fn download_policy_content(&self, policy_slug: &str, version: &str) -> Result<String> {
        let endpoint = self.build_policy_content_url(policy_slug, version);
        let uri = Url::parse(&endpoint)
            .map_err(|e| DistributionError::transport(&endpoint, None, format!("invalid policy URL: {e}")))?;
        self.get_text(&uri).await
    }

    /// Download the markdown body at the location resolved from a policy manifest.
    pub async fn download_policy(&self, policy: &PolicyInfo) -> Result<String> {
        self.get_text(&policy.content_uri).await
    }

    async fn get_text(&self, uri: &Url) -> Result<String> {
        let endpoint = uri.to_string();
        let response = self
            .client
            .get(uri.clone())
            .timeout(self.manifest_timeout)
            .send()
            .await
            .map_err(|e| DistributionError::transport(&endpoint, None, format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DistributionError::transport(
                &endpoint,
                Some(status.as_u16()),
                "server returned an error status",
            ));
        }
        response
            .text()
            .await
            .map_err(|e| DistributionError::transport(&endpoint, Some(status.as_u16()), format!("body error: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let uri = Url::parse(endpoint)
            .map_err(|e| DistributionError::transport(endpoint, None, format!("invalid URL: {e}")))?;
        let body = self.get_text(&uri).await?;
        if body.trim().is_empty() {
            return Err(DistributionError::transport(endpoint, None, "empty response body"));
        }
        serde_json::from_str(&body)
            .map_err(|e| DistributionError::transport(endpoint, None, format!("unparsable response: {e}")))
    }
}

fn report(progress: &mut ProgressCallback<'_>, percent: Option<f32>, last: &mut f32) {
    let Some(percent) = percent else {
        return;
    };
    // Only forward whole-percent changes.
    if percent.floor() > *last || (percent >= 100.0 && *last < 100.0) {
        *last = percent.floor();
        if let Some(callback) = progress.as_deref_mut() {
            callback(percent);
        }
    }
}
