use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

pub const DEFAULT_FILES_BASE: &str = "https://files.mixitupapp.com";
pub const APP_PRODUCT_SLUG: &str = "mixitup-desktop";
pub const LAUNCHER_PRODUCT_SLUG: &str = "mixitup-launcher";
pub const DEFAULT_PLATFORM: &str = "windows-x64";
pub const DEFAULT_RETENTION_COUNT: u32 = 3;
pub const REQUIRED_POLICIES: [&str; 2] = ["eula", "privacy"];

/// Release track a build follows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Channel {
    #[default]
    Production,
    Preview,
    Test,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Production => "production",
            Channel::Preview => "preview",
            Channel::Test => "test",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" | "release" => Ok(Channel::Production),
            "preview" | "beta" => Ok(Channel::Preview),
            "test" => Ok(Channel::Test),
            other => Err(format!("unknown channel '{other}'")),
        }
    }
}

/// What to do when a manifest does not declare a checksum for its download.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChecksumPolicy {
    /// Verify when a checksum is declared; warn and continue otherwise.
    #[default]
    VerifyWhenPresent,
    /// Refuse any download without a declared checksum.
    Required,
}

/// Runtime knobs shared by the installer, launcher and uninstaller.
#[derive(Clone, Debug)]
pub struct DistributionSettings {
    pub files_base: String,
    pub app_product: String,
    pub launcher_product: String,
    pub platform: String,
    pub channel: Channel,
    pub checksum_policy: ChecksumPolicy,
    pub manifest_timeout: Duration,
    pub download_timeout: Duration,
    pub required_policies: Vec<String>,
    pub retention_count: u32,
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            files_base: DEFAULT_FILES_BASE.into(),
            app_product: APP_PRODUCT_SLUG.into(),
            launcher_product: LAUNCHER_PRODUCT_SLUG.into(),
            platform: DEFAULT_PLATFORM.into(),
            channel: Channel::default(),
            checksum_policy: ChecksumPolicy::default(),
            manifest_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(30 * 60),
            required_policies: REQUIRED_POLICIES.iter().map(|s| (*s).to_owned()).collect(),
            retention_count: DEFAULT_RETENTION_COUNT,
        }
    }
}

impl DistributionSettings {
    /// Defaults overlaid with `MIXITUP_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(base) = lookup("MIXITUP_FILES_BASE").filter(|v| !v.trim().is_empty()) {
            self.files_base = base.trim().to_owned();
        }
        if let Some(channel) = lookup("MIXITUP_CHANNEL") {
            match channel.parse() {
                Ok(parsed) => self.channel = parsed,
                Err(err) => warn!("settings: ignoring MIXITUP_CHANNEL ({err})"),
            }
        }
        if let Some(strict) = lookup("MIXITUP_STRICT_CHECKSUMS")
            && matches!(strict.trim(), "1" | "true" | "yes")
        {
            self.checksum_policy = ChecksumPolicy::Required;
        }
        self
    }

    /// Apply CLI flags on top of the environment-derived values.
    pub fn apply_cli(mut self, files_base: Option<String>, channel: Option<Channel>, strict_checksums: bool) -> Self {
        if let Some(base) = files_base.filter(|v| !v.trim().is_empty()) {
            self.files_base = base;
        }
        if let Some(channel) = channel {
            self.channel = channel;
        }
        if strict_checksums {
            self.checksum_policy = ChecksumPolicy::Required;
        }
        self
    }
}
