//! Pieces shared by the three binaries: common flags and terminal progress.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;

use crate::settings::{Channel, DistributionSettings};

#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Release channel to follow.
    #[arg(long, value_enum)]
    pub channel: Option<Channel>,
    /// Base URL of the distribution server.
    #[arg(long)]
    pub files_base: Option<String>,
    /// Fail when a manifest does not declare a SHA-256 for its download.
    #[arg(long)]
    pub strict_checksums: bool,
}

impl SourceArgs {
    /// Environment-derived settings with these flags applied on top.
    pub fn settings(&self) -> DistributionSettings {
        DistributionSettings::from_env().apply_cli(self.files_base.clone(), self.channel, self.strict_checksums)
    }
}

/// One progress bar reused for every download or extraction phase.
pub struct ProgressView {
    bar: ProgressBar,
    label: String,
}

impl ProgressView {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            bar,
            label: String::new(),
        }
    }

    pub fn status(&self, message: &str) {
        self.bar.set_message(message.to_owned());
    }

    /// Show `percent` for `label`; `None` switches to a spinner.
    pub fn progress(&mut self, label: &str, percent: Option<f32>) {
        if self.label != label {
            self.label = label.to_owned();
            self.bar.set_position(0);
        }
        match percent {
            Some(percent) => {
                self.bar.set_length(100);
                if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}%") {
                    self.bar.set_style(style.progress_chars("=> "));
                }
                self.bar.set_position(percent.clamp(0.0, 100.0).round() as u64);
            }
            None => {
                self.bar.set_style(ProgressStyle::default_spinner());
            }
        }
        self.bar.set_message(label.to_owned());
    }

    pub fn println(&self, line: &str) {
        self.bar.println(line);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressView {
    fn default() -> Self {
        Self::new()
    }
}

/// Open the log file in the user's viewer after a failure.
pub fn reveal_log(log_path: Option<&PathBuf>) {
    if let Some(path) = log_path
        && let Err(err) = open::that(path)
    {
        warn!("unable to open {}: {err}", path.display());
    }
}
