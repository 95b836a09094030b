//! Launcher orchestrator: resolve the installed version, keep it current and start it.

mod retention;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::config::{BootloaderConfigService, LauncherConfigBuilder, LauncherConfigService, LauncherConfigUpdate};
use crate::env;
use crate::error::{ConfigError, DistributionError, FilesystemErrorKind, Result, error_chain};
use crate::events::{EventSink, LauncherEvent};
use crate::models::{LauncherConfigModel, PolicyDocumentState, UpdatePackageInfo};
use crate::networking::DistributionClient;
use crate::package::{self, FetchedPackage};
use crate::policy;
use crate::process;
use crate::settings::DistributionSettings;
use crate::transaction::SwapTransaction;
use crate::userdata::{DataScope, copy_user_data};
use crate::util::{cancel_requested, remove_path};
use crate::version::{compare_versions, is_newer};

pub use retention::select_retained;

const PENDING_CONFIG_FILE: &str = "launcher.json.pending";

pub struct Launcher {
    app_root: PathBuf,
    settings: DistributionSettings,
    client: DistributionClient,
    events: EventSink<LauncherEvent>,
    cancel: Option<Arc<AtomicBool>>,
    log_path: Option<PathBuf>,
    config: LauncherConfigModel,
    policies: Vec<PolicyDocumentState>,
    available_update: Option<UpdatePackageInfo>,
    busy: bool,
}

impl Launcher {
    pub fn new(app_root: PathBuf, settings: DistributionSettings) -> Self {
        let client = DistributionClient::new(&settings.files_base).with_manifest_timeout(settings.manifest_timeout);
        Self {
            app_root,
            settings,
            client,
            events: EventSink::disabled(),
            cancel: None,
            log_path: None,
            config: LauncherConfigModel::default(),
            policies: Vec::new(),
            available_update: None,
            busy: false,
        }
    }

    pub fn with_events(mut self, events: EventSink<LauncherEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_log_path(mut self, log_path: Option<PathBuf>) -> Self {
        self.log_path = log_path;
        self
    }

    pub fn config(&self) -> &LauncherConfigModel {
        &self.config
    }

    pub fn policies(&self) -> &[PolicyDocumentState] {
        &self.policies
    }

    pub fn available_update(&self) -> Option<&UpdatePackageInfo> {
        self.available_update.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// `{appRoot}/{versionRoot}/{currentVersion}/{executable}` for the configured version.
    pub fn executable_path(&self) -> Option<PathBuf> {
        self.config.current_version().map(|version| {
            env::app_executable_path(
                &self.app_root,
                &self.config.version_root,
                version,
                self.config.windows_executable(),
            )
        })
    }

    /// Load `launcher.json`, falling back to `bootloader.json`, then reconcile the
    /// version list with what is actually on disk. Nothing is written here.
    pub fn load_config(&mut self) -> Result<()> {
        let launcher_path = env::launcher_config_path(&self.app_root);
        let loaded = match LauncherConfigService::load(&launcher_path) {
            Ok(config) => config,
            Err(err @ ConfigError::Parse { .. }) => {
                warn!("launcher: ignoring unreadable config: {err}");
                None
            }
            Err(err) => return Err(err.into()),
        };
        let base = match loaded {
            Some(config) => config,
            None => self.load_bootloader_config().unwrap_or_default(),
        };

        let version_root = env::version_root(&self.app_root, &base.version_root);
        let mut on_disk: Vec<String> = match package::scan_version_dirs(&version_root) {
            Ok(dirs) => dirs.into_iter().map(|dir| dir.name).collect(),
            Err(err) => {
                warn!("launcher: unable to list {}: {err}", version_root.display());
                Vec::new()
            }
        };
        on_disk.sort_by(|a, b| compare_versions(a, b));

        self.config = if on_disk.is_empty() {
            base
        } else {
            let current = base
                .current_version()
                .filter(|current| on_disk.iter().any(|v| v.eq_ignore_ascii_case(current)))
                .map(str::to_owned)
                .or_else(|| on_disk.last().cloned());
            if current.as_deref() != base.current_version() {
                warn!(
                    "launcher: configured version {:?} is missing, using {:?}",
                    base.current_version(),
                    current
                );
            }
            let update = LauncherConfigUpdate {
                current_version: current,
                available_versions: Some(on_disk),
                ..Default::default()
            };
            LauncherConfigBuilder::build_or_update(Some(&base), &update)
        };
        info!(
            "launcher: current version {:?}, versions {:?}",
            self.config.current_version(),
            self.config.versions
        );
        Ok(())
    }

    fn load_bootloader_config(&self) -> Option<LauncherConfigModel> {
        let path = env::bootloader_config_path(&self.app_root);
        match BootloaderConfigService::load(&path) {
            Ok(Some(boot)) => {
                info!("launcher: using {}", path.display());
                Some(LauncherConfigModel::from(&boot))
            }
            Ok(None) => None,
            Err(err) => {
                warn!("launcher: ignoring bootloader config: {err}");
                None
            }
        }
    }

    /// Load the config, resolve policies and look for an update. An unreachable update
    /// server is only fatal when there is nothing installed to fall back on.
    pub async fn initialize(&mut self) -> Result<()> {
        self.set_busy(true);
        let result = self.initialize_inner().await;
        self.set_busy(false);
        if let Err(err) = &result {
            error!("launcher: initialization failed: {}", error_chain(err));
            self.fail(err.user_message(self.log_path.as_deref()));
        }
        self.emit_ready();
        result
    }

    async fn initialize_inner(&mut self) -> Result<()> {
        self.status("Loading configuration...");
        self.load_config()?;
        self.refresh_policies().await;

        self.status("Checking for updates...");
        match self.check_for_updates().await {
            Ok(_) => Ok(()),
            Err(err) if self.has_executable() => {
                warn!("launcher: update check failed, starting installed version: {}", error_chain(&err));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn refresh_policies(&mut self) {
        self.policies =
            policy::refresh_policies(&self.client, &self.settings.required_policies, Some(&self.config)).await;
        self.events.emit(LauncherEvent::Policies(self.policies.clone()));
    }

    /// Ask the server for the latest app package and remember it when it is newer than
    /// the installed version, or when the installed executable is missing.
    pub async fn check_for_updates(&mut self) -> Result<Option<UpdatePackageInfo>> {
        let info = self
            .client
            .get_latest_package(&self.settings.app_product, &self.settings.platform, self.settings.channel)
            .await?;
        let needed = match self.config.current_version() {
            Some(current) => is_newer(&info.version, current) || !self.has_executable(),
            None => true,
        };
        if needed {
            info!(
                "launcher: update available {} (installed {:?})",
                info.version,
                self.config.current_version()
            );
            self.events.emit(LauncherEvent::UpdateAvailable {
                version: info.version.clone(),
            });
            self.available_update = Some(info.clone());
            Ok(Some(info))
        } else {
            debug!("launcher: {} is up to date", info.version);
            self.available_update = None;
            Ok(None)
        }
    }

    /// Download, verify and apply the pending update. Returns the installed version,
    /// or `None` when there was nothing to install.
    pub async fn install_update(&mut self) -> Result<Option<String>> {
        let Some(info) = self.available_update.clone() else {
            return Ok(None);
        };
        self.set_busy(true);
        let result = self.download_and_apply(&info).await;
        self.set_busy(false);
        if result.is_ok() {
            self.available_update = None;
            self.status(&format!("Mix It Up {} is ready.", info.version));
        }
        self.emit_ready();
        result.map(Some)
    }

    async fn download_and_apply(&mut self, info: &UpdatePackageInfo) -> Result<String> {
        self.status(&format!("Downloading Mix It Up {}...", info.version));
        let fetched = match self.fetch(&info.version).await {
            Ok(fetched) => fetched,
            Err(err) => {
                error!("launcher: download failed: {}", error_chain(&err));
                self.fail(err.user_message(self.log_path.as_deref()));
                return Err(err);
            }
        };
        if cancel_requested(&self.cancel) {
            self.fail(DistributionError::Cancelled.user_message(None));
            return Err(DistributionError::Cancelled);
        }
        let version = fetched.info.version.clone();
        self.apply_update(&version, &fetched.bytes)?;
        Ok(version)
    }

    async fn fetch(&self, version: &str) -> Result<FetchedPackage> {
        let sink = self.events.clone();
        let label = format!("Downloading Mix It Up {version}");
        let mut on_progress = move |percent: f32| {
            sink.emit(LauncherEvent::Progress {
                label: label.clone(),
                percent: Some(percent),
            })
        };
        package::fetch_verified(
            &self.client,
            &self.settings,
            &self.settings.app_product,
            &self.app_root,
            Some(&mut on_progress),
            self.cancel.clone(),
        )
        .await
    }

    /// Install `bytes` as `version` in one transaction: swap the version directory in,
    /// carry user data over, prune old versions and rewrite `launcher.json`. Backups are
    /// deleted only after the config write succeeded; any failure restores everything.
    pub fn apply_update(&mut self, version: &str, bytes: &[u8]) -> Result<()> {
        let version_root = env::version_root(&self.app_root, &self.config.version_root);
        let target = match package::version_dir_for(&version_root, version) {
            Ok(target) => target,
            Err(err) => {
                error!("launcher: refusing update: {err}");
                self.fail(err.user_message(self.log_path.as_deref()));
                return Err(err);
            }
        };
        let temp = env::temp_dir(&self.app_root);
        let staging = temp.join(format!("app-{version}"));
        let pending_config = temp.join(PENDING_CONFIG_FILE);

        let mut txn = SwapTransaction::new(format!("update {version}"));
        let result = self.swap_in(&mut txn, version, bytes, &target, &staging, &pending_config);
        if let Err(err) = remove_path(&temp) {
            warn!("launcher: unable to remove {}: {err}", temp.display());
        }

        match result {
            Ok(config) => {
                txn.commit();
                self.config = config;
                info!("launcher: Mix It Up {version} installed");
                Ok(())
            }
            Err(err) => {
                error!("launcher: update to {version} failed: {}", error_chain(&err));
                let mut message = err.user_message(self.log_path.as_deref());
                match txn.rollback() {
                    Ok(()) => message.push_str(" Previous version restored."),
                    Err(rollback_err) => error!("launcher: {rollback_err}"),
                }
                self.fail(message);
                Err(err)
            }
        }
    }

    fn swap_in(
        &self,
        txn: &mut SwapTransaction,
        version: &str,
        bytes: &[u8],
        target: &Path,
        staging: &Path,
        pending_config: &Path,
    ) -> Result<LauncherConfigModel> {
        let version_root = env::version_root(&self.app_root, &self.config.version_root);
        let data_dir = env::non_blank_or(&self.config.data_dir_name, env::DATA_DIR).to_owned();
        let executable = self.config.windows_executable().to_owned();

        if let Some(parent) = staging.parent() {
            fs::create_dir_all(parent).map_err(|e| DistributionError::io("unable to create temp folder", parent, e))?;
        }
        let sink = self.events.clone();
        let mut on_extract = move |percent: f32| {
            sink.emit(LauncherEvent::Progress {
                label: "Extracting".into(),
                percent: Some(percent),
            })
        };
        let extracted = package::stage_archive(bytes, staging, Some(&mut on_extract))?;
        debug!("launcher: staged {extracted} entries");

        // Reinstalling the same version keeps all of its data; upgrades take the allow-list.
        let (data_source, scope) = if target.is_dir() {
            (Some(target.join(&data_dir)), DataScope::Everything)
        } else {
            let previous = self
                .config
                .current_version()
                .map(|current| version_root.join(current).join(&data_dir));
            (previous, DataScope::AllowListed)
        };
        if let Some(source) = data_source {
            copy_user_data(&source, &staging.join(&data_dir), scope)?;
        }

        txn.replace(staging, target)?;
        if !package::has_executable(target, &executable) {
            return Err(DistributionError::filesystem(
                FilesystemErrorKind::CorruptPackage,
                Some(target),
                "package does not contain an executable",
            ));
        }
        let data_path = target.join(&data_dir);
        fs::create_dir_all(&data_path).map_err(|e| DistributionError::io("unable to create data folder", &data_path, e))?;

        let retention = self.config.retention_count.unwrap_or(self.settings.retention_count).max(1);
        let dirs = package::scan_version_dirs(&version_root)
            .map_err(|e| DistributionError::io("unable to list installed versions", &version_root, e))?;
        let (kept, pruned) = select_retained(dirs, version, retention);
        for dir in &pruned {
            info!("launcher: pruning version {}", dir.name);
            txn.set_aside(&dir.path)?;
        }
        let mut available: Vec<String> = kept.into_iter().map(|dir| dir.name).collect();
        available.sort_by(|a, b| compare_versions(a, b));

        let update = LauncherConfigUpdate {
            current_version: Some(version.to_owned()),
            available_versions: Some(available),
            retention_count: Some(retention),
            ..Default::default()
        };
        let config = LauncherConfigBuilder::build_or_update(Some(&self.config), &update);
        LauncherConfigService::save(pending_config, &config)?;
        txn.replace(pending_config, &env::launcher_config_path(&self.app_root))?;
        Ok(config)
    }

    /// Record acceptance of every listed policy version and persist it.
    pub fn accept_policies(&mut self) -> Result<()> {
        let records = policy::acceptance_records(&self.policies, Utc::now());
        if records.is_empty() {
            return Ok(());
        }
        let update = LauncherConfigUpdate {
            accepted_policies: records,
            ..Default::default()
        };
        let config = LauncherConfigBuilder::build_or_update(Some(&self.config), &update);
        LauncherConfigService::save(&env::launcher_config_path(&self.app_root), &config)?;
        self.config = config;
        for state in &mut self.policies {
            if !state.version.trim().is_empty() {
                state.accepted = true;
            }
        }
        info!("launcher: policies accepted");
        self.events.emit(LauncherEvent::Policies(self.policies.clone()));
        self.emit_ready();
        Ok(())
    }

    pub fn can_launch(&self) -> bool {
        !self.busy && self.has_executable() && policy::all_accepted(&self.policies)
    }

    /// Start the installed version detached from the launcher.
    pub fn launch(&self) -> Result<u32> {
        if self.busy {
            return Err(DistributionError::precondition("Please wait for the update to finish."));
        }
        if !policy::all_accepted(&self.policies) {
            return Err(DistributionError::precondition(
                "Please accept the updated policies before starting Mix It Up.",
            ));
        }
        let executable = self
            .executable_path()
            .filter(|path| path.is_file())
            .ok_or_else(|| DistributionError::precondition("Mix It Up is not installed. Please run the installer."))?;
        let working_dir = executable.parent().unwrap_or(&self.app_root);
        process::spawn_detached(&executable, working_dir, &[])
    }

    fn has_executable(&self) -> bool {
        self.executable_path().is_some_and(|path| path.is_file())
    }

    fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
        self.events.emit(LauncherEvent::Busy(busy));
    }

    fn emit_ready(&self) {
        self.events.emit(LauncherEvent::Ready {
            executable: self.executable_path().filter(|path| path.is_file()),
            can_launch: self.can_launch(),
        });
    }

    fn status(&self, message: &str) {
        info!("launcher: {message}");
        self.events.emit(LauncherEvent::Status(message.to_owned()));
    }

    fn fail(&self, message: String) {
        self.events.emit(LauncherEvent::Failed {
            message,
            log_path: self.log_path.clone(),
        });
    }
}
