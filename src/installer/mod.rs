//! Installer orchestrator: a strictly ordered run of [`InstallerStep`]s.

mod discovery;
mod migrate;
mod steps;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use log::{debug, error, info, warn};

use crate::config::{
    BootloaderConfigBuilder, BootloaderConfigService, BootloaderConfigUpdate, LauncherConfigBuilder,
    LauncherConfigService, LauncherConfigUpdate,
};
use crate::env;
use crate::error::{DistributionError, FilesystemErrorKind, Result, error_chain};
use crate::events::{EventSink, InstallerEvent};
use crate::host::{EnvironmentRequirements, HostServices, UninstallEntry, disk, processes, registry, shortcuts, write_probe};
use crate::networking::DistributionClient;
use crate::package::{self, FetchedPackage, VersionDir};
use crate::settings::DistributionSettings;
use crate::userdata::{DataScope, copy_user_data};
use crate::util::remove_path;
use crate::version::compare_versions;

pub use discovery::{Discovery, discover, normalize_root};
pub use migrate::{MigrationReport, MigrationSource, allocate_staging, migrate};
pub use steps::{InstallerStep, StepState, StepTable};

/// Result of a successful installation.
#[derive(Clone, Debug)]
pub struct InstallOutcome {
    pub app_root: PathBuf,
    pub version: String,
    pub launcher_path: PathBuf,
    pub executable_path: PathBuf,
    pub is_update: bool,
}

/// Facts gathered by earlier steps and consumed by later ones.
#[derive(Default)]
struct RunState {
    discovery: Option<Discovery>,
    migration: Option<MigrationReport>,
    launcher_package: Option<FetchedPackage>,
    app_package: Option<FetchedPackage>,
    version: Option<String>,
    version_dir: Option<PathBuf>,
    previous_version: Option<VersionDir>,
}

pub struct Installer {
    app_root: PathBuf,
    settings: DistributionSettings,
    client: DistributionClient,
    host: HostServices,
    events: EventSink<InstallerEvent>,
    cancel: Option<Arc<AtomicBool>>,
    log_path: Option<PathBuf>,
    steps: StepTable,
    state: RunState,
}

impl Installer {
    pub fn new(app_root: PathBuf, settings: DistributionSettings, host: HostServices) -> Self {
        let client = DistributionClient::new(&settings.files_base).with_manifest_timeout(settings.manifest_timeout);
        Self {
            app_root,
            settings,
            client,
            host,
            events: EventSink::disabled(),
            cancel: None,
            log_path: None,
            steps: StepTable::new(),
            state: RunState::default(),
        }
    }

    pub fn with_events(mut self, events: EventSink<InstallerEvent>) -> Self {
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

    pub fn steps(&self) -> &StepTable {
        &self.steps
    }

    /// Run every step once, stopping at the first failure. `.tmp` is removed either way.
    pub async fn run(&mut self) -> Result<InstallOutcome> {
        info!("installer: installing into {}", self.app_root.display());
        let result = self.run_steps().await;
        self.cleanup_temp();

        match &result {
            Ok(outcome) => {
                let message = if outcome.is_update {
                    format!("Mix It Up {} has been updated.", outcome.version)
                } else {
                    format!("Mix It Up {} has been installed.", outcome.version)
                };
                info!("installer: {message}");
                self.events.emit(InstallerEvent::Finished {
                    success: true,
                    message,
                    log_path: self.log_path.clone(),
                });
            }
            Err(err) => {
                self.events.emit(InstallerEvent::Finished {
                    success: false,
                    message: err.user_message(self.log_path.as_deref()),
                    log_path: self.log_path.clone(),
                });
            }
        }
        result
    }

    async fn run_steps(&mut self) -> Result<InstallOutcome> {
        for step in InstallerStep::ALL {
            self.steps.start(step)?;
            self.emit_step(step);
            debug!("installer: step '{step}' started");

            if let Err(err) = self.execute(step).await {
                error!("installer: step '{step}' failed: {}", error_chain(&err));
                if matches!(err, DistributionError::State { .. }) {
                    error!("installer: {err:?}");
                }
                self.steps.fail(step, err.user_message(self.log_path.as_deref()))?;
                self.emit_step(step);
                return Err(err);
            }

            self.steps.complete(step)?;
            self.emit_step(step);
        }
        self.outcome()
    }

    async fn execute(&mut self, step: InstallerStep) -> Result<()> {
        match step {
            InstallerStep::Preflight => self.preflight(),
            InstallerStep::Discover => self.discover(),
            InstallerStep::CloseProcesses => self.close_processes().await,
            InstallerStep::Migrate => self.migrate(),
            InstallerStep::LauncherFetch => {
                let product = self.settings.launcher_product.clone();
                let fetched = self.fetch(&product, "Downloading launcher").await?;
                self.state.launcher_package = Some(fetched);
                Ok(())
            }
            InstallerStep::LauncherInstall => self.install_launcher(),
            InstallerStep::AppFetch => {
                let product = self.settings.app_product.clone();
                let fetched = self.fetch(&product, "Downloading Mix It Up").await?;
                self.state.app_package = Some(fetched);
                Ok(())
            }
            InstallerStep::AppExtract => self.install_app(),
            InstallerStep::DataCopy => self.copy_data(),
            InstallerStep::ConfigWrite => self.write_config(),
            InstallerStep::Register => self.register(),
            InstallerStep::Shortcuts => self.create_shortcuts(),
            InstallerStep::Complete => {
                self.remove_migration_staging();
                self.status("Installation complete.");
                Ok(())
            }
        }
    }

    fn preflight(&mut self) -> Result<()> {
        let environment = &self.host.environment;
        if !EnvironmentRequirements::is_windows_10_or_11(environment.os.as_ref()) {
            return Err(DistributionError::precondition(
                "Mix It Up requires Windows 10 or later.",
            ));
        }
        if !environment.is_64bit {
            return Err(DistributionError::precondition(
                "Mix It Up requires a 64-bit version of Windows.",
            ));
        }

        self.app_root = normalize_root(&self.app_root)?;
        write_probe::probe_write_access(&self.app_root)?;

        let mut writable = 0;
        for (label, dir) in [
            ("Start Menu", environment.start_menu_dir.as_deref()),
            ("Desktop", environment.desktop_dir.as_deref()),
        ] {
            match dir.map(write_probe::probe_write_access) {
                Some(Ok(())) => writable += 1,
                Some(Err(err)) => warn!("installer: {label} is not writable: {err}"),
                None => warn!("installer: no {label} folder found"),
            }
        }
        if writable == 0 {
            return Err(DistributionError::filesystem(
                FilesystemErrorKind::PermissionDenied,
                None,
                "unable to write to the Start Menu or the Desktop",
            ));
        }
        Ok(())
    }

    fn discover(&mut self) -> Result<()> {
        let installer_dir = self.host.environment.current_exe_dir.clone();
        let found = discover(&self.app_root, installer_dir.as_deref())?;
        self.app_root = found.app_root.clone();

        let temp = env::temp_dir(&self.app_root);
        remove_path(&temp).map_err(|e| DistributionError::io("unable to clear temp folder", &temp, e))?;
        fs::create_dir_all(&temp).map_err(|e| DistributionError::io("unable to create temp folder", &temp, e))?;

        if found.is_update {
            self.status("Updating existing installation.");
        }
        self.state.discovery = Some(found);
        Ok(())
    }

    async fn close_processes(&mut self) -> Result<()> {
        let result = processes::close_processes(
            self.host.processes.as_ref(),
            &self.host.process_names,
            self.host.process_tick,
        )
        .await;
        result.map_err(|remaining| {
            DistributionError::precondition(format!(
                "Please close {} and run the installer again.",
                remaining.join(", ")
            ))
        })
    }

    fn migrate(&mut self) -> Result<()> {
        let discovery = self.discovery()?;
        if !discovery.needs_migration() {
            debug!("installer: no migration needed");
            return Ok(());
        }

        let version_root = discovery.version_root();
        let mut exclude = vec![
            version_root.clone(),
            env::temp_dir(&discovery.app_root),
            env::logs_dir(&discovery.app_root),
        ];
        exclude.extend(self.host.environment.current_exe.clone());

        let report = match discovery.portable_source.as_deref() {
            Some(portable) => migrate(MigrationSource::Portable(portable), &version_root, &exclude)?,
            None => migrate(MigrationSource::Legacy(&discovery.app_root), &version_root, &exclude)?,
        };
        self.state.migration = Some(report);
        Ok(())
    }

    async fn fetch(&self, product: &str, label: &str) -> Result<FetchedPackage> {
        let sink = self.events.clone();
        let label = label.to_owned();
        sink.emit(InstallerEvent::Progress {
            label: label.clone(),
            percent: None,
        });
        let mut on_progress = move |percent: f32| {
            sink.emit(InstallerEvent::Progress {
                label: label.clone(),
                percent: Some(percent),
            })
        };
        package::fetch_verified(
            &self.client,
            &self.settings,
            product,
            &self.app_root,
            Some(&mut on_progress),
            self.cancel.clone(),
        )
        .await
    }

    fn install_launcher(&mut self) -> Result<()> {
        let fetched = self
            .state
            .launcher_package
            .take()
            .ok_or_else(|| DistributionError::state("launcher package was not downloaded"))?;
        disk::ensure_free_space(&self.app_root, Some(fetched.bytes.len() as u64))?;
        let staging = env::temp_dir(&self.app_root).join("launcher");
        let count = package::install_launcher_files(&fetched.bytes, &staging, &self.app_root)?;
        info!("installer: launcher {} installed ({count} files)", fetched.info.version);
        Ok(())
    }

    fn install_app(&mut self) -> Result<()> {
        let fetched = self
            .state
            .app_package
            .take()
            .ok_or_else(|| DistributionError::state("app package was not downloaded"))?;
        let discovery = self.discovery()?;
        let version = fetched.info.version.clone();
        let version_root = discovery.version_root();
        let version_dir = package::version_dir_for(&version_root, &version)?;
        let executable = discovery.executable_name().to_owned();
        let data_dir = data_dir_name(discovery);

        let previous = package::newest_version_dir(&version_root, &version);
        disk::ensure_free_space(&self.app_root, Some(fetched.bytes.len() as u64))?;
        let staging = env::temp_dir(&self.app_root).join(format!("app-{version}"));
        package::install_app_archive(&fetched.bytes, &staging, &version_dir, &executable, &data_dir)?;
        info!("installer: Mix It Up {version} installed into {}", version_dir.display());

        self.state.previous_version = previous;
        self.state.version = Some(version);
        self.state.version_dir = Some(version_dir);
        Ok(())
    }

    fn copy_data(&mut self) -> Result<()> {
        let discovery = self.discovery()?;
        let data_dir_name = data_dir_name(discovery);
        let version_dir = self
            .state
            .version_dir
            .as_ref()
            .ok_or_else(|| DistributionError::state("no version directory to copy data into"))?;
        let dest = version_dir.join(&data_dir_name);

        let skipped = if let Some(report) = &self.state.migration {
            let migrated_data = report.staging.join(env::DATA_DIR);
            if migrated_data.is_dir() {
                copy_user_data(&migrated_data, &dest, DataScope::Everything)?
            } else {
                copy_user_data(&report.staging, &dest, DataScope::AllowListed)?
            }
        } else if let Some(previous) = &self.state.previous_version {
            copy_user_data(&previous.path.join(&data_dir_name), &dest, DataScope::AllowListed)?
        } else {
            debug!("installer: fresh install, no user data to copy");
            Vec::new()
        };
        if !skipped.is_empty() {
            info!("installer: {} existing data item(s) were kept", skipped.len());
        }
        Ok(())
    }

    fn write_config(&mut self) -> Result<()> {
        let discovery = self.discovery()?;
        let version = self.installed_version()?.to_owned();
        let version_root = discovery.version_root();

        let mut available: Vec<String> = package::scan_version_dirs(&version_root)
            .map_err(|e| DistributionError::io("unable to list installed versions", &version_root, e))?
            .into_iter()
            .map(|dir| dir.name)
            .collect();
        available.sort_by(|a, b| compare_versions(a, b));

        let update = LauncherConfigUpdate {
            current_version: Some(version.clone()),
            available_versions: Some(available.clone()),
            version_root: Some(discovery.version_root_name().to_owned()),
            data_dir_name: Some(data_dir_name(discovery)),
            executable_name: Some(discovery.executable_name().to_owned()),
            ..Default::default()
        };
        let config = LauncherConfigBuilder::build_or_update(discovery.existing_config.as_ref(), &update);
        let config_path = env::launcher_config_path(&discovery.app_root);
        LauncherConfigService::save(&config_path, &config)?;
        info!(
            "installer: wrote {} (current {version}, versions {:?})",
            config_path.display(),
            config.versions
        );

        let bootloader_path = env::bootloader_config_path(&discovery.app_root);
        if bootloader_path.is_file() {
            match BootloaderConfigService::load(&bootloader_path) {
                Ok(existing) => {
                    let update = BootloaderConfigUpdate {
                        current_version: Some(version),
                        available_versions: available,
                        version_root: update.version_root,
                        data_dir_name: update.data_dir_name,
                        executable_name: update.executable_name,
                    };
                    let bootloader = BootloaderConfigBuilder::build_or_update(existing.as_ref(), &update);
                    BootloaderConfigService::save(&bootloader_path, &bootloader)?;
                }
                Err(err) => warn!("installer: leaving unreadable bootloader config alone: {err}"),
            }
        }
        Ok(())
    }

    fn register(&mut self) -> Result<()> {
        let version = self.installed_version()?.to_owned();
        let entry = UninstallEntry {
            display_name: env::PRODUCT_NAME.to_owned(),
            display_version: version,
            publisher: env::PUBLISHER.to_owned(),
            install_location: self.app_root.clone(),
            display_icon: env::launcher_executable_path(&self.app_root),
            uninstall_command: format!(
                "\"{}\" \"{}\"",
                self.app_root.join(env::UNINSTALLER_EXECUTABLE).display(),
                self.app_root.display()
            ),
        };
        registry::register_uninstall(self.host.registrar.as_ref(), self.host.environment.elevated, &entry)?;
        Ok(())
    }

    fn create_shortcuts(&mut self) -> Result<()> {
        let target = env::launcher_executable_path(&self.app_root);
        let template = self.app_root.join(env::SHORTCUT_NAME);
        let template = template.is_file().then_some(template.as_path());
        let environment = &self.host.environment;

        let mut last_error = None;
        for (label, dir) in [
            ("Start Menu", environment.start_menu_dir.as_deref()),
            ("Desktop", environment.desktop_dir.as_deref()),
        ] {
            let Some(dir) = dir else {
                warn!("installer: no {label} folder for the shortcut");
                continue;
            };
            let path = dir.join(env::SHORTCUT_NAME);
            match shortcuts::install_shortcut(self.host.shortcuts.as_ref(), template, &path, &target, &self.app_root) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!("installer: {label} shortcut failed: {err}");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            DistributionError::filesystem(
                FilesystemErrorKind::PermissionDenied,
                None,
                "unable to create a shortcut in the Start Menu or on the Desktop",
            )
        }))
    }

    fn outcome(&self) -> Result<InstallOutcome> {
        let discovery = self.discovery()?;
        let version = self.installed_version()?.to_owned();
        Ok(InstallOutcome {
            executable_path: env::app_executable_path(
                &discovery.app_root,
                discovery.version_root_name(),
                &version,
                discovery.executable_name(),
            ),
            launcher_path: env::launcher_executable_path(&discovery.app_root),
            app_root: discovery.app_root.clone(),
            version,
            is_update: discovery.is_update,
        })
    }

    fn discovery(&self) -> Result<&Discovery> {
        self.state
            .discovery
            .as_ref()
            .ok_or_else(|| DistributionError::state("install root has not been inspected"))
    }

    fn installed_version(&self) -> Result<&str> {
        self.state
            .version
            .as_deref()
            .ok_or_else(|| DistributionError::state("no version identifier was resolved"))
    }

    fn emit_step(&self, step: InstallerStep) {
        self.events.emit(InstallerEvent::Step {
            step,
            state: self.steps.state(step).clone(),
        });
    }

    fn status(&self, message: &str) {
        info!("installer: {message}");
        self.events.emit(InstallerEvent::Status(message.to_owned()));
    }

    /// The migrated files live on in the new version's data folder; the staging copy goes.
    fn remove_migration_staging(&self) {
        let Some(report) = &self.state.migration else {
            return;
        };
        match remove_path(&report.staging) {
            Ok(()) => debug!("installer: removed {}", report.staging.display()),
            Err(err) => warn!("installer: unable to remove {}: {err}", report.staging.display()),
        }
    }

    fn cleanup_temp(&self) {
        let temp = env::temp_dir(&self.app_root);
        if let Err(err) = remove_path(&temp) {
            warn!("installer: unable to remove {}: {err}", temp.display());
        }
    }
}

fn data_dir_name(discovery: &Discovery) -> String {
    discovery
        .existing_config
        .as_ref()
        .map(|config| env::non_blank_or(&config.data_dir_name, env::DATA_DIR).to_owned())
        .unwrap_or_else(|| env::DATA_DIR.to_owned())
}
