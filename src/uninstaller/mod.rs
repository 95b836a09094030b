//! Removes an installation: shortcuts, uninstall registration and the app root.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::env;
use crate::error::{DistributionError, Result};
use crate::host::{HostServices, RegistryHive, processes};
use crate::util::remove_path;

/// What was removed and what had to stay behind.
#[derive(Debug, Default)]
pub struct UninstallReport {
    pub removed: Vec<PathBuf>,
    pub leftovers: Vec<PathBuf>,
    pub unregistered: Vec<RegistryHive>,
}

impl UninstallReport {
    pub fn is_clean(&self) -> bool {
        self.leftovers.is_empty()
    }
}

pub struct Uninstaller {
    app_root: PathBuf,
    host: HostServices,
}

impl Uninstaller {
    pub fn new(app_root: PathBuf, host: HostServices) -> Self {
        Self { app_root, host }
    }

    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    pub async fn run(&self) -> Result<UninstallReport> {
        if !looks_like_install(&self.app_root) {
            return Err(DistributionError::precondition(format!(
                "No Mix It Up installation was found at {}.",
                self.app_root.display()
            )));
        }
        info!("uninstaller: removing {}", self.app_root.display());

        processes::close_processes(
            self.host.processes.as_ref(),
            &self.host.process_names,
            self.host.process_tick,
        )
        .await
        .map_err(|remaining| {
            DistributionError::precondition(format!(
                "Please close {} and run the uninstaller again.",
                remaining.join(", ")
            ))
        })?;

        let mut report = UninstallReport::default();
        self.remove_shortcuts(&mut report);
        self.unregister(&mut report);
        self.remove_app_root(&mut report)?;

        for leftover in &report.leftovers {
            warn!("uninstaller: left behind {}", leftover.display());
        }
        info!(
            "uninstaller: removed {} item(s), {} left behind",
            report.removed.len(),
            report.leftovers.len()
        );
        Ok(report)
    }

    fn remove_shortcuts(&self, report: &mut UninstallReport) {
        let environment = &self.host.environment;
        for dir in [environment.start_menu_dir.as_deref(), environment.desktop_dir.as_deref()]
            .into_iter()
            .flatten()
        {
            let shortcut = dir.join(env::SHORTCUT_NAME);
            if fs::symlink_metadata(&shortcut).is_err() {
                continue;
            }
            match fs::remove_file(&shortcut) {
                Ok(()) => report.removed.push(shortcut),
                Err(err) => {
                    warn!("uninstaller: unable to remove {}: {err}", shortcut.display());
                    report.leftovers.push(shortcut);
                }
            }
        }
    }

    fn unregister(&self, report: &mut UninstallReport) {
        for hive in [RegistryHive::LocalMachine, RegistryHive::CurrentUser] {
            match self.host.registrar.unregister(hive) {
                Ok(()) => report.unregistered.push(hive),
                Err(err) => debug!("uninstaller: {} entry not removed: {err}", hive.prefix()),
            }
        }
    }

    /// Delete every item under the app root except the running executable (and the
    /// folders holding it), then the root itself once empty.
    fn remove_app_root(&self, report: &mut UninstallReport) -> Result<()> {
        let running = self.host.environment.current_exe.as_deref();
        let entries = fs::read_dir(&self.app_root)
            .map_err(|e| DistributionError::io("unable to read install folder", &self.app_root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| DistributionError::io("unable to read install folder", &self.app_root, e))?;
            let path = entry.path();
            if running.is_some_and(|exe| exe.starts_with(&path)) {
                debug!("uninstaller: sparing running {}", path.display());
                report.leftovers.push(path);
                continue;
            }
            match remove_path(&path) {
                Ok(()) => report.removed.push(path),
                Err(err) => {
                    warn!("uninstaller: unable to remove {}: {err}", path.display());
                    report.leftovers.push(path);
                }
            }
        }

        if report.leftovers.iter().any(|p| p.starts_with(&self.app_root)) {
            return Ok(());
        }
        match fs::remove_dir(&self.app_root) {
            Ok(()) => report.removed.push(self.app_root.clone()),
            Err(err) => {
                warn!("uninstaller: unable to remove {}: {err}", self.app_root.display());
                report.leftovers.push(self.app_root.clone());
            }
        }
        Ok(())
    }
}

/// Refuse to wipe a folder that holds none of the files an install leaves behind.
fn looks_like_install(app_root: &Path) -> bool {
    app_root.is_dir()
        && (env::launcher_config_path(app_root).is_file()
            || env::bootloader_config_path(app_root).is_file()
            || env::launcher_executable_path(app_root).is_file()
            || env::legacy_executable_path(app_root).is_file()
            || app_root.join(env::VERSION_ROOT).is_dir())
}
