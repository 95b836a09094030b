use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::LauncherConfigService;
use crate::env;
use crate::error::{ConfigError, DistributionError, Result};
use crate::models::LauncherConfigModel;

/// What the installer found at the install root.
#[derive(Clone, Debug, Default)]
pub struct Discovery {
    pub app_root: PathBuf,
    /// Old flat layout: `MixItUp.exe` in the root and no versioned markers.
    pub legacy_layout: bool,
    /// An unpacked copy of Mix It Up next to the running installer.
    pub portable_source: Option<PathBuf>,
    /// A versioned app folder or launcher config is already present.
    pub migration_done: bool,
    pub is_update: bool,
    pub existing_config: Option<LauncherConfigModel>,
}

impl Discovery {
    pub fn version_root_name(&self) -> &str {
        self.existing_config
            .as_ref()
            .map(|config| config.version_root.as_str())
            .unwrap_or(env::VERSION_ROOT)
    }

    pub fn executable_name(&self) -> &str {
        self.existing_config
            .as_ref()
            .map(LauncherConfigModel::windows_executable)
            .unwrap_or(env::APP_EXECUTABLE)
    }

    pub fn version_root(&self) -> PathBuf {
        env::version_root(&self.app_root, self.version_root_name())
    }

    pub fn needs_migration(&self) -> bool {
        !self.migration_done && (self.legacy_layout || self.portable_source.is_some())
    }
}

/// Make the root absolute without requiring it to exist.
pub fn normalize_root(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| DistributionError::io("unable to resolve install folder", path, e))
}

/// Inspect `app_root` (creating it if needed) and the directory the installer runs from.
pub fn discover(app_root: &Path, installer_dir: Option<&Path>) -> Result<Discovery> {
    let app_root = normalize_root(app_root)?;
    fs::create_dir_all(&app_root).map_err(|e| DistributionError::io("unable to create install folder", &app_root, e))?;

    let existing_config = load_existing_config(&env::launcher_config_path(&app_root))?;
    let version_root_name = existing_config
        .as_ref()
        .map(|c| c.version_root.clone())
        .unwrap_or_else(|| env::VERSION_ROOT.to_owned());

    let has_config = env::launcher_config_path(&app_root).is_file();
    let has_version_root = env::version_root(&app_root, &version_root_name).is_dir();
    let has_legacy_exe = env::legacy_executable_path(&app_root).is_file();
    let has_launcher = env::launcher_executable_path(&app_root).is_file();

    let migration_done = has_config || has_version_root;
    let legacy_layout = has_legacy_exe && !migration_done;
    let portable_source = installer_dir
        .filter(|dir| is_portable_install(dir, &app_root))
        .map(Path::to_path_buf);

    let discovery = Discovery {
        is_update: migration_done || legacy_layout || has_launcher,
        app_root,
        legacy_layout,
        portable_source,
        migration_done,
        existing_config,
    };
    info!(
        "installer: discovered root={} legacy={} portable={:?} migrated={} update={}",
        discovery.app_root.display(),
        discovery.legacy_layout,
        discovery.portable_source,
        discovery.migration_done,
        discovery.is_update
    );
    Ok(discovery)
}

fn is_portable_install(dir: &Path, app_root: &Path) -> bool {
    if same_path(dir, app_root) {
        return false;
    }
    dir.join(env::LAUNCHER_EXECUTABLE).is_file() || dir.join(env::APP_EXECUTABLE).is_file()
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// A malformed config is rebuilt from the disk scan later, so it only warns here.
fn load_existing_config(path: &Path) -> Result<Option<LauncherConfigModel>> {
    match LauncherConfigService::load(path) {
        Ok(config) => Ok(config),
        Err(err @ ConfigError::Parse { .. }) => {
            warn!("installer: ignoring unreadable config: {err}");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_root_is_a_fresh_install() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("MixItUp");
        let found = discover(&root, None).unwrap();
        assert!(root.is_dir());
        assert!(!found.is_update);
        assert!(!found.needs_migration());
        assert_eq!(found.version_root(), root.join("app"));
    }

    #[test]
    fn flat_layout_is_legacy() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("MixItUp.exe"), "exe").unwrap();
        let found = discover(tmp.path(), None).unwrap();
        assert!(found.legacy_layout);
        assert!(found.is_update);
        assert!(found.needs_migration());
    }

    #[test]
    fn versioned_layout_is_already_migrated() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("MixItUp.exe"), "exe").unwrap();
        fs::create_dir_all(tmp.path().join("app").join("1.0.0")).unwrap();
        let found = discover(tmp.path(), None).unwrap();
        assert!(!found.legacy_layout);
        assert!(found.migration_done);
        assert!(!found.needs_migration());
    }

    #[test]
    fn detects_portable_copy_next_to_installer() {
        let tmp = tempfile::tempdir().unwrap();
        let portable = tmp.path().join("Downloads").join("MixItUp");
        fs::create_dir_all(&portable).unwrap();
        fs::write(portable.join("MixItUp.exe"), "exe").unwrap();
        let root = tmp.path().join("root");

        let found = discover(&root, Some(&portable)).unwrap();
        assert_eq!(found.portable_source.as_deref(), Some(portable.as_path()));
        assert!(found.needs_migration());

        let same = discover(&portable, Some(&portable)).unwrap();
        assert!(same.portable_source.is_none());
    }

    #[test]
    fn malformed_config_is_ignored_but_counts_as_installed() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("launcher.json"), "{oops").unwrap();
        let found = discover(tmp.path(), None).unwrap();
        assert!(found.existing_config.is_none());
        assert!(found.migration_done);
        assert!(found.is_update);
    }
}
