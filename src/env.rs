use std::env;
use std::path::{Path, PathBuf};

/// Folder (under the app root) holding one directory per installed version.
pub const VERSION_ROOT: &str = "app";
/// Per-version user data folder.
pub const DATA_DIR: &str = "data";
/// Ephemeral download and staging workspace, recreated on every run.
pub const TEMP_DIR: &str = ".tmp";
pub const LOGS_DIR: &str = "logs";

pub const APP_EXECUTABLE: &str = "MixItUp.exe";
pub const LAUNCHER_EXECUTABLE: &str = "MixItUp.Launcher.exe";
pub const INSTALLER_EXECUTABLE: &str = "MixItUp.Installer.exe";
pub const UNINSTALLER_EXECUTABLE: &str = "MixItUp.Uninstaller.exe";

pub const LAUNCHER_CONFIG_FILE: &str = "launcher.json";
pub const BOOTLOADER_CONFIG_FILE: &str = "bootloader.json";

pub const SHORTCUT_NAME: &str = "Mix It Up.lnk";
pub const PRODUCT_NAME: &str = "Mix It Up";
pub const PUBLISHER: &str = "Mix It Up";
pub const UNINSTALL_KEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Uninstall\MixItUp";

/// Prefix of the staging folders a legacy or portable install is migrated into.
pub const LEGACY_STAGING_PREFIX: &str = "legacy-temp";

/// Platform key used for the executable map in persisted configs.
pub const WINDOWS_PLATFORM_KEY: &str = "windows";

/// Returns the default install root (`%LOCALAPPDATA%\MixItUp` on Windows).
pub fn default_app_root() -> PathBuf {
    let base = match env::consts::OS {
        "windows" => env::var_os("LOCALAPPDATA")
            .or_else(|| env::var_os("APPDATA"))
            .map(PathBuf::from),
        "macos" => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join("Library").join("Application Support")),
        _ => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join(".local").join("share")),
    }
    .unwrap_or_else(|| PathBuf::from("."));

    base.join("MixItUp")
}

/// Resolve the install root from an optional CLI override.
pub fn resolve_app_root(override_path: Option<&Path>) -> PathBuf {
    match override_path {
        Some(path) if !path.as_os_str().is_empty() => path.to_path_buf(),
        _ => default_app_root(),
    }
}

pub fn version_root(app_root: &Path, version_root_name: &str) -> PathBuf {
    app_root.join(non_blank_or(version_root_name, VERSION_ROOT))
}

pub fn version_dir(app_root: &Path, version_root_name: &str, version: &str) -> PathBuf {
    version_root(app_root, version_root_name).join(version)
}

pub fn temp_dir(app_root: &Path) -> PathBuf {
    app_root.join(TEMP_DIR)
}

pub fn logs_dir(app_root: &Path) -> PathBuf {
    app_root.join(LOGS_DIR)
}

pub fn launcher_config_path(app_root: &Path) -> PathBuf {
    app_root.join(LAUNCHER_CONFIG_FILE)
}

pub fn bootloader_config_path(app_root: &Path) -> PathBuf {
    app_root.join(BOOTLOADER_CONFIG_FILE)
}

pub fn launcher_executable_path(app_root: &Path) -> PathBuf {
    app_root.join(LAUNCHER_EXECUTABLE)
}

pub fn legacy_executable_path(app_root: &Path) -> PathBuf {
    app_root.join(APP_EXECUTABLE)
}

/// `{appRoot}/{versionRoot}/{version}/{executable}`
pub fn app_executable_path(
    app_root: &Path,
    version_root_name: &str,
    version: &str,
    executable: &str,
) -> PathBuf {
    version_dir(app_root, version_root_name, version).join(non_blank_or(executable, APP_EXECUTABLE))
}

/// Whether a directory name under the version root is a real version (not staging or backup).
pub fn is_version_dir_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.starts_with(LEGACY_STAGING_PREFIX)
        && !name.contains(".backup-")
        && !name.contains(".prune-")
}

pub(crate) fn non_blank_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() { fallback } else { trimmed }
}
