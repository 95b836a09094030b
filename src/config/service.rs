use std::fs;
use std::io;
use std::path::Path;

use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ConfigError;
use crate::models::{BootloaderConfigModel, LauncherConfigModel};

/// Reads and writes `launcher.json`.
pub struct LauncherConfigService;

impl LauncherConfigService {
    /// `Ok(None)` when the path is blank, missing or the file is empty. Malformed JSON is an error.
    pub fn load(path: &Path) -> Result<Option<LauncherConfigModel>, ConfigError> {
        load_json(path)
    }

    pub fn save(path: &Path, config: &LauncherConfigModel) -> Result<(), ConfigError> {
        save_json(path, config)
    }
}

/// Reads and writes `bootloader.json`.
pub struct BootloaderConfigService;

impl BootloaderConfigService {
    pub fn load(path: &Path) -> Result<Option<BootloaderConfigModel>, ConfigError> {
        load_json(path)
    }

    pub fn save(path: &Path, config: &BootloaderConfigModel) -> Result<(), ConfigError> {
        save_json(path, config)
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    if path.as_os_str().is_empty() {
        return Ok(None);
    }
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if text.trim().is_empty() {
        debug!("config: {} is empty", path.display());
        return Ok(None);
    }
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn save_json<T: Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::InvalidArgument("config path must not be empty"));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let bytes = serde_json::to_vec_pretty(config).map_err(|source| ConfigError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, bytes).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("config: saved {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_blank_and_empty_files_load_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(LauncherConfigService::load(Path::new("")).unwrap().is_none());
        assert!(LauncherConfigService::load(&tmp.path().join("launcher.json")).unwrap().is_none());

        let empty = tmp.path().join("empty.json");
        fs::write(&empty, "  \n").unwrap();
        assert!(LauncherConfigService::load(&empty).unwrap().is_none());
    }

    #[test]
    fn malformed_file_is_an_error_not_none() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("launcher.json");
        fs::write(&path, "{ not json").unwrap();
        let err = LauncherConfigService::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("launcher.json"));
    }

    #[test]
    fn save_creates_parent_and_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("launcher.json");
        let config = LauncherConfigModel {
            current_version: Some("1.0.0".into()),
            versions: vec!["1.0.0".into()],
            ..Default::default()
        };
        LauncherConfigService::save(&path, &config).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"currentVersion\""));
        assert!(!text.contains("null"));
        assert_eq!(LauncherConfigService::load(&path).unwrap(), Some(config));
    }

    #[test]
    fn save_rejects_blank_path() {
        let err = BootloaderConfigService::save(Path::new(""), &BootloaderConfigModel::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidArgument(_)));
    }
}
