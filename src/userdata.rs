use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{DistributionError, Result};
use crate::util::copy_dir;

/// User data carried between version directories on a normal upgrade.
/// Caches and transient files are left behind.
pub const USER_DATA_ALLOW_LIST: [&str; 6] = [
    "Settings",
    "Logs",
    "ChatEventLogs",
    "Counters",
    "ApplicationSettings.json",
    "ApplicationSettings.xml",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataScope {
    /// Everything under the source (migrated legacy or portable data).
    Everything,
    /// Only [`USER_DATA_ALLOW_LIST`] entries (upgrade from a previous version).
    AllowListed,
}

/// Copy user data from `source` into `dest` without overwriting anything already there.
/// Returns the destination paths that were skipped because they existed.
pub fn copy_user_data(source: &Path, dest: &Path, scope: DataScope) -> Result<Vec<PathBuf>> {
    if !source.is_dir() {
        info!("user data: nothing to copy from {}", source.display());
        return Ok(Vec::new());
    }
    fs::create_dir_all(dest).map_err(|e| DistributionError::io("unable to create data folder", dest, e))?;

    let skipped = match scope {
        DataScope::Everything => {
            copy_dir(source, dest, false).map_err(|e| DistributionError::io("unable to copy user data", dest, e))?
        }
        DataScope::AllowListed => {
            let mut skipped = Vec::new();
            for name in USER_DATA_ALLOW_LIST {
                let from = source.join(name);
                let to = dest.join(name);
                if from.is_dir() {
                    let mut nested = copy_dir(&from, &to, false)
                        .map_err(|e| DistributionError::io("unable to copy user data", &to, e))?;
                    skipped.append(&mut nested);
                } else if from.is_file() {
                    if to.exists() {
                        skipped.push(to);
                        continue;
                    }
                    fs::copy(&from, &to).map_err(|e| DistributionError::io("unable to copy user data", &to, e))?;
                }
            }
            skipped
        }
    };

    for path in &skipped {
        warn!("user data: kept existing {}", path.display());
    }
    info!(
        "user data: copied {} -> {} ({} existing item(s) kept)",
        source.display(),
        dest.display(),
        skipped.len()
    );
    Ok(skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_skips_caches() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("old").join("data");
        fs::create_dir_all(source.join("Settings")).unwrap();
        fs::create_dir_all(source.join("Cache")).unwrap();
        fs::write(source.join("Settings").join("a.db"), "a").unwrap();
        fs::write(source.join("Cache").join("blob"), "x").unwrap();
        fs::write(source.join("ApplicationSettings.json"), "{}").unwrap();

        let dest = tmp.path().join("new").join("data");
        let skipped = copy_user_data(&source, &dest, DataScope::AllowListed).unwrap();

        assert!(skipped.is_empty());
        assert!(dest.join("Settings").join("a.db").is_file());
        assert!(dest.join("ApplicationSettings.json").is_file());
        assert!(!dest.join("Cache").exists());
    }

    #[test]
    fn missing_source_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let skipped = copy_user_data(&tmp.path().join("nope"), &tmp.path().join("dest"), DataScope::Everything).unwrap();
        assert!(skipped.is_empty());
        assert!(!tmp.path().join("dest").exists());
    }
}
