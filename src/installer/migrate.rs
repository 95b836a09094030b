use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::env;
use crate::error::{DistributionError, Result};
use crate::util::{copy_dir, move_path};

/// Where pre-versioning files come from.
#[derive(Clone, Copy, Debug)]
pub enum MigrationSource<'a> {
    /// Flat install in the app root; items are moved.
    Legacy(&'a Path),
    /// Unpacked copy elsewhere; items are copied.
    Portable(&'a Path),
}

impl MigrationSource<'_> {
    fn root(&self) -> &Path {
        match self {
            MigrationSource::Legacy(path) | MigrationSource::Portable(path) => path,
        }
    }
}

#[derive(Debug, Default)]
pub struct MigrationReport {
    pub staging: PathBuf,
    pub migrated: usize,
    pub skipped: Vec<PathBuf>,
}

/// First free `legacy-temp`, `legacy-temp-1`, ... under the version root.
pub fn allocate_staging(version_root: &Path) -> PathBuf {
    let first = version_root.join(env::LEGACY_STAGING_PREFIX);
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| version_root.join(format!("{}-{n}", env::LEGACY_STAGING_PREFIX)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// Move or copy every top-level item of `source` into a fresh staging folder under
/// `version_root`. Items listed in `exclude`, and anything containing the staging
/// folder, are skipped and reported.
pub fn migrate(source: MigrationSource<'_>, version_root: &Path, exclude: &[PathBuf]) -> Result<MigrationReport> {
    let staging = allocate_staging(version_root);
    fs::create_dir_all(&staging).map_err(|e| DistributionError::io("unable to create migration folder", &staging, e))?;
    let mut report = MigrationReport {
        staging: staging.clone(),
        ..Default::default()
    };

    let root = source.root();
    let entries = fs::read_dir(root).map_err(|e| DistributionError::io("unable to read previous installation", root, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| DistributionError::io("unable to read previous installation", root, e))?;
        let path = entry.path();
        if exclude.iter().any(|skip| skip == &path) || staging.starts_with(&path) {
            report.skipped.push(path);
            continue;
        }
        let target = staging.join(entry.file_name());
        let outcome = match source {
            MigrationSource::Legacy(_) => move_path(&path, &target),
            MigrationSource::Portable(_) if path.is_dir() => copy_dir(&path, &target, true).map(|_| ()),
            MigrationSource::Portable(_) => fs::copy(&path, &target).map(|_| ()),
        };
        outcome.map_err(|e| DistributionError::io("unable to migrate previous installation", &path, e))?;
        report.migrated += 1;
    }

    for skipped in &report.skipped {
        warn!("installer: migration skipped {}", skipped.display());
    }
    info!(
        "installer: migrated {} item(s) from {} into {}",
        report.migrated,
        root.display(),
        staging.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_names_are_numbered() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(allocate_staging(tmp.path()), tmp.path().join("legacy-temp"));
        fs::create_dir_all(tmp.path().join("legacy-temp")).unwrap();
        fs::create_dir_all(tmp.path().join("legacy-temp-1")).unwrap();
        assert_eq!(allocate_staging(tmp.path()), tmp.path().join("legacy-temp-2"));
    }

    #[test]
    fn legacy_items_are_moved_without_cycles() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("MixItUp.exe"), "exe").unwrap();
        fs::create_dir_all(root.join("Settings")).unwrap();
        fs::write(root.join("Settings").join("s.db"), "db").unwrap();
        fs::create_dir_all(root.join(".tmp")).unwrap();
        let installer = root.join("MixItUp.Installer.exe");
        fs::write(&installer, "me").unwrap();

        let version_root = root.join("app");
        let report = migrate(
            MigrationSource::Legacy(root),
            &version_root,
            &[installer.clone(), root.join(".tmp")],
        )
        .unwrap();

        assert_eq!(report.staging, version_root.join("legacy-temp"));
        assert!(report.staging.join("MixItUp.exe").is_file());
        assert!(report.staging.join("Settings").join("s.db").is_file());
        assert!(!root.join("MixItUp.exe").exists());
        assert!(installer.is_file());
        assert!(report.skipped.contains(&version_root));
        assert_eq!(report.migrated, 2);
    }

    #[test]
    fn portable_items_are_copied() {
        let tmp = tempfile::tempdir().unwrap();
        let portable = tmp.path().join("portable");
        fs::create_dir_all(portable.join("data")).unwrap();
        fs::write(portable.join("MixItUp.exe"), "exe").unwrap();
        fs::write(portable.join("data").join("ApplicationSettings.json"), "{}").unwrap();

        let version_root = tmp.path().join("root").join("app");
        let report = migrate(MigrationSource::Portable(&portable), &version_root, &[]).unwrap();

        assert!(portable.join("MixItUp.exe").is_file());
        assert!(report.staging.join("data").join("ApplicationSettings.json").is_file());
    }
}
