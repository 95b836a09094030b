//! Download, verify, stage and swap update packages into an install root.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::SystemTime;

use log::{debug, error, info};
use walkdir::WalkDir;

use crate::archive::{self, EntryProgress, ExtractOptions, SafeZipExtractor};
use crate::checksum;
use crate::error::{DistributionError, FilesystemErrorKind, Result};
use crate::env;
use crate::host::disk;
use crate::models::UpdatePackageInfo;
use crate::networking::{DistributionClient, ProgressCallback};
use crate::settings::DistributionSettings;
use crate::transaction::SwapTransaction;
use crate::userdata::{DataScope, copy_user_data};
use crate::util::remove_path;

/// A downloaded package whose checksum has been verified.
#[derive(Debug)]
pub struct FetchedPackage {
    pub info: UpdatePackageInfo,
    pub bytes: Vec<u8>,
}

/// Resolve the latest package for `product`, check free space, download and verify it.
pub async fn fetch_verified(
    client: &DistributionClient,
    settings: &DistributionSettings,
    product: &str,
    space_target: &Path,
    progress: ProgressCallback<'_>,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<FetchedPackage> {
    let info = client
        .get_latest_package(product, &settings.platform, settings.channel)
        .await?;
    disk::ensure_free_space(space_target, info.size)?;
    let bytes = client
        .download_package(&info.download_uri, settings.download_timeout, progress, cancel)
        .await?;
    checksum::verify_payload(
        &bytes,
        info.sha256.as_deref(),
        settings.checksum_policy,
        info.download_uri.as_str(),
    )?;
    info!("package: {} {} ready ({} bytes)", info.product, info.version, bytes.len());
    Ok(FetchedPackage { info, bytes })
}

/// Extract `bytes` into a fresh `staging` directory, dropping a shared top-level folder.
pub fn stage_archive(bytes: &[u8], staging: &Path, progress: EntryProgress<'_>) -> Result<usize> {
    remove_path(staging).map_err(|e| DistributionError::io("unable to clear staging folder", staging, e))?;
    let names = SafeZipExtractor::entry_names(bytes)?;
    let selector = archive::common_root_folder(&names).map(archive::strip_prefix_selector);
    let options = ExtractOptions {
        overwrite: true,
        path_selector: selector.as_ref().map(|s| s as &dyn Fn(&str) -> Option<String>),
        progress,
    };
    let result = SafeZipExtractor::extract(bytes, staging, options)?;
    Ok(result.extracted_entries.len())
}

/// Whether `dir` holds `preferred` or any other `.exe`.
pub fn has_executable(dir: &Path, preferred: &str) -> bool {
    if dir.join(preferred).is_file() {
        return true;
    }
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .any(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
        })
}

/// `version_root/version`, refusing a manifest version that is not one plain folder name.
pub fn version_dir_for(version_root: &Path, version: &str) -> Result<PathBuf> {
    let mut components = Path::new(version).components();
    let single = matches!((components.next(), components.next()), (Some(Component::Normal(_)), None));
    let plain = single && !version.contains(['/', '\\', ':']) && version.trim() == version;
    if !plain || !env::is_version_dir_name(version) {
        return Err(DistributionError::filesystem(
            FilesystemErrorKind::PathTraversal,
            None,
            format!("package version {version:?} is not a valid folder name"),
        ));
    }
    Ok(version_root.join(version))
}

/// Stage `bytes`, swap the result into `version_dir` inside `txn` and check it is runnable.
/// When `version_dir` already exists its whole `data_dir` moves along with the swap.
pub fn stage_and_swap(
    txn: &mut SwapTransaction,
    bytes: &[u8],
    staging: &Path,
    version_dir: &Path,
    executable: &str,
    data_dir: &str,
    progress: EntryProgress<'_>,
) -> Result<()> {
    let extracted = stage_archive(bytes, staging, progress)?;
    debug!("package: staged {extracted} entries in {}", staging.display());

    let existing_data = version_dir.join(data_dir);
    if existing_data.is_dir() {
        let skipped = copy_user_data(&existing_data, &staging.join(data_dir), DataScope::Everything)?;
        info!(
            "package: carried data of {} into the new build ({} packaged item(s) kept)",
            version_dir.display(),
            skipped.len()
        );
    }

    txn.replace(staging, version_dir)?;
    if !has_executable(version_dir, executable) {
        return Err(DistributionError::filesystem(
            FilesystemErrorKind::CorruptPackage,
            Some(version_dir),
            "package does not contain an executable",
        ));
    }
    let data_path = version_dir.join(data_dir);
    fs::create_dir_all(&data_path).map_err(|e| DistributionError::io("unable to create data folder", &data_path, e))
}

/// Install an app version with a whole-directory swap. On failure the previous
/// directory (if any) is put back and nothing partial is left at `version_dir`.
pub fn install_app_archive(
    bytes: &[u8],
    staging: &Path,
    version_dir: &Path,
    executable: &str,
    data_dir: &str,
) -> Result<()> {
    let mut txn = SwapTransaction::new(format!("app {}", version_dir.display()));
    let result = stage_and_swap(&mut txn, bytes, staging, version_dir, executable, data_dir, None);
    let outcome = settle(txn, result);
    // Staging is gone after a successful swap; clear leftovers from a failed one.
    let _ = remove_path(staging);
    outcome
}

/// Install launcher files one by one into `app_root`, backing up each overwritten file.
/// Any failure restores every touched file and prunes directories that were created.
pub fn install_launcher_files(bytes: &[u8], staging: &Path, app_root: &Path) -> Result<usize> {
    stage_archive(bytes, staging, None)?;
    let files: Vec<PathBuf> = WalkDir::new(staging)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    if files.is_empty() {
        return Err(DistributionError::filesystem(
            FilesystemErrorKind::CorruptPackage,
            Some(staging),
            "launcher package contains no files",
        ));
    }

    let mut txn = SwapTransaction::new("launcher files");
    let result = (|| -> Result<usize> {
        for file in &files {
            let relative = file
                .strip_prefix(staging)
                .map_err(|_| DistributionError::state(format!("{} is outside staging", file.display())))?;
            txn.replace(file, &app_root.join(relative))?;
        }
        Ok(files.len())
    })();
    let outcome = settle(txn, result);
    let _ = remove_path(staging);
    outcome
}

/// Commit on success, roll back on failure.
pub(crate) fn settle<T>(txn: SwapTransaction, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            txn.commit();
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback() {
                error!("package: {rollback_err}");
            }
            Err(err)
        }
    }
}

/// A version directory found on disk.
#[derive(Clone, Debug)]
pub struct VersionDir {
    pub name: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Real version directories under `version_root` (staging and backup folders excluded).
pub fn scan_version_dirs(version_root: &Path) -> io::Result<Vec<VersionDir>> {
    let entries = match fs::read_dir(version_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let metadata = entry.metadata()?;
        if !metadata.is_dir() || !env::is_version_dir_name(&name) {
            continue;
        }
        found.push(VersionDir {
            name,
            path: entry.path(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    Ok(found)
}

/// Most recently modified version directory other than `exclude`.
pub fn newest_version_dir(version_root: &Path, exclude: &str) -> Option<VersionDir> {
    scan_version_dirs(version_root)
        .ok()?
        .into_iter()
        .filter(|dir| !dir.name.eq_ignore_ascii_case(exclude))
        .max_by_key(|dir| dir.modified)
}
