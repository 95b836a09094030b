use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{debug, info, warn};

use crate::error::{DistributionError, Result};
use crate::util::{move_path, remove_path};

enum Action {
    /// A directory that did not exist before the transaction and was created for a target.
    CreatedDir(PathBuf),
    /// `target` now holds staged content; `backup` holds what was there before, if anything.
    Replaced { target: PathBuf, backup: Option<PathBuf> },
    /// `original` was moved to `backup` so it can be dropped on commit.
    SetAside { original: PathBuf, backup: PathBuf },
}

/// Staged swap with rollback, usable for single files and whole directories.
///
/// Every change is a rename into a sibling backup path, so commit only deletes
/// backups and rollback only reverses renames, newest first.
pub struct SwapTransaction {
    label: String,
    stamp: String,
    actions: Vec<Action>,
}

impl SwapTransaction {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("txn[{label}]: begin");
        Self {
            label,
            stamp: Local::now().format("%Y%m%d%H%M%S").to_string(),
            actions: Vec::new(),
        }
    }

    /// Move `staged` into `target`, keeping any existing `target` as a backup.
    pub fn replace(&mut self, staged: &Path, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            self.create_parents(parent)?;
        }
        let backup = if fs::symlink_metadata(target).is_ok() {
            let backup = self.backup_path(target, "backup");
            move_path(target, &backup)
                .map_err(|e| DistributionError::io("unable to back up existing files", target, e))?;
            debug!("txn[{}]: {} -> {}", self.label, target.display(), backup.display());
            Some(backup)
        } else {
            None
        };
        self.actions.push(Action::Replaced {
            target: target.to_path_buf(),
            backup,
        });
        move_path(staged, target).map_err(|e| DistributionError::io("unable to move staged files into place", target, e))
    }

    /// Move `target` out of the way; it is deleted on commit and restored on rollback.
    pub fn set_aside(&mut self, target: &Path) -> Result<()> {
        let backup = self.backup_path(target, "prune");
        move_path(target, &backup).map_err(|e| DistributionError::io("unable to set aside", target, e))?;
        debug!("txn[{}]: set aside {}", self.label, target.display());
        self.actions.push(Action::SetAside {
            original: target.to_path_buf(),
            backup,
        });
        Ok(())
    }

    /// Number of recorded changes.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Keep every change and delete the backups. Leftover backups are only logged.
    pub fn commit(self) {
        for action in &self.actions {
            let leftover = match action {
                Action::Replaced { backup: Some(backup), .. } => backup,
                Action::SetAside { backup, .. } => backup,
                _ => continue,
            };
            if let Err(err) = remove_path(leftover) {
                warn!("txn[{}]: unable to delete backup {}: {err}", self.label, leftover.display());
            }
        }
        info!("txn[{}]: commit ({} changes)", self.label, self.actions.len());
    }

    /// Undo every change, newest first. Keeps going after individual failures and reports them together.
    pub fn rollback(self) -> Result<()> {
        warn!("txn[{}]: rollback ({} changes)", self.label, self.actions.len());
        let mut failures = Vec::new();
        for action in self.actions.iter().rev() {
            let outcome = match action {
                Action::Replaced { target, backup } => {
                    remove_path(target).and_then(|()| match backup {
                        Some(backup) => move_path(backup, target),
                        None => Ok(()),
                    })
                }
                Action::SetAside { original, backup } => move_path(backup, original),
                Action::CreatedDir(dir) => {
                    // Only prune directories that ended up empty.
                    let _ = fs::remove_dir(dir);
                    Ok(())
                }
            };
            if let Err(err) = outcome {
                let path = match action {
                    Action::Replaced { target, .. } => target,
                    Action::SetAside { original, .. } => original,
                    Action::CreatedDir(dir) => dir,
                };
                warn!("txn[{}]: unable to restore {}: {err}", self.label, path.display());
                failures.push(path.display().to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DistributionError::state(format!(
                "rollback of {} left {} path(s) unrestored: {}",
                self.label,
                failures.len(),
                failures.join(", ")
            )))
        }
    }

    fn create_parents(&mut self, dir: &Path) -> Result<()> {
        let mut missing = Vec::new();
        let mut current = Some(dir);
        while let Some(path) = current {
            if path.as_os_str().is_empty() || path.exists() {
                break;
            }
            missing.push(path.to_path_buf());
            current = path.parent();
        }
        for path in missing.into_iter().rev() {
            fs::create_dir(&path).map_err(|e| DistributionError::io("unable to create directory", &path, e))?;
            self.actions.push(Action::CreatedDir(path));
        }
        Ok(())
    }

    fn backup_path(&self, target: &Path, kind: &str) -> PathBuf {
        let name = target
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("item"));
        let mut attempt = 0u32;
        loop {
            let mut candidate = name.clone();
            candidate.push(format!(".{kind}-{}", self.stamp));
            if attempt > 0 {
                candidate.push(format!("-{attempt}"));
            }
            let path = target.with_file_name(candidate);
            if fs::symlink_metadata(&path).is_err() {
                return path;
            }
            attempt += 1;
        }
    }
}
