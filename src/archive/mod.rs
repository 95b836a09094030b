use std::fs;
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};

use log::{debug, info, warn};
use zip::read::ZipArchive;

use crate::error::ExtractError;

/// Maps an archive entry name to the name it should be extracted as.
/// Returning `None` (or an empty name) skips the entry.
pub type PathSelector<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Coarse progress in percent of entries processed.
pub type EntryProgress<'a> = Option<&'a mut (dyn FnMut(f32) + Send)>;

/// Selector and callback carry separate lifetimes; `&mut dyn` is invariant.
#[derive(Default)]
pub struct ExtractOptions<'s, 'p> {
    pub overwrite: bool,
    pub path_selector: Option<PathSelector<'s>>,
    pub progress: EntryProgress<'p>,
}

#[derive(Debug, Default)]
pub struct ExtractionResult {
    /// Every file and directory written, in archive order.
    pub extracted_entries: Vec<PathBuf>,
}

struct PlannedEntry {
    index: usize,
    target: PathBuf,
    is_dir: bool,
}

/// Extracts in-memory zip archives without letting entries escape the destination.
pub struct SafeZipExtractor;

impl SafeZipExtractor {
    /// Raw entry names, in archive order.
    pub fn entry_names(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        let archive = open_archive(bytes)?;
        Ok(archive.file_names().map(str::to_owned).collect())
    }

    pub fn extract(
        bytes: &[u8],
        destination: &Path,
        mut options: ExtractOptions<'_, '_>,
    ) -> Result<ExtractionResult, ExtractError> {
        let mut archive = open_archive(bytes)?;
        let total = archive.len();
        if total == 0 {
            return Err(ExtractError::EmptyArchive);
        }

        // Resolve every entry first so a hostile name aborts before anything is written.
        let mut plan = Vec::with_capacity(total);
        for index in 0..total {
            let entry = archive
                .by_index(index)
                .map_err(|e| ExtractError::InvalidArchive(e.to_string()))?;
            let raw_name = entry.name().replace('\\', "/");
            let selected = match options.path_selector {
                Some(selector) => match selector(&raw_name) {
                    Some(name) if !name.trim().is_empty() => name,
                    _ => {
                        debug!("archive: skipping entry {raw_name}");
                        continue;
                    }
                },
                None => raw_name.clone(),
            };
            let is_dir = entry.is_dir() || selected.ends_with('/');
            let Some(target) = resolve_entry_path(destination, &selected)? else {
                continue;
            };
            plan.push(PlannedEntry { index, target, is_dir });
        }

        fs::create_dir_all(destination).map_err(|source| ExtractError::Io {
            path: destination.to_path_buf(),
            source,
        })?;

        let mut result = ExtractionResult::default();
        let planned = plan.len().max(1);
        for (done, planned_entry) in plan.into_iter().enumerate() {
            let target = planned_entry.target;
            if planned_entry.is_dir {
                fs::create_dir_all(&target).map_err(|source| ExtractError::Io {
                    path: target.clone(),
                    source,
                })?;
                result.extracted_entries.push(target);
            } else if target.exists() && !options.overwrite {
                debug!("archive: keeping existing {}", target.display());
            } else {
                let mut entry = archive
                    .by_index(planned_entry.index)
                    .map_err(|e| ExtractError::InvalidArchive(e.to_string()))?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|source| ExtractError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                // Streamed so a forged uncompressed size in the header never drives an allocation.
                let mut file = fs::File::create(&target).map_err(|source| ExtractError::Io {
                    path: target.clone(),
                    source,
                })?;
                io::copy(&mut entry, &mut file)
                    .map_err(|e| ExtractError::InvalidArchive(format!("{}: {e}", entry.name())))?;
                #[cfg(unix)]
                if let Some(mode) = entry.unix_mode() {
                    use std::os::unix::fs::PermissionsExt;
                    if let Err(err) = fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o777)) {
                        warn!("archive: unable to set permissions on {}: {err}", target.display());
                    }
                }
                result.extracted_entries.push(target);
            }

            if let Some(callback) = options.progress.as_deref_mut() {
                callback(((done + 1) as f32 / planned as f32) * 100.0);
            }
        }

        info!(
            "archive: extracted {} entries into {}",
            result.extracted_entries.len(),
            destination.display()
        );
        Ok(result)
    }
}

fn open_archive(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, ExtractError> {
    if bytes.is_empty() {
        return Err(ExtractError::EmptyArchive);
    }
    ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::InvalidArchive(e.to_string()))
}

/// Lexically resolve an entry name under `root`. `Ok(None)` means the entry names the root itself.
fn resolve_entry_path(root: &Path, name: &str) -> Result<Option<PathBuf>, ExtractError> {
    let traversal = || ExtractError::PathTraversal {
        entry: name.to_owned(),
    };
    let candidate = Path::new(name);
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => {
                let text = part.to_string_lossy();
                // A drive-qualified segment ("C:") would rebase the path on Windows.
                if text.contains(':') {
                    return Err(traversal());
                }
                parts.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(traversal());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(traversal()),
        }
    }
    if parts.is_empty() {
        return Ok(None);
    }
    let resolved = parts.iter().fold(root.to_path_buf(), |acc, part| acc.join(part));
    if !resolved.starts_with(root) {
        return Err(traversal());
    }
    Ok(Some(resolved))
}

/// The single top-level folder shared by every entry, if there is one (e.g. `Mix It Up/`).
pub fn common_root_folder(names: &[String]) -> Option<String> {
    let mut root: Option<&str> = None;
    let mut nested = false;
    for name in names {
        let name = name.trim_start_matches("./");
        let (first, rest) = match name.split_once(['/', '\\']) {
            Some(split) => split,
            None => return None,
        };
        if first.is_empty() {
            return None;
        }
        match root {
            None => root = Some(first),
            Some(existing) if existing == first => {}
            Some(_) => return None,
        }
        if !rest.is_empty() {
            nested = true;
        }
    }
    if nested { root.map(|r| format!("{r}/")) } else { None }
}

/// Selector that strips `prefix` from entry names and skips the prefix folder itself.
pub fn strip_prefix_selector(prefix: String) -> impl Fn(&str) -> Option<String> {
    move |name: &str| {
        let name = name.trim_start_matches("./");
        let stripped = name.strip_prefix(prefix.as_str()).unwrap_or(name);
        (!stripped.is_empty()).then(|| stripped.to_owned())
    }
}
