use std::fs;
use std::path::Path;
use std::process::Command;

use log::{debug, info};

use crate::error::{DistributionError, FilesystemErrorKind, Result};

/// Creates a shortcut file at `path` pointing to `target`.
pub trait ShortcutCreator: Send + Sync {
    fn create(&self, path: &Path, target: &Path, working_dir: &Path, icon: Option<&Path>) -> Result<()>;
}

/// Windows `.lnk` creation through `WScript.Shell`, driven by PowerShell.
pub struct PowerShellShortcutCreator;

impl ShortcutCreator for PowerShellShortcutCreator {
    fn create(&self, path: &Path, target: &Path, working_dir: &Path, icon: Option<&Path>) -> Result<()> {
        let quote = |p: &Path| p.to_string_lossy().replace('\'', "''");
        let icon = icon.unwrap_or(target);
        let script = format!(
            "$WshShell = New-Object -ComObject WScript.Shell; \
             $Shortcut = $WshShell.CreateShortcut('{}'); \
             $Shortcut.TargetPath = '{}'; \
             $Shortcut.WorkingDirectory = '{}'; \
             $Shortcut.IconLocation = '{},0'; \
             $Shortcut.Save()",
            quote(path),
            quote(target),
            quote(working_dir),
            quote(icon)
        );

        let mut command = Command::new("powershell");
        command.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            // CREATE_NO_WINDOW
            command.creation_flags(0x0800_0000);
        }

        let output = command
            .output()
            .map_err(|e| DistributionError::io("unable to start powershell", path, e))?;
        if !output.status.success() {
            return Err(DistributionError::filesystem(
                FilesystemErrorKind::Io,
                Some(path),
                format!(
                    "shortcut creation failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(())
    }
}

/// Non-Windows stand-in: a symlink to the target.
pub struct SymlinkShortcutCreator;

impl ShortcutCreator for SymlinkShortcutCreator {
    fn create(&self, path: &Path, target: &Path, _working_dir: &Path, _icon: Option<&Path>) -> Result<()> {
        if fs::symlink_metadata(path).is_ok() {
            fs::remove_file(path).map_err(|e| DistributionError::io("unable to replace shortcut", path, e))?;
        }
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, path)
                .map_err(|e| DistributionError::io("unable to create shortcut", path, e))
        }
        #[cfg(not(unix))]
        {
            debug!("shortcuts: symlinks unsupported, skipping {}", path.display());
            let _ = target;
            Ok(())
        }
    }
}

/// The creator for the current platform.
pub fn platform_creator() -> Box<dyn ShortcutCreator> {
    if cfg!(target_os = "windows") {
        Box::new(PowerShellShortcutCreator)
    } else {
        Box::new(SymlinkShortcutCreator)
    }
}

/// Place a shortcut at `path`: copy `template` when one is bundled, otherwise ask `creator`.
pub fn install_shortcut(
    creator: &dyn ShortcutCreator,
    template: Option<&Path>,
    path: &Path,
    target: &Path,
    working_dir: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DistributionError::io("unable to create shortcut folder", parent, e))?;
    }
    if let Some(template) = template.filter(|t| t.is_file()) {
        match fs::copy(template, path) {
            Ok(_) => {
                info!("shortcuts: copied template to {}", path.display());
                return Ok(());
            }
            Err(err) => debug!("shortcuts: template copy failed ({err}), creating shortcut instead"),
        }
    }
    creator.create(path, target, working_dir, Some(target))?;
    info!("shortcuts: created {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCreator {
        calls: Mutex<Vec<String>>,
    }

    impl ShortcutCreator for RecordingCreator {
        fn create(&self, path: &Path, target: &Path, _wd: &Path, _icon: Option<&Path>) -> Result<()> {
            fs::write(path, target.to_string_lossy().as_bytes()).unwrap();
            self.calls.lock().unwrap().push(path.display().to_string());
            Ok(())
        }
    }

    #[test]
    fn template_copy_wins_over_creator() {
        let tmp = tempfile::tempdir().unwrap();
        let template = tmp.path().join("template.lnk");
        fs::write(&template, "template").unwrap();
        let creator = RecordingCreator::default();
        let path = tmp.path().join("Start Menu").join("Mix It Up.lnk");

        install_shortcut(&creator, Some(&template), &path, Path::new("MixItUp.exe"), tmp.path()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "template");
        assert!(creator.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn falls_back_to_creator_without_template() {
        let tmp = tempfile::tempdir().unwrap();
        let creator = RecordingCreator::default();
        let path = tmp.path().join("Mix It Up.lnk");
        let missing = tmp.path().join("missing.lnk");

        install_shortcut(&creator, Some(&missing), &path, Path::new("MixItUp.exe"), tmp.path()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "MixItUp.exe");
        assert_eq!(creator.calls.lock().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_creator_points_at_target() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("MixItUp.exe");
        fs::write(&target, "exe").unwrap();
        let link = tmp.path().join("Mix It Up.lnk");
        SymlinkShortcutCreator.create(&link, &target, tmp.path(), None).unwrap();
        SymlinkShortcutCreator.create(&link, &target, tmp.path(), None).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), target);
    }
}
