use std::path::PathBuf;
use std::process::Command;

use log::{info, warn};

use crate::env;
use crate::error::{DistributionError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryHive {
    LocalMachine,
    CurrentUser,
}

impl RegistryHive {
    pub fn prefix(self) -> &'static str {
        match self {
            RegistryHive::LocalMachine => "HKLM",
            RegistryHive::CurrentUser => "HKCU",
        }
    }
}

/// Values written under the product's uninstall key.
#[derive(Clone, Debug)]
pub struct UninstallEntry {
    pub display_name: String,
    pub display_version: String,
    pub publisher: String,
    pub install_location: PathBuf,
    pub display_icon: PathBuf,
    pub uninstall_command: String,
}

impl UninstallEntry {
    fn string_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("DisplayName", self.display_name.clone()),
            ("DisplayVersion", self.display_version.clone()),
            ("Publisher", self.publisher.clone()),
            ("InstallLocation", self.install_location.display().to_string()),
            ("DisplayIcon", self.display_icon.display().to_string()),
            ("UninstallString", self.uninstall_command.clone()),
        ]
    }
}

/// Writes and removes the uninstall registration.
pub trait UninstallRegistrar: Send + Sync {
    fn register(&self, hive: RegistryHive, entry: &UninstallEntry) -> Result<()>;
    fn unregister(&self, hive: RegistryHive) -> Result<()>;
}

/// Windows registrar shelling out to `reg.exe`.
pub struct RegExeRegistrar;

impl RegExeRegistrar {
    fn key(hive: RegistryHive) -> String {
        format!(r"{}\{}", hive.prefix(), env::UNINSTALL_KEY)
    }

    fn run(args: &[&str]) -> Result<()> {
        let output = Command::new("reg").args(args).output().map_err(|e| {
            DistributionError::state(format!("unable to run reg.exe: {e}"))
        })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DistributionError::state(format!(
                "reg {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl UninstallRegistrar for RegExeRegistrar {
    fn register(&self, hive: RegistryHive, entry: &UninstallEntry) -> Result<()> {
        write_key(&Self::key(hive), entry, &Self::run)
    }

    fn unregister(&self, hive: RegistryHive) -> Result<()> {
        Self::run(&["delete", &Self::key(hive), "/f"])
    }
}

/// `reg add` argument lists for every value of `entry` under `key`.
fn add_commands(key: &str, entry: &UninstallEntry) -> Vec<Vec<String>> {
    let strings = entry
        .string_values()
        .into_iter()
        .map(|(name, value)| (name, "REG_SZ", value));
    let flags = ["NoModify", "NoRepair"].map(|name| (name, "REG_DWORD", "1".to_owned()));
    strings
        .chain(flags)
        .map(|(name, kind, value)| {
            ["add", key, "/v", name, "/t", kind, "/d", value.as_str(), "/f"]
                .map(str::to_owned)
                .to_vec()
        })
        .collect()
}

/// Write each value with `run`; a failure part way deletes the key again.
fn write_key(key: &str, entry: &UninstallEntry, run: &dyn Fn(&[&str]) -> Result<()>) -> Result<()> {
    for command in add_commands(key, entry) {
        let args: Vec<&str> = command.iter().map(String::as_str).collect();
        if let Err(err) = run(&args) {
            if let Err(cleanup) = run(&["delete", key, "/f"]) {
                warn!("registry: unable to remove partial key {key}: {cleanup}");
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Registrar for platforms without a registry.
pub struct NoopRegistrar;

impl UninstallRegistrar for NoopRegistrar {
    fn register(&self, hive: RegistryHive, entry: &UninstallEntry) -> Result<()> {
        info!(
            "registry: no registry on this platform, skipping {} entry for {}",
            hive.prefix(),
            entry.display_name
        );
        Ok(())
    }

    fn unregister(&self, _hive: RegistryHive) -> Result<()> {
        Ok(())
    }
}

pub fn platform_registrar() -> Box<dyn UninstallRegistrar> {
    if cfg!(target_os = "windows") {
        Box::new(RegExeRegistrar)
    } else {
        Box::new(NoopRegistrar)
    }
}

/// Hives to try, in order: machine-wide only when elevated, then per-user.
pub fn candidate_hives(elevated: bool) -> Vec<RegistryHive> {
    if elevated {
        vec![RegistryHive::LocalMachine, RegistryHive::CurrentUser]
    } else {
        vec![RegistryHive::CurrentUser]
    }
}

/// Register under the first hive that accepts the entry. Failing every hive is an error.
pub fn register_uninstall(
    registrar: &dyn UninstallRegistrar,
    elevated: bool,
    entry: &UninstallEntry,
) -> Result<RegistryHive> {
    let mut last_error = None;
    for hive in candidate_hives(elevated) {
        match registrar.register(hive, entry) {
            Ok(()) => {
                info!("registry: registered uninstall entry under {}", hive.prefix());
                return Ok(hive);
            }
            Err(err) => {
                warn!("registry: {} registration failed: {err}", hive.prefix());
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| DistributionError::state("no registry hive available")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeRegistrar {
        fail: Vec<RegistryHive>,
        written: Mutex<Vec<RegistryHive>>,
    }

    impl UninstallRegistrar for FakeRegistrar {
        fn register(&self, hive: RegistryHive, _entry: &UninstallEntry) -> Result<()> {
            if self.fail.contains(&hive) {
                return Err(DistributionError::state("access denied"));
            }
            self.written.lock().unwrap().push(hive);
            Ok(())
        }

        fn unregister(&self, _hive: RegistryHive) -> Result<()> {
            Ok(())
        }
    }

    fn entry() -> UninstallEntry {
        UninstallEntry {
            display_name: "Mix It Up".into(),
            display_version: "1.0.0".into(),
            publisher: "Mix It Up".into(),
            install_location: PathBuf::from("C:/MixItUp"),
            display_icon: PathBuf::from("C:/MixItUp/MixItUp.exe"),
            uninstall_command: "\"C:/MixItUp/MixItUp.Uninstaller.exe\"".into(),
        }
    }

    #[test]
    fn failed_value_write_removes_the_partial_key() {
        let calls = Mutex::new(Vec::<String>::new());
        let run = |args: &[&str]| -> Result<()> {
            let mut calls = calls.lock().unwrap();
            calls.push(args.join(" "));
            if args.contains(&"Publisher") {
                return Err(DistributionError::state("access denied"));
            }
            Ok(())
        };

        let err = write_key(r"HKCU\Software\Test", &entry(), &run).unwrap_err();

        assert!(matches!(err, DistributionError::State { .. }));
        let calls = calls.into_inner().unwrap();
        assert_eq!(calls.len(), 4);
        assert!(calls[0].contains("DisplayName"));
        assert_eq!(calls[3], r"delete HKCU\Software\Test /f");
    }

    #[test]
    fn every_value_is_written_once() {
        let commands = add_commands("KEY", &entry());
        assert_eq!(commands.len(), 8);
        assert_eq!(
            commands[7],
            ["add", "KEY", "/v", "NoRepair", "/t", "REG_DWORD", "/d", "1", "/f"].map(str::to_owned).to_vec()
        );
    }

    #[test]
    fn unelevated_writes_current_user_only() {
        let fake = FakeRegistrar {
            fail: vec![],
            written: Mutex::new(vec![]),
        };
        assert_eq!(register_uninstall(&fake, false, &entry()).unwrap(), RegistryHive::CurrentUser);
        assert_eq!(*fake.written.lock().unwrap(), vec![RegistryHive::CurrentUser]);
    }

    #[test]
    fn elevated_prefers_local_machine_then_falls_back() {
        let fake = FakeRegistrar {
            fail: vec![RegistryHive::LocalMachine],
            written: Mutex::new(vec![]),
        };
        assert_eq!(register_uninstall(&fake, true, &entry()).unwrap(), RegistryHive::CurrentUser);
    }

    #[test]
    fn failing_every_hive_is_an_error() {
        let fake = FakeRegistrar {
            fail: vec![RegistryHive::CurrentUser],
            written: Mutex::new(vec![]),
        };
        assert!(register_uninstall(&fake, false, &entry()).is_err());
    }
}
