//! Everything the orchestrators need from the machine: OS facts, processes,
//! shortcuts, uninstall registration, disk space and write access.

pub mod disk;
pub mod os;
pub mod processes;
pub mod registry;
pub mod shortcuts;
pub mod write_probe;

use std::time::Duration;

pub use os::{EnvironmentRequirements, HostEnvironment, OsDescriptor, OsPlatform};
pub use processes::{ProcessController, RunningProcess, SystemProcesses};
pub use registry::{RegistryHive, UninstallEntry, UninstallRegistrar};
pub use shortcuts::ShortcutCreator;

/// Host capabilities bundled for an orchestrator.
pub struct HostServices {
    pub environment: HostEnvironment,
    pub processes: Box<dyn ProcessController>,
    pub shortcuts: Box<dyn ShortcutCreator>,
    pub registrar: Box<dyn UninstallRegistrar>,
    /// Names of processes that must exit before files are touched.
    pub process_names: Vec<String>,
    /// Polling interval while waiting for processes to exit.
    pub process_tick: Duration,
}

impl HostServices {
    /// Real capabilities for the running platform.
    pub fn detect() -> Self {
        Self {
            environment: HostEnvironment::detect(),
            processes: Box::new(SystemProcesses),
            shortcuts: shortcuts::platform_creator(),
            registrar: registry::platform_registrar(),
            process_names: processes::KNOWN_PROCESS_NAMES
                .iter()
                .map(|name| name.to_string())
                .collect(),
            process_tick: Duration::from_secs(1),
        }
    }
}
