//! Persisted launcher and bootloader configuration: pure merge builders plus JSON I/O.

mod builder;
mod service;

pub use builder::{BootloaderConfigBuilder, BootloaderConfigUpdate, LauncherConfigBuilder, LauncherConfigUpdate};
pub use service::{BootloaderConfigService, LauncherConfigService};
