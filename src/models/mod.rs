pub mod config;
pub mod manifest;
pub mod policy;

pub use config::{BootloaderConfigModel, LauncherConfigModel, PolicyAcceptanceRecord};
pub use manifest::{ManifestFile, PlatformEntry, UpdateManifest, UpdatePackageInfo};
pub use policy::{PolicyContent, PolicyDocumentState, PolicyInfo, PolicyManifest};
