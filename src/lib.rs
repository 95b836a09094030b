//! Update distribution for the Mix It Up desktop app: manifest resolution, verified
//! downloads, safe extraction, transactional installs, version retention and the
//! persisted launcher configuration.

pub mod archive;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod events;
pub mod host;
pub mod installer;
pub mod launcher;
pub mod logging;
pub mod models;
pub mod networking;
pub mod package;
pub mod policy;
pub mod process;
pub mod settings;
pub mod transaction;
pub mod uninstaller;
pub mod userdata;
pub mod util;
pub mod version;

pub use error::{DistributionError, Result};
