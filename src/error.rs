use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// What went wrong on disk, so the user knows whether to check space, permissions or the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesystemErrorKind {
    Io,
    PermissionDenied,
    InsufficientSpace,
    CorruptPackage,
    PathTraversal,
}

/// Every failure the distribution pipeline can surface.
#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("request to {endpoint} failed{}: {message}", status_suffix(.status))]
    Transport {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },
    #[error("checksum mismatch for {endpoint}: expected {expected}, got {actual}")]
    Integrity {
        endpoint: String,
        expected: String,
        actual: String,
    },
    #[error("{message}{}", path_suffix(.path))]
    Filesystem {
        path: Option<PathBuf>,
        kind: FilesystemErrorKind,
        message: String,
    },
    #[error("{message}")]
    State { message: String },
    /// Something the user has to fix before retrying (unsupported OS, app still running).
    #[error("{message}")]
    Precondition { message: String },
    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T, E = DistributionError> = std::result::Result<T, E>;

impl DistributionError {
    pub fn transport(endpoint: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            status,
            message: message.into(),
        }
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    pub fn filesystem(kind: FilesystemErrorKind, path: Option<&Path>, message: impl Into<String>) -> Self {
        Self::Filesystem {
            path: path.map(Path::to_path_buf),
            kind,
            message: message.into(),
        }
    }

    /// Wrap an I/O error, classifying permission and disk-full failures.
    pub fn io(context: impl Into<String>, path: &Path, err: io::Error) -> Self {
        Self::Filesystem {
            path: Some(path.to_path_buf()),
            kind: classify(&err),
            message: format!("{}: {err}", context.into()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Message shown to the user, pointing at the log for unexpected failures.
    pub fn user_message(&self, log_path: Option<&Path>) -> String {
        match self {
            Self::Transport { .. } => format!(
                "Unable to download the update ({self}). Please check your internet connection and try again."
            ),
            Self::Integrity { .. } => {
                "The downloaded package was corrupted. Please run the installer again to retry the download.".into()
            }
            Self::Filesystem { kind, .. } => match kind {
                FilesystemErrorKind::PermissionDenied => format!(
                    "Access was denied while writing files ({self}). Check folder permissions or run as administrator."
                ),
                FilesystemErrorKind::InsufficientSpace => format!("Not enough disk space: {self}"),
                FilesystemErrorKind::CorruptPackage | FilesystemErrorKind::PathTraversal => format!(
                    "The downloaded package appears to be corrupt ({self}). Please try again."
                ),
                FilesystemErrorKind::Io => format!("A file operation failed: {self}"),
            },
            Self::State { .. } => match log_path {
                Some(path) => format!(
                    "An unexpected error occurred. See the log for details: {}",
                    path.display()
                ),
                None => "An unexpected error occurred. See the log for details.".into(),
            },
            Self::Precondition { message } => message.clone(),
            Self::Cancelled => "The operation was cancelled.".into(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" with status {code}")).unwrap_or_default()
}

fn path_suffix(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" ({})", p.display()))
        .unwrap_or_default()
}

fn classify(err: &io::Error) -> FilesystemErrorKind {
    match err.kind() {
        io::ErrorKind::PermissionDenied => FilesystemErrorKind::PermissionDenied,
        io::ErrorKind::StorageFull => FilesystemErrorKind::InsufficientSpace,
        _ => FilesystemErrorKind::Io,
    }
}

/// Failures raised by the zip extractor.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("archive is empty")]
    EmptyArchive,
    #[error("archive is invalid: {0}")]
    InvalidArchive(String),
    #[error("entry '{entry}' resolves outside the destination")]
    PathTraversal { entry: String },
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<ExtractError> for DistributionError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::EmptyArchive | ExtractError::InvalidArchive(_) => {
                DistributionError::filesystem(FilesystemErrorKind::CorruptPackage, None, err.to_string())
            }
            ExtractError::PathTraversal { .. } => {
                DistributionError::filesystem(FilesystemErrorKind::PathTraversal, None, err.to_string())
            }
            ExtractError::Io { path, source } => DistributionError::io("extraction failed", &path, source),
        }
    }
}

/// Failures raised while loading or saving persisted configs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config {} is malformed: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config for {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<ConfigError> for DistributionError {
    fn from(err: ConfigError) -> Self {
        let message = err.to_string();
        match err {
            ConfigError::Read { path, source } | ConfigError::Write { path, source } => {
                DistributionError::Filesystem {
                    path: Some(path),
                    kind: classify(&source),
                    message,
                }
            }
            _ => DistributionError::state(message),
        }
    }
}

/// Render an error with its whole source chain for the log.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(source) = current {
        out.push_str(": ");
        out.push_str(&source.to_string());
        current = source.source();
    }
    out
}
