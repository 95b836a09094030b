use std::path::Path;

use log::debug;

use crate::error::{DistributionError, FilesystemErrorKind, Result};
use crate::util::format_size;

/// Floor for the space check when the package size is unknown or small.
pub const MIN_REQUIRED_BYTES: u64 = 50 * 1024 * 1024;

/// `max(size_hint, 50 MiB) * 1.3`
pub fn required_space(size_hint: Option<u64>) -> u64 {
    let base = size_hint.unwrap_or(0).max(MIN_REQUIRED_BYTES);
    base.saturating_mul(13).div_ceil(10)
}

/// Compare a requirement with what the volume has free.
pub fn check_space(target: &Path, required: u64, available: u64) -> Result<()> {
    if available >= required {
        return Ok(());
    }
    Err(DistributionError::filesystem(
        FilesystemErrorKind::InsufficientSpace,
        Some(target),
        format!(
            "{} required, {} available",
            format_size(required),
            format_size(available)
        ),
    ))
}

/// Fail when the volume holding `target` cannot fit a package of `size_hint` bytes.
pub fn ensure_free_space(target: &Path, size_hint: Option<u64>) -> Result<()> {
    // Query the nearest existing ancestor; the target itself may not exist yet.
    let probe = target
        .ancestors()
        .find(|p| p.exists())
        .unwrap_or(target);
    let available = fs2::available_space(probe)
        .map_err(|e| DistributionError::io("unable to query free disk space", probe, e))?;
    let required = required_space(size_hint);
    debug!(
        "disk: {} required, {} available at {}",
        format_size(required),
        format_size(available),
        probe.display()
    );
    check_space(target, required, available)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_packages_use_the_floor() {
        assert_eq!(required_space(None), 65 * 1024 * 1024);
        assert_eq!(required_space(Some(1024)), required_space(None));
    }

    #[test]
    fn large_packages_get_a_margin() {
        let hint = 200 * 1024 * 1024;
        assert_eq!(required_space(Some(hint)), 260 * 1024 * 1024);
    }

    #[test]
    fn reports_required_and_available() {
        let err = check_space(Path::new("C:/MixItUp"), 2048, 1024).unwrap_err();
        match err {
            DistributionError::Filesystem { kind, message, .. } => {
                assert_eq!(kind, FilesystemErrorKind::InsufficientSpace);
                assert!(message.contains("2.0 KB required"));
                assert!(message.contains("1.0 KB available"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(check_space(Path::new("."), 10, 10).is_ok());
    }

    #[test]
    fn queries_existing_ancestor() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("not").join("yet");
        // Any real volume has more than zero bytes free, so only the query path matters here.
        let result = ensure_free_space(&missing, Some(0));
        if let Err(err) = result {
            assert!(matches!(
                err,
                DistributionError::Filesystem {
                    kind: FilesystemErrorKind::InsufficientSpace,
                    ..
                }
            ));
        }
    }
}
