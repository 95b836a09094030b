use std::fs;
use std::path::Path;

use crate::error::{DistributionError, Result};

/// Check that `dir` is writable by creating and deleting a temp file in it.
pub fn probe_write_access(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| DistributionError::io("unable to create folder", dir, e))?;
    let probe = dir.join(format!(".write-probe-{}.tmp", std::process::id()));
    fs::write(&probe, b"probe").map_err(|e| DistributionError::io("folder is not writable", dir, e))?;
    fs::remove_file(&probe).map_err(|e| DistributionError::io("unable to remove probe file", &probe, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_leaves_no_trace() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("Start Menu");
        probe_write_access(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn probe_fails_when_parent_is_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("blocker");
        fs::write(&file, "x").unwrap();
        assert!(probe_write_access(&file.join("child")).is_err());
    }
}
