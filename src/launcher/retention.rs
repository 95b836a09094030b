use std::cmp::Reverse;

use crate::package::VersionDir;

/// Split version directories into kept and pruned. The target version is always kept,
/// then the most recently modified others, up to `retention` (at least 1) in total.
pub fn select_retained(mut dirs: Vec<VersionDir>, target: &str, retention: u32) -> (Vec<VersionDir>, Vec<VersionDir>) {
    let retention = retention.max(1) as usize;
    dirs.sort_by_key(|dir| (!dir.name.eq_ignore_ascii_case(target), Reverse(dir.modified)));
    let pruned = if dirs.len() > retention {
        dirs.split_off(retention)
    } else {
        Vec::new()
    };
    (dirs, pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};

    fn dir(name: &str, age_secs: u64) -> VersionDir {
        VersionDir {
            name: name.into(),
            path: PathBuf::from(name),
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 - age_secs),
        }
    }

    fn names(dirs: &[VersionDir]) -> Vec<&str> {
        dirs.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn keeps_target_and_newest_others() {
        let dirs = vec![
            dir("1.0.0", 400),
            dir("1.1.0", 300),
            dir("1.2.0", 200),
            dir("1.3.0", 100),
            dir("2.0.0", 500),
        ];
        let (kept, pruned) = select_retained(dirs, "2.0.0", 3);
        assert_eq!(names(&kept), vec!["2.0.0", "1.3.0", "1.2.0"]);
        assert_eq!(names(&pruned), vec!["1.1.0", "1.0.0"]);
    }

    #[test]
    fn nothing_pruned_under_the_limit() {
        let (kept, pruned) = select_retained(vec![dir("1.0.0", 1), dir("2.0.0", 2)], "2.0.0", 3);
        assert_eq!(kept.len(), 2);
        assert!(pruned.is_empty());
    }

    #[test]
    fn retention_of_zero_still_keeps_target() {
        let (kept, pruned) = select_retained(vec![dir("1.0.0", 1), dir("2.0.0", 2)], "2.0.0", 0);
        assert_eq!(names(&kept), vec!["2.0.0"]);
        assert_eq!(names(&pruned), vec!["1.0.0"]);
    }
}
