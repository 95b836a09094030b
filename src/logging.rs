use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use env_logger::{Builder, Env, Target};

/// Log files kept per prefix; older ones are deleted at startup.
pub const KEEP_LOG_FILES: usize = 10;

/// Writes every log line to stderr and a per-run file.
struct TeeWriter {
    file: Option<File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            // Drop the file after the first failed write; stderr keeps going.
            if file.write_all(buf).is_err() {
                self.file = None;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Initialise logging (`RUST_LOG`, default `info`) and return the log file in use, if any.
pub fn init(log_dir: &Path, prefix: &str) -> Option<PathBuf> {
    let (path, file) = match open_log_file(log_dir, prefix) {
        Some((path, file)) => (Some(path), Some(file)),
        None => (None, None),
    };

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(TeeWriter { file })));
    // try_init: a second call keeps the first logger.
    let _ = builder.try_init();

    if let Some(path) = &path {
        log::info!("logging: writing to {}", path.display());
    }
    path
}

fn open_log_file(log_dir: &Path, prefix: &str) -> Option<(PathBuf, File)> {
    fs::create_dir_all(log_dir).ok()?;
    let name = format!("{prefix}-{}.log", Local::now().format("%Y%m%d-%H%M%S"));
    let path = log_dir.join(name);
    let file = File::create(&path).ok()?;
    let _ = prune_old_logs(log_dir, prefix, KEEP_LOG_FILES);
    Some((path, file))
}

/// Delete all but the `keep` newest `<prefix>-*.log` files. Returns how many were removed.
pub fn prune_old_logs(log_dir: &Path, prefix: &str, keep: usize) -> io::Result<usize> {
    let lead = format!("{prefix}-");
    let mut logs: Vec<PathBuf> = fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&lead) && n.ends_with(".log"))
        })
        .collect();
    // Timestamped names sort chronologically.
    logs.sort();
    let excess = logs.len().saturating_sub(keep);
    let mut removed = 0;
    for path in logs.into_iter().take(excess) {
        if fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prunes_only_oldest_matching_files() {
        let tmp = tempfile::tempdir().unwrap();
        for day in 1..=5 {
            fs::write(tmp.path().join(format!("installer-2024010{day}-120000.log")), "x").unwrap();
        }
        fs::write(tmp.path().join("launcher-20240101-120000.log"), "x").unwrap();
        fs::write(tmp.path().join("installer-notes.txt"), "x").unwrap();

        let removed = prune_old_logs(tmp.path(), "installer", 2).unwrap();
        assert_eq!(removed, 3);
        assert!(tmp.path().join("installer-20240104-120000.log").exists());
        assert!(tmp.path().join("installer-20240105-120000.log").exists());
        assert!(!tmp.path().join("installer-20240101-120000.log").exists());
        assert!(tmp.path().join("launcher-20240101-120000.log").exists());
        assert!(tmp.path().join("installer-notes.txt").exists());
    }
}
