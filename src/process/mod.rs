use std::path::Path;
use std::process::{Command, Stdio};

use log::{debug, info, warn};

use crate::error::{DistributionError, Result};

/// Start `executable` detached from this process, with `working_dir` as its working directory.
pub fn spawn_detached(executable: &Path, working_dir: &Path, args: &[String]) -> Result<u32> {
    if !executable.is_file() {
        warn!("launch: executable not found at {}", executable.display());
        return Err(DistributionError::state(format!(
            "executable not found at {}",
            executable.display()
        )));
    }

    let mut command = Command::new(executable);
    command
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        // CREATE_NO_WINDOW | DETACHED_PROCESS
        command.creation_flags(0x08000000 | 0x00000008);
    }

    debug!(
        "launch: exe={} cwd={} args={args:?}",
        executable.display(),
        working_dir.display()
    );
    let child = command
        .spawn()
        .map_err(|e| DistributionError::io("failed to start process", executable, e))?;
    info!("launch: started {} (pid {})", executable.display(), child.id());
    Ok(child.id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_executable_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let err = spawn_detached(&tmp.path().join("MixItUp.exe"), tmp.path(), &[]).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
