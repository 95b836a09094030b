use std::process::Command;
use std::time::Duration;

use log::{debug, info, warn};
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

/// Seconds to wait for processes to exit.
pub const CLOSE_TIMEOUT_TICKS: u32 = 10;
/// Tick at which a polite close request is sent.
pub const POLITE_CLOSE_TICK: u32 = 5;

/// Process names the installer and uninstaller wait on.
pub const KNOWN_PROCESS_NAMES: [&str; 2] = ["MixItUp.exe", "MixItUp.Launcher.exe"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunningProcess {
    pub pid: u32,
    pub name: String,
}

/// Process table access, swapped out in tests.
pub trait ProcessController: Send + Sync {
    fn find(&self, names: &[String]) -> Vec<RunningProcess>;
    /// Ask a process to exit without forcing it.
    fn request_close(&self, process: &RunningProcess);
}

/// `sysinfo`-backed controller for the real process table.
pub struct SystemProcesses;

impl ProcessController for SystemProcesses {
    fn find(&self, names: &[String]) -> Vec<RunningProcess> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        let own_pid = std::process::id();
        system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != own_pid)
            .filter_map(|(pid, process)| {
                let name = process.name().to_string_lossy().into_owned();
                names
                    .iter()
                    .any(|known| matches_process_name(known, &name))
                    .then(|| RunningProcess {
                        pid: pid.as_u32(),
                        name,
                    })
            })
            .collect()
    }

    fn request_close(&self, process: &RunningProcess) {
        if cfg!(target_os = "windows") {
            // Without /F taskkill posts WM_CLOSE so the app can shut down cleanly.
            let status = Command::new("taskkill")
                .args(["/PID", &process.pid.to_string()])
                .output();
            if let Err(err) = status {
                warn!("processes: taskkill for {} failed: {err}", process.pid);
            }
            return;
        }
        let mut system = System::new();
        let pid = Pid::from_u32(process.pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        if let Some(handle) = system.process(pid)
            && handle.kill_with(Signal::Term) != Some(true)
        {
            warn!("processes: unable to signal {} ({})", process.name, process.pid);
        }
    }
}

/// Case-insensitive match that ignores a trailing `.exe` on either side.
pub fn matches_process_name(known: &str, actual: &str) -> bool {
    fn stem(name: &str) -> String {
        let lower = name.trim().to_lowercase();
        lower.strip_suffix(".exe").map(str::to_owned).unwrap_or(lower)
    }
    stem(known) == stem(actual)
}

/// Wait for the named processes to exit, asking them politely at the halfway mark.
/// Returns the names still running after the timeout.
pub async fn close_processes(
    controller: &dyn ProcessController,
    names: &[String],
    tick: Duration,
) -> Result<(), Vec<String>> {
    for elapsed in 0..CLOSE_TIMEOUT_TICKS {
        let running = controller.find(names);
        if running.is_empty() {
            debug!("processes: none running after {elapsed} tick(s)");
            return Ok(());
        }
        if elapsed == POLITE_CLOSE_TICK {
            for process in &running {
                info!("processes: requesting {} ({}) to close", process.name, process.pid);
                controller.request_close(process);
            }
        }
        tokio::time::sleep(tick).await;
    }

    let mut remaining: Vec<String> = controller.find(names).into_iter().map(|p| p.name).collect();
    if remaining.is_empty() {
        return Ok(());
    }
    remaining.sort();
    remaining.dedup();
    warn!("processes: still running after timeout: {}", remaining.join(", "));
    Err(remaining)
}
