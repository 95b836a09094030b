use std::env;
use std::path::PathBuf;
use std::process::Command;

use log::debug;
use sysinfo::System;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OsPlatform {
    /// Any Windows NT kernel.
    WindowsNt,
    MacOs,
    Linux,
    Other,
}

/// Platform plus `major.minor.build` of the running OS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OsDescriptor {
    pub platform: OsPlatform,
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl OsDescriptor {
    pub fn windows(major: u32, minor: u32, build: u32) -> Self {
        Self {
            platform: OsPlatform::WindowsNt,
            major,
            minor,
            build,
        }
    }

    /// Best effort detection; `None` when the version cannot be determined.
    pub fn detect() -> Option<Self> {
        match env::consts::OS {
            "windows" => {
                let reported = System::os_version();
                let descriptor = reported
                    .as_deref()
                    .and_then(parse_windows_ver)
                    .map(|descriptor| with_kernel_build(descriptor, System::kernel_version().as_deref()))
                    .or_else(|| {
                        let output = Command::new("cmd").args(["/C", "ver"]).output().ok()?;
                        parse_windows_ver(&String::from_utf8_lossy(&output.stdout))
                    });
                debug!("host: os version {reported:?} -> {descriptor:?}");
                descriptor
            }
            "macos" => Some(Self {
                platform: OsPlatform::MacOs,
                ..Self::from_dotted(&System::os_version()?)
            }),
            "linux" => Some(Self {
                platform: OsPlatform::Linux,
                ..Self::from_dotted(&System::kernel_version()?)
            }),
            _ => None,
        }
    }

    fn from_dotted(text: &str) -> Self {
        let mut parts = text
            .trim()
            .split(['.', '-'])
            .map(|part| part.parse::<u32>().unwrap_or(0));
        Self {
            platform: OsPlatform::Other,
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            build: parts.next().unwrap_or(0),
        }
    }
}

/// Fill in the build number when the version text did not carry one.
fn with_kernel_build(mut descriptor: OsDescriptor, kernel: Option<&str>) -> OsDescriptor {
    if descriptor.build == 0
        && let Some(build) = kernel.and_then(|k| k.trim().parse::<u32>().ok())
    {
        descriptor.build = build;
    }
    descriptor
}

/// Pull `major.minor.build` out of any Windows version text, in any display language:
/// `Microsoft Windows [Version 10.0.22631.4317]`, `[versión 10.0.22631]` or `11 (22631)`.
/// The first dotted number wins; otherwise the first plain number is the major version.
pub fn parse_windows_ver(text: &str) -> Option<OsDescriptor> {
    let runs: Vec<&str> = text
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .map(|run| run.trim_matches('.'))
        .filter(|run| !run.is_empty())
        .collect();
    let version = runs
        .iter()
        .find(|run| run.contains('.'))
        .or_else(|| runs.first())?;
    let mut parts = version.split('.').map(|part| part.parse::<u32>().ok());
    let major = parts.next()??;
    let minor = parts.next().flatten().unwrap_or(0);
    let build = parts.next().flatten().unwrap_or(0);
    Some(OsDescriptor::windows(major, minor, build))
}

fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

pub struct EnvironmentRequirements;

impl EnvironmentRequirements {
    /// Windows NT with major version 10 or later (Windows 11 still reports 10).
    pub fn is_windows_10_or_11(os: Option<&OsDescriptor>) -> bool {
        matches!(os, Some(descriptor) if descriptor.platform == OsPlatform::WindowsNt && descriptor.major >= 10)
    }

    /// 64-bit process, or a 32-bit process on a 64-bit Windows host.
    pub fn is_64bit_environment() -> bool {
        cfg!(target_pointer_width = "64")
            || env::var_os("PROCESSOR_ARCHITEW6432").is_some()
            || env::var("PROCESSOR_ARCHITECTURE").is_ok_and(|arch| arch.ends_with("64"))
    }
}

/// Facts about the machine the installer runs on. Tests build one by hand.
#[derive(Clone, Debug)]
pub struct HostEnvironment {
    pub os: Option<OsDescriptor>,
    pub is_64bit: bool,
    pub elevated: bool,
    pub start_menu_dir: Option<PathBuf>,
    pub desktop_dir: Option<PathBuf>,
    /// Directory of the running executable.
    pub current_exe_dir: Option<PathBuf>,
    pub current_exe: Option<PathBuf>,
}

impl HostEnvironment {
    pub fn detect() -> Self {
        let current_exe = env::current_exe().ok();
        let environment = Self {
            os: OsDescriptor::detect(),
            is_64bit: EnvironmentRequirements::is_64bit_environment(),
            elevated: detect_elevation(),
            start_menu_dir: start_menu_dir(),
            desktop_dir: dirs::desktop_dir(),
            current_exe_dir: current_exe.as_ref().and_then(|p| p.parent().map(PathBuf::from)),
            current_exe,
        };
        debug!("host: detected {environment:?}");
        environment
    }
}

fn start_menu_dir() -> Option<PathBuf> {
    match env::consts::OS {
        "windows" => dirs::data_dir().map(|roaming| {
            roaming
                .join("Microsoft")
                .join("Windows")
                .join("Start Menu")
                .join("Programs")
        }),
        "macos" => dirs::home_dir().map(|home| home.join("Applications")),
        _ => dirs::data_dir().map(|data| data.join("applications")),
    }
}

fn detect_elevation() -> bool {
    if cfg!(target_os = "windows") {
        // `net session` only succeeds for administrators.
        Command::new("net")
            .arg("session")
            .output()
            .is_ok_and(|output| output.status.success())
    } else {
        command_stdout("id", &["-u"]).is_some_and(|uid| uid == "0")
    }
}
