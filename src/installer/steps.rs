use std::fmt;

use crate::error::{DistributionError, Result};

/// Installer steps in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstallerStep {
    Preflight,
    Discover,
    CloseProcesses,
    Migrate,
    LauncherFetch,
    LauncherInstall,
    AppFetch,
    AppExtract,
    DataCopy,
    ConfigWrite,
    Register,
    Shortcuts,
    Complete,
}

impl InstallerStep {
    pub const ALL: [InstallerStep; 13] = [
        InstallerStep::Preflight,
        InstallerStep::Discover,
        InstallerStep::CloseProcesses,
        InstallerStep::Migrate,
        InstallerStep::LauncherFetch,
        InstallerStep::LauncherInstall,
        InstallerStep::AppFetch,
        InstallerStep::AppExtract,
        InstallerStep::DataCopy,
        InstallerStep::ConfigWrite,
        InstallerStep::Register,
        InstallerStep::Shortcuts,
        InstallerStep::Complete,
    ];

    pub fn label(self) -> &'static str {
        match self {
            InstallerStep::Preflight => "Checking system requirements",
            InstallerStep::Discover => "Looking for an existing installation",
            InstallerStep::CloseProcesses => "Closing Mix It Up",
            InstallerStep::Migrate => "Migrating previous installation",
            InstallerStep::LauncherFetch => "Downloading launcher",
            InstallerStep::LauncherInstall => "Installing launcher",
            InstallerStep::AppFetch => "Downloading Mix It Up",
            InstallerStep::AppExtract => "Installing Mix It Up",
            InstallerStep::DataCopy => "Copying your data",
            InstallerStep::ConfigWrite => "Saving configuration",
            InstallerStep::Register => "Registering uninstaller",
            InstallerStep::Shortcuts => "Creating shortcuts",
            InstallerStep::Complete => "Done",
        }
    }
}

impl fmt::Display for InstallerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepState {
    Pending,
    InProgress,
    Completed,
    Failed(String),
}

/// Ordered step states. Steps start strictly in order, never twice.
#[derive(Clone, Debug)]
pub struct StepTable {
    entries: Vec<(InstallerStep, StepState)>,
}

impl Default for StepTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StepTable {
    pub fn new() -> Self {
        Self {
            entries: InstallerStep::ALL
                .iter()
                .map(|step| (*step, StepState::Pending))
                .collect(),
        }
    }

    pub fn entries(&self) -> &[(InstallerStep, StepState)] {
        &self.entries
    }

    pub fn state(&self, step: InstallerStep) -> &StepState {
        &self.entries[step as usize].1
    }

    /// Move `step` to `InProgress`. Every earlier step must be completed.
    pub fn start(&mut self, step: InstallerStep) -> Result<()> {
        let index = step as usize;
        if self.entries[..index]
            .iter()
            .any(|(_, state)| *state != StepState::Completed)
        {
            return Err(DistributionError::state(format!(
                "step '{step}' started before earlier steps completed"
            )));
        }
        self.transition(step, StepState::Pending, StepState::InProgress)
    }

    pub fn complete(&mut self, step: InstallerStep) -> Result<()> {
        self.transition(step, StepState::InProgress, StepState::Completed)
    }

    pub fn fail(&mut self, step: InstallerStep, reason: impl Into<String>) -> Result<()> {
        self.transition(step, StepState::InProgress, StepState::Failed(reason.into()))
    }

    /// The step in progress, or the first one still pending.
    pub fn current(&self) -> Option<InstallerStep> {
        self.entries
            .iter()
            .find(|(_, state)| !matches!(state, StepState::Completed))
            .map(|(step, _)| *step)
    }

    pub fn failed(&self) -> Option<(InstallerStep, &str)> {
        self.entries.iter().find_map(|(step, state)| match state {
            StepState::Failed(reason) => Some((*step, reason.as_str())),
            _ => None,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.entries
            .iter()
            .all(|(_, state)| *state == StepState::Completed)
    }

    fn transition(&mut self, step: InstallerStep, from: StepState, to: StepState) -> Result<()> {
        let slot = &mut self.entries[step as usize].1;
        if *slot != from {
            return Err(DistributionError::state(format!(
                "step '{step}' cannot move from {slot:?} to {to:?}"
            )));
        }
        *slot = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_every_step_in_order() {
        let mut table = StepTable::new();
        for step in InstallerStep::ALL {
            assert_eq!(table.current(), Some(step));
            table.start(step).unwrap();
            table.complete(step).unwrap();
        }
        assert!(table.is_complete());
        assert_eq!(table.current(), None);
    }

    #[test]
    fn refuses_to_skip_or_reenter() {
        let mut table = StepTable::new();
        assert!(table.start(InstallerStep::Discover).is_err());

        table.start(InstallerStep::Preflight).unwrap();
        assert!(table.start(InstallerStep::Preflight).is_err());
        table.complete(InstallerStep::Preflight).unwrap();
        assert!(table.start(InstallerStep::Preflight).is_err());
        assert!(table.complete(InstallerStep::Discover).is_err());
    }

    #[test]
    fn failure_is_recorded_and_blocks_later_steps() {
        let mut table = StepTable::new();
        table.start(InstallerStep::Preflight).unwrap();
        table.fail(InstallerStep::Preflight, "Windows 10 required").unwrap();

        assert_eq!(
            table.state(InstallerStep::Preflight),
            &StepState::Failed("Windows 10 required".into())
        );
        assert_eq!(table.failed(), Some((InstallerStep::Preflight, "Windows 10 required")));
        assert!(table.start(InstallerStep::Discover).is_err());
        assert_eq!(table.state(InstallerStep::Discover), &StepState::Pending);
    }
}
