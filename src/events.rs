use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::installer::{InstallerStep, StepState};
use crate::models::PolicyDocumentState;

/// Progress reported by the installer run.
#[derive(Clone, Debug)]
pub enum InstallerEvent {
    Step { step: InstallerStep, state: StepState },
    Status(String),
    /// `percent` is `None` while the total size is unknown.
    Progress { label: String, percent: Option<f32> },
    Finished {
        success: bool,
        message: String,
        log_path: Option<PathBuf>,
    },
}

/// Progress reported by the launcher.
#[derive(Clone, Debug)]
pub enum LauncherEvent {
    Busy(bool),
    Status(String),
    Progress { label: String, percent: Option<f32> },
    UpdateAvailable { version: String },
    Policies(Vec<PolicyDocumentState>),
    Ready { executable: Option<PathBuf>, can_launch: bool },
    Failed { message: String, log_path: Option<PathBuf> },
}

/// Sending half of an orchestrator's event stream. A sink without a receiver drops events.
pub struct EventSink<E> {
    tx: Option<mpsc::UnboundedSender<E>>,
}

impl<E> EventSink<E> {
    pub fn new(tx: mpsc::UnboundedSender<E>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: E) {
        if let Some(tx) = &self.tx {
            tx.send(event).ok();
        }
    }
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<E> Default for EventSink<E> {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Create a connected sink and receiver.
pub fn channel<E>() -> (EventSink<E>, mpsc::UnboundedReceiver<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_sink_drops_events() {
        let sink: EventSink<LauncherEvent> = EventSink::disabled();
        sink.emit(LauncherEvent::Busy(true));
    }

    #[test]
    fn connected_sink_delivers_in_order() {
        let (sink, mut rx) = channel();
        sink.emit(LauncherEvent::Busy(true));
        sink.emit(LauncherEvent::Status("checking".into()));
        assert!(matches!(rx.try_recv(), Ok(LauncherEvent::Busy(true))));
        assert!(matches!(rx.try_recv(), Ok(LauncherEvent::Status(s)) if s == "checking"));
    }
}
