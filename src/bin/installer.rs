use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use tokio::sync::mpsc::UnboundedReceiver;

use mixitup_distribution::cli::{ProgressView, SourceArgs, reveal_log};
use mixitup_distribution::events::{self, InstallerEvent};
use mixitup_distribution::host::HostServices;
use mixitup_distribution::installer::{Installer, StepState};
use mixitup_distribution::{DistributionError, env, logging};

#[derive(Parser, Debug)]
#[command(name = "Mix It Up Installer", author, version, about = "Installs or updates Mix It Up")]
struct Cli {
    /// Install root. Defaults to %LOCALAPPDATA%\MixItUp.
    root: Option<PathBuf>,
    #[command(flatten)]
    source: SourceArgs,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let app_root = env::resolve_app_root(cli.root.as_deref());
    let log_path = logging::init(&env::logs_dir(&app_root), "installer");
    info!("installer {} starting", env!("CARGO_PKG_VERSION"));

    let (sink, rx) = events::channel();
    let renderer = tokio::spawn(render(rx));
    let mut installer = Installer::new(app_root, cli.source.settings(), HostServices::detect())
        .with_events(sink)
        .with_log_path(log_path.clone());

    let result = installer.run().await;
    drop(installer);
    let finished = renderer.await.ok().flatten();

    match result {
        Ok(outcome) => {
            if let Some(message) = finished {
                println!("{message}");
            }
            println!("Start Mix It Up with {}", outcome.launcher_path.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!("installer: {err}");
            let message = finished.unwrap_or_else(|| err.user_message(log_path.as_deref()));
            eprintln!("{message}");
            if matches!(err, DistributionError::State { .. }) {
                reveal_log(log_path.as_ref());
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Draw installer events until the run drops its sender; returns the final message.
async fn render(mut rx: UnboundedReceiver<InstallerEvent>) -> Option<String> {
    let mut view = ProgressView::new();
    let mut finished = None;
    while let Some(event) = rx.recv().await {
        match event {
            InstallerEvent::Step { step, state } => match state {
                StepState::InProgress => view.status(step.label()),
                StepState::Completed => view.println(&format!("[done] {}", step.label())),
                StepState::Failed(reason) => view.println(&format!("[failed] {}: {reason}", step.label())),
                StepState::Pending => {}
            },
            InstallerEvent::Status(message) => view.println(&message),
            InstallerEvent::Progress { label, percent } => view.progress(&label, percent),
            InstallerEvent::Finished { message, .. } => finished = Some(message),
        }
    }
    view.finish();
    finished
}
