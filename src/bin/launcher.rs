use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use tokio::sync::mpsc::UnboundedReceiver;

use mixitup_distribution::cli::{ProgressView, SourceArgs, reveal_log};
use mixitup_distribution::events::{self, LauncherEvent};
use mixitup_distribution::launcher::Launcher;
use mixitup_distribution::{DistributionError, env, logging, policy};

#[derive(Parser, Debug)]
#[command(name = "Mix It Up Launcher", author, version, about = "Keeps Mix It Up up to date and starts it")]
struct Cli {
    /// Install root. Defaults to %LOCALAPPDATA%\MixItUp.
    root: Option<PathBuf>,
    #[command(flatten)]
    source: SourceArgs,
    /// Accept the currently published versions of the required policies.
    #[arg(long)]
    accept_policies: bool,
    /// Update only, do not start Mix It Up afterwards.
    #[arg(long)]
    no_launch: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let app_root = env::resolve_app_root(cli.root.as_deref());
    let log_path = logging::init(&env::logs_dir(&app_root), "launcher");
    info!("launcher {} starting", env!("CARGO_PKG_VERSION"));

    let (sink, rx) = events::channel();
    let renderer = tokio::spawn(render(rx));
    let mut launcher = Launcher::new(app_root, cli.source.settings())
        .with_events(sink)
        .with_log_path(log_path.clone());

    let code = run(&mut launcher, &cli, log_path.as_ref()).await;
    drop(launcher);
    let _ = renderer.await;
    Ok(code)
}

async fn run(launcher: &mut Launcher, cli: &Cli, log_path: Option<&PathBuf>) -> ExitCode {
    if let Err(err) = launcher.initialize().await {
        return failure(&err, log_path);
    }

    if launcher.available_update().is_some()
        && let Err(err) = launcher.install_update().await
    {
        if launcher.executable_path().is_none_or(|path| !path.is_file()) {
            return failure(&err, log_path);
        }
        warn!("launcher: continuing with the installed version");
    }

    if !policy::all_accepted(launcher.policies()) {
        if cli.accept_policies {
            if let Err(err) = launcher.accept_policies() {
                return failure(&err, log_path);
            }
        } else {
            println!("Please review and accept the following before starting Mix It Up:");
            for state in launcher.policies().iter().filter(|state| !state.accepted) {
                println!("  {} (version {})", state.title, state.version);
            }
            println!("Run the launcher again with --accept-policies to accept them.");
            return ExitCode::FAILURE;
        }
    }

    if cli.no_launch {
        return ExitCode::SUCCESS;
    }
    match launcher.launch() {
        Ok(pid) => {
            info!("launcher: Mix It Up started (pid {pid})");
            ExitCode::SUCCESS
        }
        Err(err) => failure(&err, log_path),
    }
}

fn failure(err: &DistributionError, log_path: Option<&PathBuf>) -> ExitCode {
    error!("launcher: {err}");
    eprintln!("{}", err.user_message(log_path.map(PathBuf::as_path)));
    if matches!(err, DistributionError::State { .. }) {
        reveal_log(log_path);
    }
    ExitCode::FAILURE
}

async fn render(mut rx: UnboundedReceiver<LauncherEvent>) {
    let mut view = ProgressView::new();
    while let Some(event) = rx.recv().await {
        match event {
            LauncherEvent::Busy(_) | LauncherEvent::Policies(_) => {}
            LauncherEvent::Status(message) => view.status(&message),
            LauncherEvent::Progress { label, percent } => view.progress(&label, percent),
            LauncherEvent::UpdateAvailable { version } => view.println(&format!("Update available: {version}")),
            LauncherEvent::Ready { can_launch, .. } => {
                if !can_launch {
                    view.status("Waiting");
                }
            }
            LauncherEvent::Failed { message, .. } => view.println(&message),
        }
    }
    view.finish();
}
