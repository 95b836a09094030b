use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::{error, info};

use mixitup_distribution::cli::ProgressView;
use mixitup_distribution::host::HostServices;
use mixitup_distribution::uninstaller::Uninstaller;
use mixitup_distribution::{env, logging};

#[derive(Parser, Debug)]
#[command(name = "Mix It Up Uninstaller", author, version, about = "Removes Mix It Up from this computer")]
struct Cli {
    /// Install root. Defaults to %LOCALAPPDATA%\MixItUp.
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let app_root = env::resolve_app_root(cli.root.as_deref());
    // The install root is being deleted, so the log lives in the system temp folder.
    let log_path = logging::init(&std::env::temp_dir(), "mixitup-uninstaller");
    info!("uninstaller {} starting", env!("CARGO_PKG_VERSION"));

    let view = ProgressView::new();
    view.status("Removing Mix It Up...");
    let result = Uninstaller::new(app_root, HostServices::detect()).run().await;
    view.finish();

    match result {
        Ok(report) if report.is_clean() => {
            println!("Mix It Up has been removed.");
            Ok(ExitCode::SUCCESS)
        }
        Ok(report) => {
            println!("Mix It Up has been removed. These items could not be deleted:");
            for leftover in &report.leftovers {
                println!("  {}", leftover.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!("uninstaller: {err}");
            eprintln!("{}", err.user_message(log_path.as_deref()));
            Ok(ExitCode::FAILURE)
        }
    }
}
